//! Integration tests for playback state transitions
//!
//! Tests the ordering of transport calls issued by pause, play and stop,
//! start-time computation, and no-op transitions.

mod helpers;

use helpers::{Call, Harness, RecordingSession};
use raop_common::{ClockDelta, ClockInstant};
use raop_play::playback::{compute_start_at, PlaybackState, SendOutcome, TransitionOutcome};

#[test]
fn test_pause_issues_pause_then_flush() {
    // Given: a playing session
    let h = Harness::new();

    // When: pausing
    let outcome = h.control.pause();

    // Then: transport pause strictly precedes flush, state is Paused
    assert_eq!(
        outcome,
        TransitionOutcome::Applied {
            from: PlaybackState::Playing,
            to: PlaybackState::Paused
        }
    );
    assert_eq!(h.session.calls(), vec![Call::Pause, Call::Flush]);
    assert_eq!(h.state.playback_state(), PlaybackState::Paused);
}

#[test]
fn test_redundant_pause_is_noop() {
    // Given: an already paused session
    let h = Harness::new();
    h.control.pause();
    h.session.clear();

    // When: pausing again
    let outcome = h.control.pause();

    // Then: no transport call, state unchanged
    assert_eq!(outcome, TransitionOutcome::Ignored(PlaybackState::Paused));
    assert!(h.session.calls().is_empty());
    assert_eq!(h.state.playback_state(), PlaybackState::Paused);
}

#[test]
fn test_play_starts_200ms_out_minus_latency() {
    // Given: a paused session with one second of latency
    let h = Harness::with_session(RecordingSession::with_latency(44_100));
    h.control.pause();
    let now = h.session.clock().peek();

    // When: resuming
    let at = h.control.play();

    // Then: start_at = now + 200 ms - latency
    let expected = now + ClockDelta::from_millis(200) - ClockDelta::from_frames(44_100, 44_100);
    assert_eq!(at, expected);
    assert_eq!(
        h.session.calls(),
        vec![Call::Pause, Call::Flush, Call::StartAt(expected)]
    );
    assert_eq!(h.state.playback_state(), PlaybackState::Playing);
}

#[test]
fn test_play_while_playing_reanchors() {
    let h = Harness::new();
    h.control.play();
    assert_eq!(h.session.count(|c| matches!(c, Call::StartAt(_))), 1);
    assert_eq!(h.state.playback_state(), PlaybackState::Playing);
}

#[test]
fn test_play_resumes_from_stopped() {
    // Given: a stopped session with half a second of latency
    let h = Harness::with_session(RecordingSession::with_latency(22_050));
    h.control.pause();
    let outcome = h.control.stop();
    assert_eq!(
        outcome,
        TransitionOutcome::Applied {
            from: PlaybackState::Paused,
            to: PlaybackState::Stopped
        }
    );
    let now = h.session.clock().peek();

    // When: play arrives after the stop
    let at = h.control.play();

    // Then: start_at is anchored exactly as for a resume from pause
    let expected = now + ClockDelta::from_millis(200) - ClockDelta::from_frames(22_050, 44_100);
    assert_eq!(at, expected);
    assert_eq!(h.state.playback_state(), PlaybackState::Playing);
    assert_eq!(
        h.session.calls(),
        vec![Call::Pause, Call::Flush, Call::Stop, Call::StartAt(expected)]
    );
}

#[test]
fn test_redundant_stop_is_ignored() {
    let h = Harness::new();
    h.control.stop();
    assert_eq!(h.control.stop(), TransitionOutcome::Ignored(PlaybackState::Stopped));
    assert_eq!(h.session.count(|c| matches!(c, Call::Stop)), 1);
}

#[test]
fn test_finish_does_not_call_transport_stop() {
    let h = Harness::new();
    h.control.finish();
    assert_eq!(h.state.playback_state(), PlaybackState::Stopped);
    assert!(h.session.calls().is_empty());
}

#[test]
fn test_schedule_start_at_absolute_time() {
    // Given: an explicit NTP start time and a wait
    let h = Harness::with_session(RecordingSession::with_latency(22_050));
    let start = ClockInstant::from_raw(4_000_000_000u64 << 32);

    // When: scheduling the initial start
    let at = h.control.schedule_start(Some(start), 1_000);

    // Then: start + wait - latency, independent of the current time
    assert_eq!(at, compute_start_at(start, 1_000, 22_050, 44_100));
    assert_eq!(
        at,
        start + ClockDelta::from_millis(1_000) - ClockDelta::from_millis(500)
    );
    assert_eq!(h.session.calls(), vec![Call::StartAt(at)]);
}

#[test]
fn test_send_only_while_playing() {
    let h = Harness::new();

    assert!(matches!(h.control.send_if_playing(&[0; 16], 4), SendOutcome::Sent(_)));
    assert_eq!(h.state.frames_sent(), 4);

    h.control.pause();
    assert!(matches!(
        h.control.send_if_playing(&[0; 16], 4),
        SendOutcome::NotPlaying(PlaybackState::Paused)
    ));
    assert_eq!(h.state.frames_sent(), 4);
}

#[test]
fn test_failed_send_not_counted() {
    let h = Harness::new();
    h.session.set_fail_sends(true);

    assert!(matches!(h.control.send_if_playing(&[0; 16], 4), SendOutcome::Failed(_)));
    assert_eq!(h.state.frames_sent(), 0);
}
