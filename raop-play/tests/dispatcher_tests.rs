//! Integration tests for the command dispatcher
//!
//! Tests metadata accumulation, immediate pushes (progress, volume,
//! artwork), playback actions, and the reader-to-dispatcher pipeline.

mod helpers;

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use helpers::{Call, Harness, StubFetcher};
use raop_common::protocol::parse_batch;
use raop_common::{ActionKind, Command, TrackMetadata};
use raop_play::artwork::{ArtworkAcquirer, LOCAL_ARTWORK_CONTENT_TYPE};
use raop_play::control::{spawn_reader, CommandDispatcher, DispatchFlow};
use raop_play::playback::PlaybackState;
use tempfile::TempDir;

fn dispatcher(h: &Harness) -> CommandDispatcher {
    CommandDispatcher::new(h.control.clone(), h.dyn_session(), h.failing_artwork())
}

/// Reader handing out one predefined slice per call, then EOF
struct SplitReader(Vec<Vec<u8>>);

impl Read for SplitReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.0.is_empty() {
            return Ok(0);
        }
        let next = self.0.remove(0);
        buf[..next.len()].copy_from_slice(&next);
        Ok(next.len())
    }
}

fn field(key: &str, value: &str) -> Command {
    Command::SetField(key.to_string(), value.to_string())
}

#[test]
fn test_sendmeta_reflects_cumulative_fields() {
    // Given: title, artist and album set in separate batches
    let h = Harness::new();
    let mut d = dispatcher(&h);
    d.apply_batch(vec![field("TITLE", "Song")]);
    d.apply_batch(vec![field("ARTIST", "Band"), field("ALBUM", "Record")]);

    // When: metadata is sent
    d.apply_batch(vec![Command::Action(ActionKind::SendMeta)]);

    // Then: exactly one metadata push with all three fields
    let expected = TrackMetadata {
        title: "Song".to_string(),
        artist: "Band".to_string(),
        album: "Record".to_string(),
        ..Default::default()
    };
    assert_eq!(h.session.calls(), vec![Call::SetMetadata(expected)]);
}

#[test]
fn test_fields_alone_push_nothing() {
    let h = Harness::new();
    let mut d = dispatcher(&h);
    d.apply_batch(parse_batch(b"TITLE=a\nARTIST=b\nDURATION=240\n"));

    assert!(h.session.calls().is_empty());
    assert_eq!(d.metadata().duration_seconds, 240);
}

#[test]
fn test_progress_pushes_immediately() {
    // Given: a known duration
    let h = Harness::new();
    let mut d = dispatcher(&h);
    d.apply_batch(vec![field("DURATION", "180")]);

    // When: progress arrives
    d.apply_batch(vec![field("PROGRESS", "42")]);

    // Then: progress and duration pushed in milliseconds
    assert_eq!(
        h.session.calls(),
        vec![Call::SetProgress {
            elapsed_ms: 42_000,
            duration_ms: 180_000
        }]
    );
}

#[test]
fn test_volume_57() {
    let h = Harness::new();
    let mut d = dispatcher(&h);
    d.apply_batch(vec![field("VOLUME", "57")]);

    match h.session.calls().as_slice() {
        [Call::SetVolume(db)] => assert!((db - (-12.9)).abs() < 1e-4, "got {}", db),
        other => panic!("unexpected calls {:?}", other),
    }
}

#[test]
fn test_volume_zero_mutes_and_garbage_is_zero() {
    let h = Harness::new();
    let mut d = dispatcher(&h);
    d.apply_batch(vec![field("VOLUME", "0"), field("VOLUME", "loud")]);

    assert_eq!(
        h.session.calls(),
        vec![Call::SetVolume(-144.0), Call::SetVolume(-144.0)]
    );
}

#[test]
fn test_volume_out_of_range_is_clamped() {
    let h = Harness::new();
    let mut d = dispatcher(&h);
    d.apply_batch(vec![field("VOLUME", "250")]);
    assert_eq!(h.session.calls(), vec![Call::SetVolume(0.0)]);
}

#[test]
fn test_artwork_failure_changes_nothing() {
    // Given: a fetcher that always fails
    let h = Harness::new();
    let mut d = dispatcher(&h);
    let before = d.metadata().clone();

    // When: remote and missing local artwork are requested
    let flow = d.apply_batch(vec![
        field("ARTWORK", "http://example.invalid/cover.jpg"),
        field("ARTWORK", "/no/such/cover.jpg"),
    ]);

    // Then: nothing pushed, metadata untouched, dispatcher keeps going
    assert_eq!(flow, DispatchFlow::Continue);
    assert!(h.session.calls().is_empty());
    assert_eq!(d.metadata(), &before);
}

#[test]
fn test_remote_artwork_pushed() {
    let h = Harness::new();
    let artwork = ArtworkAcquirer::new(
        Arc::new(StubFetcher::returning("image/png", &[1, 2, 3, 4])),
        h.state.clone(),
    );
    let mut d = CommandDispatcher::new(h.control.clone(), h.dyn_session(), artwork);

    d.apply_batch(vec![field("ARTWORK", "https://example.com/cover.png")]);

    assert_eq!(
        h.session.calls(),
        vec![Call::SetArtwork {
            content_type: "image/png".to_string(),
            len: 4
        }]
    );
}

#[test]
fn test_local_artwork_pushed() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cover.jpg");
    std::fs::write(&path, vec![0xAB; 1024]).unwrap();

    let h = Harness::new();
    let mut d = dispatcher(&h);
    d.apply_batch(vec![field("ARTWORK", path.to_str().unwrap())]);

    assert_eq!(
        h.session.calls(),
        vec![Call::SetArtwork {
            content_type: LOCAL_ARTWORK_CONTENT_TYPE.to_string(),
            len: 1024
        }]
    );
}

#[test]
fn test_pause_then_play_ordering() {
    // Given: a playing session
    let h = Harness::new();
    let mut d = dispatcher(&h);

    // When: paused and resumed in one batch
    d.apply_batch(parse_batch(b"ACTION=PAUSE\nACTION=PLAY\n"));

    // Then: pause, flush, start-at in that order
    let calls = h.session.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[0], Call::Pause);
    assert_eq!(calls[1], Call::Flush);
    assert!(matches!(calls[2], Call::StartAt(_)));
    assert_eq!(h.state.playback_state(), PlaybackState::Playing);
}

#[test]
fn test_pause_play_stop_in_one_batch() {
    let h = Harness::new();
    let mut d = dispatcher(&h);

    let flow = d.apply_batch(parse_batch(b"ACTION=PAUSE\nACTION=PLAY\nACTION=STOP\n"));

    assert_eq!(flow, DispatchFlow::Terminate);
    assert_eq!(h.state.playback_state(), PlaybackState::Stopped);
    let calls = h.session.calls();
    assert_eq!(calls.len(), 4);
    assert_eq!(&calls[..2], &[Call::Pause, Call::Flush]);
    assert!(matches!(calls[2], Call::StartAt(_)));
    assert_eq!(calls[3], Call::Stop);
}

#[test]
fn test_redundant_pause_command() {
    let h = Harness::new();
    let mut d = dispatcher(&h);
    d.apply_batch(parse_batch(b"ACTION=PAUSE\n"));
    h.session.clear();

    d.apply_batch(parse_batch(b"ACTION=PAUSE\n"));

    assert!(h.session.calls().is_empty());
    assert_eq!(h.state.playback_state(), PlaybackState::Paused);
}

#[test]
fn test_stop_terminates_and_ignores_later_actions() {
    // Given: a batch with stop followed by more commands
    let h = Harness::new();
    let mut d = dispatcher(&h);

    // When: applied
    let flow = d.apply_batch(parse_batch(
        b"ACTION=STOP\nACTION=PLAY\nTITLE=late\nACTION=SENDMETA\n",
    ));

    // Then: stop applied once, play dropped, field and metadata still handled
    assert_eq!(flow, DispatchFlow::Terminate);
    assert_eq!(h.state.playback_state(), PlaybackState::Stopped);
    let calls = h.session.calls();
    assert_eq!(calls[0], Call::Stop);
    assert!(calls.iter().all(|c| !matches!(c, Call::StartAt(_))));
    assert!(matches!(&calls[1], Call::SetMetadata(m) if m.title == "late"));
}

#[test]
fn test_unknown_keys_ignored() {
    let h = Harness::new();
    let mut d = dispatcher(&h);
    let flow = d.apply_batch(parse_batch(b"SHUFFLE=on\nACTION=REWIND\n"));

    assert_eq!(flow, DispatchFlow::Continue);
    assert!(h.session.calls().is_empty());
    assert_eq!(d.metadata(), &TrackMetadata::default());
}

#[test]
fn test_worker_applies_batches_until_shutdown() {
    // Given: a dispatcher worker fed by a channel
    let h = Harness::new();
    let (tx, rx) = crossbeam_channel::bounded(16);
    let handle = dispatcher(&h).spawn(rx);

    // When: batches arrive, then shutdown is requested
    tx.send(vec![field("TITLE", "Song")]).unwrap();
    tx.send(vec![field("ALBUM", "Record")]).unwrap();
    std::thread::sleep(Duration::from_millis(50));
    h.state.request_shutdown();

    // Then: the worker exits with the accumulated metadata
    let metadata = handle.join().expect("dispatcher exited cleanly");
    assert_eq!(metadata.title, "Song");
    assert_eq!(metadata.album, "Record");
}

#[test]
fn test_worker_exits_on_stop() {
    let h = Harness::new();
    let (tx, rx) = crossbeam_channel::bounded(16);
    let handle = dispatcher(&h).spawn(rx);

    tx.send(vec![Command::Action(ActionKind::Stop)]).unwrap();

    // Joins without a shutdown request
    assert!(handle.join().is_some());
    assert_eq!(h.state.playback_state(), PlaybackState::Stopped);
    drop(tx);
}

#[test]
fn test_reader_to_dispatcher_pipeline() {
    // Given: a command stream with a line split across reads and no final newline
    let h = Harness::new();
    let (tx, rx) = crossbeam_channel::bounded(16);
    let reads = vec![
        b"TITLE=Song\nART".to_vec(),
        b"IST=Band\nVOLUME=100\nACTION=SENDMETA\nACTION=STOP".to_vec(),
    ];
    let _reader = spawn_reader(SplitReader(reads), tx, h.state.clone());

    // When: the dispatcher serves the stream
    let handle = dispatcher(&h).spawn(rx);
    let metadata = handle.join().expect("dispatcher exited cleanly");
    h.state.request_shutdown();

    // Then: the split line was joined and the unterminated STOP still applied
    assert_eq!(metadata.title, "Song");
    assert_eq!(metadata.artist, "Band");
    let calls = h.session.calls();
    assert!(calls.contains(&Call::SetVolume(0.0)));
    assert!(calls.iter().any(|c| matches!(c, Call::SetMetadata(m) if m.artist == "Band")));
    assert_eq!(calls.last(), Some(&Call::Stop));
}
