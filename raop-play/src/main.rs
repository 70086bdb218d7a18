//! RAOP player (raop-play) - Main entry point
//!
//! Streams raw 16-bit stereo PCM from a file or stdin to an AirPlay (RAOP)
//! receiver, controlled at runtime through a named command pipe.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::error::ErrorKind;
use clap::Parser;
use raop_common::{ClockInstant, NetworkClock, SystemNtpClock};
use raop_play::artwork::{ArtworkAcquirer, HttpArtworkFetcher};
use raop_play::config::{
    auth_forced, check_apple_tv, decode_password, select_crypto, LogLevels, PlayerConfig,
};
use raop_play::control::{spawn_pipe_reader, CommandDispatcher, COMMAND_CHANNEL_CAPACITY};
use raop_play::playback::{
    await_scheduler, open_source, PlaybackControl, PlaybackScheduler, ReaderSource,
    SchedulerConfig, SHUTDOWN_GRACE,
};
use raop_play::session::{
    volume_to_db, ConnectOptions, LocalReceiver, Session, BYTES_PER_FRAME, DEFAULT_SAMPLE_RATE,
    MUTE_DB,
};
use raop_play::SharedState;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const EXIT_OK: i32 = 0;
const EXIT_FAILURE: i32 = 1;
const EXIT_USAGE: i32 = -1;

/// Blocking threads still parked in a read are abandoned after this
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Command-line arguments for raop-play
#[derive(Parser, Debug)]
#[command(name = "raop-play")]
#[command(about = "Stream raw PCM audio to an AirPlay (RAOP) receiver")]
#[command(version)]
struct Args {
    /// Print the current NTP time and exit
    #[arg(long)]
    ntp: bool,

    /// Print a self-check line and exit
    #[arg(long)]
    check: bool,

    /// Receiver port [default: 5000]
    #[arg(long)]
    port: Option<u16>,

    /// Initial volume 0-100 (0 leaves the receiver volume alone)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
    volume: Option<u8>,

    /// Latency in milliseconds [default: 1000]
    #[arg(long, value_name = "MS")]
    latency: Option<u64>,

    /// Start after this many milliseconds
    #[arg(long, value_name = "MS", default_value_t = 0)]
    wait: u64,

    /// Start at this NTP time (plus --wait)
    #[arg(long, value_name = "NTP")]
    ntpstart: Option<u64>,

    /// Encrypt the audio payload
    #[arg(long)]
    encrypt: bool,

    /// DACP id
    #[arg(long, value_name = "ID")]
    dacp: Option<String>,

    /// Active-Remote id; names the default command pipe
    #[arg(long, value_name = "ID")]
    activeremote: Option<String>,

    /// Command pipe path [default: /tmp/fifo-<activeremote>]
    #[arg(long, value_name = "PATH")]
    command_pipe: Option<PathBuf>,

    /// Send ALAC compressed audio
    #[arg(long)]
    alac: bool,

    /// mDNS et value (encryption types)
    #[arg(long)]
    et: Option<String>,

    /// mDNS md value (metadata types)
    #[arg(long)]
    md: Option<String>,

    /// mDNS am value (model)
    #[arg(long, default_value = "")]
    am: String,

    /// mDNS pk value (pairing key)
    #[arg(long, default_value = "")]
    pk: String,

    /// mDNS pw value (password required)
    #[arg(long, default_value = "")]
    pw: String,

    /// Pairing secret
    #[arg(long)]
    secret: Option<String>,

    /// Device password (base64)
    #[arg(long)]
    password: Option<String>,

    /// Receiver UDN
    #[arg(long)]
    udn: Option<String>,

    /// Verbosity 0-9 [default: 3]
    #[arg(long)]
    debug: Option<u8>,

    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Receiver host name or address
    #[arg(required_unless_present_any = ["ntp", "check"])]
    player: Option<String>,

    /// Raw PCM file, or '-' for stdin
    #[arg(value_name = "FILE", required_unless_present_any = ["ntp", "check"])]
    file: Option<String>,
}

impl Args {
    /// CLI layer of the configuration
    fn overrides(&self) -> PlayerConfig {
        PlayerConfig {
            port: self.port,
            volume: self.volume,
            latency_ms: self.latency,
            debug: self.debug,
            dacp_id: self.dacp.clone(),
            active_remote: self.activeremote.clone(),
            command_pipe: self.command_pipe.clone(),
            et: self.et.clone(),
            md: self.md.clone(),
            chunk_frames: None,
            alac: self.alac.then_some(true),
        }
    }
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => EXIT_OK,
                _ => EXIT_USAGE,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    if args.ntp {
        println!("{}", SystemNtpClock.now().raw());
        std::process::exit(EXIT_OK);
    }
    if args.check {
        println!("raop-play check");
        std::process::exit(EXIT_OK);
    }

    let code = match run(args) {
        Ok(()) => EXIT_OK,
        Err(e) => {
            error!("{:#}", e);
            EXIT_FAILURE
        }
    };
    std::process::exit(code);
}

fn run(args: Args) -> Result<()> {
    // Logging needs the debug level, which may come from the file
    let file_config = PlayerConfig::load(args.config.as_deref());
    let settings = match &file_config {
        Ok(config) => config.clone().layered(args.overrides()),
        Err(_) => PlayerConfig::default().layered(args.overrides()),
    };
    init_tracing(LogLevels::from_debug_level(settings.debug()));
    file_config.context("Failed to load configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = runtime.block_on(stream(args, settings));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}

/// Initialize tracing; `RUST_LOG` overrides the `--debug` mapping
fn init_tracing(levels: LogLevels) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(levels.directives()));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn stream(args: Args, settings: PlayerConfig) -> Result<()> {
    let player = args
        .player
        .clone()
        .ok_or_else(|| anyhow!("Missing player address"))?;
    let file = args
        .file
        .clone()
        .ok_or_else(|| anyhow!("Missing audio file"))?;

    let reader = open_source(&file).with_context(|| format!("cannot open file {}", file))?;

    let port = settings.port();
    let addr = resolve_player(&player, port)
        .await
        .with_context(|| format!("Cannot resolve name {}", player))?;

    check_apple_tv(&args.am, &args.pk, args.secret.as_deref())?;

    let auth = auth_forced(&args.am);
    let options = ConnectOptions {
        codec: settings.codec(),
        crypto: select_crypto(args.encrypt, auth, settings.et()),
        auth,
        dacp_id: settings.dacp_id().to_string(),
        active_remote: settings.active_remote().to_string(),
        et: settings.et().to_string(),
        md: settings.md().to_string(),
        am: args.am.clone(),
        pk: args.pk.clone(),
        secret: args.secret.clone(),
        password: decode_password(args.password.as_deref(), &args.pw, args.udn.as_deref())?,
        frames_per_chunk: settings.chunk_frames(),
        latency_frames: settings.latency_frames(),
        volume_db: match settings.volume() {
            0 => MUTE_DB,
            v => volume_to_db(i64::from(v)),
        },
        ..Default::default()
    };

    let session: Arc<dyn Session> = Arc::new(LocalReceiver::new(Arc::new(SystemNtpClock), options));

    info!(
        "Connecting to player: {} ({}:{})",
        args.udn.as_deref().unwrap_or(&player),
        addr,
        port
    );
    session
        .connect(addr, port, settings.volume() > 0)
        .with_context(|| {
            format!(
                "Cannot connect to AirPlay device {}:{}, check firewall & port",
                addr, port
            )
        })?;

    let state = Arc::new(SharedState::new());
    let control = Arc::new(PlaybackControl::new(state.clone(), session.clone()));
    info!(
        "connected to {} on port {}, player latency is {} ms",
        addr,
        port,
        raop_common::timing::frames_to_millis(control.latency_frames(), DEFAULT_SAMPLE_RATE)
    );

    if args.ntpstart.is_some() || args.wait > 0 {
        control.schedule_start(args.ntpstart.map(ClockInstant::from_raw), args.wait);
    }

    // Command pipe -> dispatcher
    let (batch_tx, batch_rx) = crossbeam_channel::bounded(COMMAND_CHANNEL_CAPACITY);
    // Detached: the reader may be parked opening or reading a FIFO with no writer
    let _reader = spawn_pipe_reader(settings.command_pipe(), batch_tx, state.clone());

    let fetcher = HttpArtworkFetcher::new(tokio::runtime::Handle::current())
        .context("Failed to build HTTP client")?;
    let artwork = ArtworkAcquirer::new(Arc::new(fetcher), state.clone());
    let dispatcher = CommandDispatcher::new(control.clone(), session.clone(), artwork).spawn(batch_rx);

    let scheduler = PlaybackScheduler::new(
        control.clone(),
        session.clone(),
        ReaderSource::new(reader, BYTES_PER_FRAME),
        SchedulerConfig {
            chunk_frames: settings.chunk_frames(),
            ..Default::default()
        },
    );
    let mut task = tokio::task::spawn_blocking(move || scheduler.run());

    let finished = tokio::select! {
        result = &mut task => Some(result),
        _ = shutdown_signal() => None,
    };
    let report = match finished {
        Some(result) => Some(result.context("Playback scheduler failed")?),
        None => {
            control.stop();
            await_scheduler(task, SHUTDOWN_GRACE)
                .await
                .context("Playback scheduler failed")?
        }
    };

    // Teardown: flag, join dispatcher, then drop the session
    state.request_shutdown();
    let metadata = tokio::task::spawn_blocking(move || dispatcher.join())
        .await
        .context("Failed to join dispatcher")?;
    if metadata.is_none() {
        warn!("Dispatcher did not exit cleanly");
    }
    session.disconnect();

    match report {
        Some(report) => info!(
            "Playback finished: {} frames sent, {} ticks, state {}",
            report.frames_sent, report.periodic_ticks, report.final_state
        ),
        None => info!("Playback stopped: {} frames sent", state.frames_sent()),
    }
    Ok(())
}

/// Resolve `host` to the first address
async fn resolve_player(host: &str, port: u16) -> Result<IpAddr> {
    let mut addrs = tokio::net::lookup_host((host, port)).await?;
    addrs
        .next()
        .map(|addr| addr.ip())
        .ok_or_else(|| anyhow!("no address found"))
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
