// src/main.rs
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use sign_alert::runtime::feed_frames;
use sign_alert::speech::{Speaker, TracingSpeaker, VoiceAlertLoop};
use sign_alert::{
    AppSettings, DetectionHistory, DetectionSession, LandmarkSource, ReplaySource, SessionDriver,
    SessionEvent, SignLibrary,
};

#[derive(Parser, Debug)]
#[command(name = "sign_alert", about = "Recognize recorded hand signs and announce them")]
struct Cli {
    /// Sign library JSON (default: from settings)
    #[arg(long)]
    library: Option<PathBuf>,

    /// Captured hand-landmark frames to replay in place of a camera
    #[arg(long)]
    replay: PathBuf,

    /// Settings JSON; missing fields keep their defaults
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Detection history JSON (default: from settings)
    #[arg(long)]
    history: Option<PathBuf>,

    /// Write the detection history as CSV into this directory
    #[arg(long)]
    export: Option<PathBuf>,

    /// How long a confirmed sign stays on display before it is dismissed
    #[arg(long, default_value_t = 4)]
    display_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sign_alert=info".into()),
        )
        .init();

    info!("sign_alert v{} starting", env!("CARGO_PKG_VERSION"));

    let settings = AppSettings::load(cli.settings.as_deref())?;
    let library_path = cli.library.clone().unwrap_or_else(|| settings.library_path.clone());
    let history_path = cli.history.clone().unwrap_or_else(|| settings.history_path.clone());

    let library = SignLibrary::load(&library_path)
        .with_context(|| format!("loading sign library {}", library_path.display()))?;
    let mut history = DetectionHistory::load(&history_path)
        .with_context(|| format!("loading history {}", history_path.display()))?;
    let source = ReplaySource::open(&cli.replay)?;

    let session = DetectionSession::new(settings.session, settings.matcher, settings.consensus);
    let (handle, mut events, driver) =
        SessionDriver::spawn(session, Arc::new(Mutex::new(library)));

    handle.start(source.is_loaded()).await?;
    let feeder = tokio::spawn(feed_frames(source, handle.clone()));

    let speaker: Arc<dyn Speaker> = Arc::new(TracingSpeaker);
    let mut alert = None;

    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Countdown(remaining) => info!("Starting in {remaining}..."),
            SessionEvent::Activated => info!("Show the sign now"),
            SessionEvent::Detected(result) => {
                println!(
                    "Detected \"{}\" ({:.1}%) at {}",
                    result.sign.name,
                    result.confidence * 100.0,
                    result.timestamp.format("%H:%M:%S")
                );
                history.record(&result);
                if settings.voice_alerts {
                    let period = Duration::from_millis(settings.alert_repeat_ms);
                    alert = VoiceAlertLoop::start(Arc::clone(&speaker), &result, period);
                }
                break;
            }
            SessionEvent::TimedOut => {
                println!("No sign detected");
                break;
            }
            SessionEvent::Stopped => break,
        }
    }

    if let Some(alert) = alert {
        tokio::time::sleep(Duration::from_secs(cli.display_secs)).await;
        alert.dismiss();
    }
    handle.dismiss().await;

    feeder.abort();
    drop(handle);
    if let Err(e) = driver.await {
        warn!("Session driver ended abnormally: {e}");
    }

    history
        .save(&history_path)
        .with_context(|| format!("saving history {}", history_path.display()))?;

    let stats = history.stats(chrono::Local::now());
    info!(
        "History: {} total, {} today, {} this week, {:.1}% average confidence",
        stats.total,
        stats.today,
        stats.this_week,
        stats.avg_confidence * 100.0
    );
    if let Some((name, count)) = history.most_used_today(chrono::Local::now()) {
        info!("Most used today: \"{name}\" ({count}x)");
    }

    if let Some(dir) = cli.export {
        let path = history.export_csv(&dir)?;
        println!("History exported to {}", path.display());
    }

    Ok(())
}
