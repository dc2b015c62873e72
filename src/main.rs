use std::sync::Arc;
use std::time::*;

use campreview::capture::*;
use campreview::host::HostController;
use tokio::sync::{broadcast, watch};
use tokio_stream::{wrappers::WatchStream, StreamExt};

const DEBUG: bool = false;
const TAP_INTERVAL: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let (exit_tx, exit) = broadcast::channel(1);
    tokio::spawn(exit_on_ctrl_c(exit_tx.clone()));

    let (samples_tx, samples) = watch::channel::<Option<Arc<SampleBuffer>>>(None);
    let engine = Arc::new(CaptureEngine::new(
        demo_backend(),
        Config::default(),
        Arc::new(samples_tx),
    ));

    let report = engine.configure();
    for issue in &report.issues {
        log::warn!("setup: {issue}");
    }
    log::info!(
        "camera: {}, audio: {}",
        report.position,
        if report.audio { "yes" } else { "no" }
    );

    let screen = SimulatedSurface::new("screen", Rect::new(0.0, 0.0, 390.0, 844.0));
    let host = HostController::new(engine.clone(), screen);
    host.view_did_load();

    let log_samples_task = tokio::spawn(log_samples(samples, exit.resubscribe()));
    tap_until_exit(&host, exit.resubscribe()).await;

    engine.stop();
    let _ = exit_tx.send(());
    let _ = log_samples_task.await;
    Ok(())
}

/// The platform's cameras on Apple targets have no surface outside an app
/// bundle, so the demo always drives simulated hardware.
fn demo_backend() -> CaptureBackend {
    CaptureBackend::new(SimulatedBackend::new(SimulatedConfig {
        frame_interval: Some(Duration::from_millis(33)),
        ..SimulatedConfig::default()
    }))
}

async fn exit_on_ctrl_c(exit_tx: broadcast::Sender<()>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("ctrl_c: {err}");
    }
    let _ = exit_tx.send(());
}

/// Stands in for the user touching the preview every few seconds.
async fn tap_until_exit(host: &HostController, mut exit: broadcast::Receiver<()>) {
    let mut taps = tokio::time::interval(TAP_INTERVAL);
    taps.tick().await;
    loop {
        tokio::select! {
            _ = exit.recv() => break,
            _ = taps.tick() => match host.interaction_began() {
                Some(Ok(position)) => log::info!("now on {position} camera"),
                Some(Err(err)) => log::warn!("camera switch failed: {err}"),
                None => log::info!("no camera to switch"),
            },
        }
    }
}

async fn log_samples(
    samples: watch::Receiver<Option<Arc<SampleBuffer>>>,
    mut exit: broadcast::Receiver<()>,
) {
    let start_time = Instant::now();
    let mut samples = WatchStream::new(samples);
    let mut count = 0u64;
    loop {
        tokio::select! {
            _ = exit.recv() => break,
            sample = samples.next() => {
                let Some(sample) = sample else { break };
                let Some(sample) = sample else { continue };
                count += 1;
                if count % 30 == 1 {
                    let format = sample
                        .format
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_default();
                    log::info!(
                        "{} {} {} Bytes",
                        start_time.elapsed().as_millis(),
                        format,
                        sample.data.len()
                    );
                }
            }
        }
    }
    log::debug!("{count} samples seen");
}

fn init_logging() {
    let level = if DEBUG {
        log::LevelFilter::Trace
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new().filter(None, level).init();
}
