//! The tick loop: wires C1 (collector) -> C2 (ring buffer) -> C3 (tracker,
//! which writes through to C5 storage) -> C6 (broadcast), and hosts the
//! C4 forensics worker on a dedicated blocking task.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use roguehunter_core::collector::Collector;
use roguehunter_core::config::Config;
use roguehunter_core::forensics::ForensicsOrchestrator;
#[cfg(target_os = "macos")]
use roguehunter_core::platform::MacPlatform;
use roguehunter_core::platform::RealClock;
use roguehunter_core::ringbuffer::RingBuffer;
use roguehunter_core::storage::StorageManager;
use roguehunter_core::tracker::{ForensicsTrigger, ProcessTracker};

use crate::forensics_runner::ShellCommandRunner;
use crate::streaming;

pub struct Paths {
    pub config: PathBuf,
    pub db: PathBuf,
    pub socket: PathBuf,
}

/// How often retention pruning runs. Pruning is cheap and idempotent, so
/// this doesn't need to track the sample interval.
const PRUNE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

/// Runs until a shutdown signal is received. Returns an error only for
/// unrecoverable startup failures (config, storage, socket bind); per-tick
/// failures are logged and the loop continues.
pub async fn run(paths: Paths) -> Result<(), Box<dyn std::error::Error>> {
    let config_text = std::fs::read_to_string(&paths.config).unwrap_or_default();
    let config = Config::parse(&config_text)?;

    use roguehunter_core::platform::Clock as _;

    let mut storage = StorageManager::open(&paths.db)?;
    let now_wall = RealClock.now_wall();
    let boot_time = storage.boot_time()?.unwrap_or(now_wall);
    if storage.boot_time()?.is_none() {
        storage.set_boot_time(boot_time)?;
    }

    #[cfg(not(target_os = "macos"))]
    compile_error!("roguehunterd only supports macOS");

    let platform = MacPlatform::new()?;

    let mut collector = Collector::new(platform, RealClock, config.collector_config());
    let mut ring = RingBuffer::new(config.system.ring_buffer_size);
    let mut tracker = ProcessTracker::new(config.tracker_config()?, boot_time);
    tracker.restore(&mut storage)?;

    let (ring_state_tx, ring_state_rx) = watch::channel(Arc::new(ring.freeze().batches().to_vec()));
    let (server, broadcast_tx) = streaming::Server::bind(&paths.socket, ring_state_rx)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = tokio::spawn(server.serve(shutdown_rx));

    let sample_interval = config.system.sample_interval;
    let forensics_debounce = config.system.forensics_debounce;
    let retention_days = config.retention.events_days;

    let (forensics_tx, mut forensics_rx) = mpsc::unbounded_channel::<ForensicsJob>();
    let forensics_task = tokio::task::spawn_blocking(move || {
        let mut orchestrator = ForensicsOrchestrator::new(ShellCommandRunner, forensics_debounce);
        while let Some(job) = forensics_rx.blocking_recv() {
            if let Some(result) = orchestrator.capture(
                job.trigger.event_id,
                job.trigger.pid,
                &job.trigger_label,
                job.now,
                &job.window,
            ) {
                if let Err(e) = job.storage_tx.blocking_send(result) {
                    warn!(error = %e, "forensics result channel closed");
                }
            }
        }
    });
    let (capture_tx, mut capture_rx) = mpsc::channel(8);

    let mut interval = tokio::time::interval(std::time::Duration::from_secs_f64(sample_interval));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut prune_interval = tokio::time::interval(PRUNE_INTERVAL);
    prune_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

    info!(socket = %paths.socket.display(), db = %paths.db.display(), "roguehunterd starting");

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = RealClock.now_wall();

                let batch = match collector.collect() {
                    Ok(b) => b,
                    Err(e) => {
                        error!(error = %e, "collect failed, skipping tick");
                        continue;
                    }
                };

                ring.push(batch.clone());
                let enriched = ring.compute_low_high(&batch);
                ring.update_latest(enriched.clone());
                let _ = ring_state_tx.send(Arc::new(ring.freeze().batches().to_vec()));

                let triggers: Vec<ForensicsTrigger> = match tracker.update(&enriched.rogues, now, &mut storage) {
                    Ok(t) => t,
                    Err(e) => {
                        error!(error = %e, "tracker update failed");
                        Vec::new()
                    }
                };

                for trigger in triggers {
                    let window = ring.freeze();
                    let job = ForensicsJob {
                        trigger: trigger.clone(),
                        trigger_label: format!("{:?}", trigger.band).to_lowercase(),
                        now,
                        window,
                        storage_tx: capture_tx.clone(),
                    };
                    if forensics_tx.send(job).is_err() {
                        warn!("forensics worker gone, dropping trigger");
                    }
                }

                let _ = broadcast_tx.send(Arc::new(enriched));
            }
            Some(result) = capture_rx.recv() => {
                if let Err(e) = storage.insert_forensic_capture(&result) {
                    error!(error = %e, "failed to persist forensic capture");
                }
            }
            _ = prune_interval.tick() => {
                let now = RealClock.now_wall();
                match storage.prune(now, retention_days) {
                    Ok(pruned) if pruned > 0 => info!(pruned, "pruned stale events"),
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "prune failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received SIGINT, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("received SIGTERM, shutting down");
                break;
            }
        }
    }

    let _ = shutdown_tx.send(true);
    drop(forensics_tx);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), server_task).await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), forensics_task).await;

    info!("shutdown complete");
    Ok(())
}

struct ForensicsJob {
    trigger: ForensicsTrigger,
    trigger_label: String,
    now: f64,
    window: roguehunter_core::ringbuffer::RingBufferSnapshot,
    storage_tx: mpsc::Sender<roguehunter_core::forensics::CaptureResult>,
}
