//! C6: the Unix-socket streaming server. One broadcast of enriched
//! `SampleBatch`es fanned out to every connected client, plus a bounded
//! per-client write queue so a slow reader gets dropped instead of
//! stalling the tick loop.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use roguehunter_core::model::SampleBatch;
use roguehunter_core::protocol::{ClientMessage, ServerMessage};

#[derive(Debug, thiserror::Error)]
pub enum StreamingError {
    #[error("failed to bind socket at {path}: {source}")]
    Bind {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Depth of a client's outbound queue before it's considered too slow and
/// disconnected.
const CLIENT_QUEUE_DEPTH: usize = 64;

static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

pub struct Server {
    listener: UnixListener,
    socket_path: std::path::PathBuf,
    tx: broadcast::Sender<Arc<SampleBatch>>,
    ring_state: watch::Receiver<Arc<Vec<SampleBatch>>>,
}

impl Server {
    /// `ring_state` is a live view of the current ring buffer window,
    /// updated by the tick loop each tick; a freshly accepted client reads
    /// whatever is current at accept time rather than a snapshot frozen
    /// at startup.
    pub fn bind(
        socket_path: &Path,
        ring_state: watch::Receiver<Arc<Vec<SampleBatch>>>,
    ) -> Result<(Self, broadcast::Sender<Arc<SampleBatch>>), StreamingError> {
        let _ = std::fs::remove_file(socket_path);
        let listener = UnixListener::bind(socket_path).map_err(|e| StreamingError::Bind {
            path: socket_path.display().to_string(),
            source: e,
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(socket_path) {
                let mut perms = metadata.permissions();
                perms.set_mode(0o660);
                let _ = std::fs::set_permissions(socket_path, perms);
            }
        }

        let (tx, _rx) = broadcast::channel(CLIENT_QUEUE_DEPTH);
        Ok((
            Self {
                listener,
                socket_path: socket_path.to_path_buf(),
                tx: tx.clone(),
                ring_state,
            },
            tx,
        ))
    }

    /// Accepts clients until `shutdown` resolves, then unlinks the
    /// socket file.
    pub async fn serve(self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, _addr)) => {
                            let rx = self.tx.subscribe();
                            let initial = self.ring_state.borrow().clone();
                            tokio::spawn(handle_client(stream, rx, initial));
                        }
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        let _ = std::fs::remove_file(&self.socket_path);
        info!(path = %self.socket_path.display(), "streaming socket unlinked");
    }
}

struct ConnectionGuard;

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let active = ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::Relaxed) - 1;
        debug!(active_connections = active, "client disconnected");
    }
}

async fn handle_client(
    stream: UnixStream,
    mut rx: broadcast::Receiver<Arc<SampleBatch>>,
    initial_state: Arc<Vec<SampleBatch>>,
) {
    let active = ACTIVE_CONNECTIONS.fetch_add(1, Ordering::Relaxed) + 1;
    debug!(active_connections = active, "client connected");
    let _guard = ConnectionGuard;

    let (read_half, write_half) = stream.into_split();

    let (queue_tx, mut queue_rx) = mpsc::channel::<String>(CLIENT_QUEUE_DEPTH);

    let initial_msg = ServerMessage::InitialState {
        samples: (*initial_state).clone(),
        sample_count: initial_state.len(),
    };
    if let Ok(line) = serde_json::to_string(&initial_msg) {
        if queue_tx.try_send(line).is_err() {
            warn!("client too slow to receive initial_state, dropping");
            return;
        }
    }

    let mut writer = write_half;
    let writer_task = tokio::spawn(async move {
        while let Some(line) = queue_rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if writer.write_all(b"\n").await.is_err() {
                break;
            }
        }
    });

    let reader_task = tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match serde_json::from_str::<ClientMessage>(&line) {
                    Ok(ClientMessage::Log { source, level, message, fields }) => {
                        tracing::info!(client_source = %source, client_level = %level, ?fields, "{message}");
                    }
                    Err(e) => debug!(error = %e, "ignoring malformed client message"),
                },
                Ok(None) => break,
                Err(e) => {
                    debug!(error = %e, "client read error");
                    break;
                }
            }
        }
    });

    loop {
        match rx.recv().await {
            Ok(batch) => match serde_json::to_string(&ServerMessage::Sample((*batch).clone())) {
                Ok(line) => {
                    if queue_tx.try_send(line).is_err() {
                        warn!("client write queue full, dropping slow client");
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "failed to serialize sample"),
            },
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "client lagged behind broadcast");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    drop(queue_tx);
    writer_task.abort();
    reader_task.abort();
}
