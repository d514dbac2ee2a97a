//! Inbound launch monitor protocol.
//!
//! [`LaunchMonitorServer`] accepts device connections and runs each one
//! as a [`LaunchMonitorSession`] on its own task. Every session reports
//! completed shots to the same [`ShotHandler`].

mod message;
mod session;

pub use message::{
    DeviceBallData, DeviceClubData, DeviceReply, HANDSHAKE_CHALLENGE, RawTelemetryMessage,
    SimCommand,
};
pub use session::{LaunchMonitorSession, SessionConfig, SessionEnd, SessionState};

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::dispatch::ShotHandler;
use crate::error::BridgeError;

/// The connection most recently accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentSession {
    pub id: u64,
    pub peer: SocketAddr,
}

// ── LaunchMonitorServer ──────────────────────────────────────────

pub struct LaunchMonitorServer {
    listener: TcpListener,
    config: SessionConfig,
    handler: Arc<dyn ShotHandler>,
    next_id: AtomicU64,
    current: Arc<std::sync::Mutex<Option<CurrentSession>>>,
}

impl LaunchMonitorServer {
    /// Bind the device listener. Failure here is fatal to startup.
    pub async fn bind(
        addr: SocketAddr,
        config: SessionConfig,
        handler: Arc<dyn ShotHandler>,
    ) -> Result<Self, BridgeError> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "launch monitor listener bound");
        Ok(Self {
            listener,
            config,
            handler,
            next_id: AtomicU64::new(1),
            current: Arc::new(std::sync::Mutex::new(None)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, BridgeError> {
        Ok(self.listener.local_addr()?)
    }

    /// Handle for observing the newest connection from another task.
    pub fn current_session(&self) -> CurrentSessionHandle {
        CurrentSessionHandle(Arc::clone(&self.current))
    }

    /// Accept connections until `shutdown` fires, then wait for the
    /// running sessions and every shot they handed off to finish.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut sessions = JoinSet::new();
        let dispatches = TaskTracker::new();

        loop {
            let accepted = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => accepted,
                Some(done) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = done {
                        warn!("session task failed: {e}");
                    }
                    continue;
                }
            };

            let (stream, peer) = match accepted {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    continue;
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                warn!(%peer, "set_nodelay: {e}");
            }

            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            *self.current.lock().unwrap_or_else(|e| e.into_inner()) =
                Some(CurrentSession { id, peer });
            info!(session = id, %peer, "launch monitor connected");

            let session = LaunchMonitorSession::new(
                stream,
                self.config.clone(),
                Arc::clone(&self.handler),
                shutdown.child_token(),
            )
            .with_id(id)
            .with_tracker(dispatches.clone());
            let current = Arc::clone(&self.current);
            sessions.spawn(async move {
                let end = session.run().await;
                let mut current = current.lock().unwrap_or_else(|e| e.into_inner());
                if current.is_some_and(|c| c.id == id) {
                    *current = None;
                }
                end
            });
        }

        info!(sessions = sessions.len(), "listener stopped, waiting for sessions");
        while let Some(done) = sessions.join_next().await {
            if let Err(e) = done {
                warn!("session task failed: {e}");
            }
        }
        dispatches.close();
        if !dispatches.is_empty() {
            info!(shots = dispatches.len(), "waiting for in-flight shots");
        }
        dispatches.wait().await;
        info!("launch monitor server stopped");
    }
}

/// Read access to the newest connection.
#[derive(Debug, Clone)]
pub struct CurrentSessionHandle(Arc<std::sync::Mutex<Option<CurrentSession>>>);

impl CurrentSessionHandle {
    /// `None` when the newest connection has ended.
    pub fn get(&self) -> Option<CurrentSession> {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    use crate::shot::StandardizedShot;

    #[derive(Default)]
    struct SlowHandler(AtomicBool);

    #[async_trait]
    impl ShotHandler for SlowHandler {
        async fn on_shot(&self, _shot: StandardizedShot) {
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn shutdown_waits_for_in_flight_shot() {
        let handler = Arc::new(SlowHandler::default());
        let server = LaunchMonitorServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            SessionConfig::default(),
            handler.clone(),
        )
        .await
        .unwrap();
        let addr = server.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let running = tokio::spawn(server.run(shutdown.clone()));

        let mut device = TcpStream::connect(addr).await.unwrap();
        device.write_all(br#"{"Type":"SendShot"}"#).await.unwrap();
        let mut lines = BufReader::new(device).lines();
        let ack = tokio::time::timeout(Duration::from_secs(5), lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(ack.contains("SendShot"));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(5), running)
            .await
            .unwrap()
            .unwrap();
        assert!(handler.0.load(Ordering::SeqCst));
    }
}
