//! Bridge service wiring and lifecycle.
//!
//! Opens the shot log, connects to the simulator, builds the
//! dispatcher and serves launch monitor connections until stopped.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fairway_core::{
    BridgeError, CsvShotStore, LaunchMonitorServer, ModifierHandle, ShotDispatcher,
    SimulatorClient,
};

use crate::config::BridgeConfig;

// ── BridgeService ────────────────────────────────────────────────

/// The top-level bridge service.
pub struct BridgeService {
    config: BridgeConfig,
    modifiers: ModifierHandle,
    shutdown: CancellationToken,
}

impl BridgeService {
    pub fn new(config: BridgeConfig) -> Self {
        let modifiers = ModifierHandle::new(config.modifiers);
        Self {
            config,
            modifiers,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the service when cancelled.
    pub fn stop_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// The live modifier table, for an administrative surface.
    pub fn modifiers(&self) -> ModifierHandle {
        self.modifiers.clone()
    }

    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Acquire every resource the bridge needs.
    ///
    /// Fails only when the shot log cannot be opened or the listener
    /// cannot be bound. An unreachable simulator is logged and the
    /// bridge runs without it.
    pub async fn start(&self) -> Result<RunningBridge, BridgeError> {
        let storage = Arc::new(CsvShotStore::open(&self.config.storage.shot_file).await?);
        info!(path = %storage.path().display(), "shot log open");

        let (host, port) = self.config.simulator_endpoint();
        let options = self.config.simulator_options();
        let simulator = match SimulatorClient::connect((host, port), options.clone()).await {
            Ok(client) => client,
            Err(e) => {
                warn!(host, port, "simulator unavailable, shots will not be forwarded: {e}");
                SimulatorClient::detached(options)
            }
        };
        let simulator = Arc::new(simulator);

        let dispatcher = ShotDispatcher::new(
            simulator.clone(),
            storage,
            self.modifiers.clone(),
        )
        .with_options(self.config.dispatch_options());

        let server = LaunchMonitorServer::bind(
            self.config.monitor_addr()?,
            self.config.session_config(),
            Arc::new(dispatcher),
        )
        .await?;
        info!(
            kind = ?self.config.monitor.kind,
            addr = %server.local_addr()?,
            "waiting for launch monitor"
        );

        Ok(RunningBridge {
            server,
            simulator,
            shutdown: self.shutdown.clone(),
        })
    }

    /// Start and serve until stopped.
    pub async fn run(&self) -> Result<(), BridgeError> {
        self.start().await?.serve().await;
        Ok(())
    }
}

/// A started bridge, ready to serve.
pub struct RunningBridge {
    server: LaunchMonitorServer,
    simulator: Arc<SimulatorClient>,
    shutdown: CancellationToken,
}

impl RunningBridge {
    pub fn monitor_addr(&self) -> Result<SocketAddr, BridgeError> {
        self.server.local_addr()
    }

    /// Serve until the stop handle fires, then close the simulator.
    pub async fn serve(self) {
        self.server.run(self.shutdown.clone()).await;
        self.simulator.close().await;
        let shots_sent = self.simulator.shots_sent().await;
        info!(shots_sent, "bridge stopped");
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    fn test_config(dir: &std::path::Path, sim_port: u16) -> BridgeConfig {
        let mut cfg = BridgeConfig::default();
        cfg.monitor.bind_address = "127.0.0.1".into();
        cfg.monitor.port = 0;
        cfg.simulator.port = sim_port;
        cfg.simulator.heartbeat_interval_secs = 3600;
        cfg.storage.shot_file = dir.join("shots.csv");
        cfg
    }

    async fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn stop_handle_works() {
        let svc = BridgeService::new(BridgeConfig::default());
        assert!(!svc.is_stopped());
        svc.stop_handle().cancel();
        assert!(svc.is_stopped());
    }

    #[test]
    fn modifiers_start_from_config() {
        let mut cfg = BridgeConfig::default();
        cfg.modifiers.ball_data.speed = 1.1;
        let svc = BridgeService::new(cfg);
        assert_eq!(svc.modifiers().snapshot().table.ball_data.speed, 1.1);
    }

    #[tokio::test]
    async fn starts_without_simulator() {
        let dir = tempfile::tempdir().unwrap();
        let svc = BridgeService::new(test_config(dir.path(), unused_port().await));

        let bridge = svc.start().await.unwrap();
        assert!(bridge.monitor_addr().unwrap().port() != 0);
        assert!(!bridge.simulator.is_connected().await);

        svc.stop();
        tokio::time::timeout(Duration::from_secs(5), bridge.serve())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn simulator_host_name_is_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let sim = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut cfg = test_config(dir.path(), sim.local_addr().unwrap().port());
        cfg.simulator.address = "localhost".into();
        let svc = BridgeService::new(cfg);

        let bridge = svc.start().await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), sim.accept())
            .await
            .unwrap()
            .unwrap();
        assert!(bridge.simulator.is_connected().await);

        svc.stop();
        tokio::time::timeout(Duration::from_secs(5), bridge.serve())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unresolvable_simulator_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = test_config(dir.path(), 921);
        // Rejected by the resolver without a network lookup.
        cfg.simulator.address = "sim\0host".into();
        let svc = BridgeService::new(cfg);

        let bridge = svc.start().await.unwrap();
        assert!(!bridge.simulator.is_connected().await);
    }

    #[tokio::test]
    async fn unopenable_shot_log_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = test_config(dir.path(), unused_port().await);
        cfg.storage.shot_file = dir.path().join("no-such-dir").join("shots.csv");
        assert!(BridgeService::new(cfg).start().await.is_err());
    }

    #[tokio::test]
    async fn occupied_port_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut cfg = test_config(dir.path(), unused_port().await);
        cfg.monitor.port = taken.local_addr().unwrap().port();
        assert!(BridgeService::new(cfg).start().await.is_err());
    }

    #[tokio::test]
    async fn shot_is_forwarded_and_logged() {
        let dir = tempfile::tempdir().unwrap();
        let sim = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut cfg = test_config(dir.path(), sim.local_addr().unwrap().port());
        cfg.modifiers.ball_data.speed = 2.0;
        let shot_file = cfg.storage.shot_file.clone();
        let svc = BridgeService::new(cfg);

        let bridge = svc.start().await.unwrap();
        let monitor_addr = bridge.monitor_addr().unwrap();
        let (sim_stream, _) = sim.accept().await.unwrap();
        let serving = tokio::spawn(bridge.serve());

        let mut device = TcpStream::connect(monitor_addr).await.unwrap();
        device
            .write_all(
                br#"{"Type":"SetBallData","BallData":{"BallSpeed":100,"SpinAxis":350}}{"Type":"SendShot"}"#,
            )
            .await
            .unwrap();

        let mut sim_lines = BufReader::new(sim_stream).lines();
        let line = tokio::time::timeout(Duration::from_secs(5), sim_lines.next_line())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let sent: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(sent["BallData"]["Speed"], 200.0);
        assert_eq!(sent["BallData"]["SpinAxis"], 10.0);

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let text = tokio::fs::read_to_string(&shot_file).await.unwrap();
                if text.lines().count() == 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("shot never logged");

        svc.stop();
        tokio::time::timeout(Duration::from_secs(5), serving)
            .await
            .unwrap()
            .unwrap();
    }
}
