//! One launch monitor connection.
//!
//! A session is a single task multiplexing four event sources:
//!
//! ```text
//!   shutdown token ──┐
//!   framed stream ───┼──► select! ──► handler ──► replies / timers
//!   ping interval ───┤
//!   DelayQueue ──────┘   (ping timeout, shot complete, disarm, arm)
//! ```
//!
//! Nothing inside a handler sleeps, so a pending deferred action never
//! holds up the next frame.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tokio_util::time::{DelayQueue, delay_queue};
use tracing::{debug, info, warn};

use super::message::{DeviceBallData, DeviceClubData, DeviceReply, RawTelemetryMessage, SimCommand};
use crate::codec::JsonFrameCodec;
use crate::dispatch::ShotHandler;
use crate::error::BridgeError;
use crate::shot::{ClubType, StandardizedShot};
use crate::state::SessionPhase;

/// Timings and conventions for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Period between device pings.
    pub heartbeat_interval: Duration,
    /// How long a ping may go unanswered.
    pub ping_timeout: Duration,
    pub shot_complete_delay: Duration,
    pub disarm_delay: Duration,
    pub arm_delay: Duration,
    /// Rewrite spin axis into the signed ±90° convention.
    pub signed_spin_axis: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(10),
            ping_timeout: Duration::from_secs(3),
            shot_complete_delay: Duration::from_millis(300),
            disarm_delay: Duration::from_millis(700),
            arm_delay: Duration::from_millis(1000),
            signed_spin_axis: true,
        }
    }
}

/// Latest values reported by the device.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub club_type: ClubType,
    pub ball: DeviceBallData,
    pub club: DeviceClubData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Deferred {
    PingTimeout,
    ShotComplete,
    Disarm,
    Arm,
}

/// Why a session stopped. Every run ends with exactly one.
#[derive(Debug)]
pub enum SessionEnd {
    PeerClosed,
    CloseRequested,
    LivenessTimeout,
    Shutdown,
    Transport(BridgeError),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "peer closed the connection"),
            Self::CloseRequested => write!(f, "device requested close"),
            Self::LivenessTimeout => write!(f, "no pong within the liveness timeout"),
            Self::Shutdown => write!(f, "bridge shutting down"),
            Self::Transport(e) => write!(f, "transport failure: {e}"),
        }
    }
}

type Flow = ControlFlow<SessionEnd>;

// ── LaunchMonitorSession ─────────────────────────────────────────

pub struct LaunchMonitorSession<S> {
    id: u64,
    framed: Framed<S, JsonFrameCodec>,
    config: SessionConfig,
    handler: Arc<dyn ShotHandler>,
    shutdown: CancellationToken,
    dispatches: TaskTracker,
    phase: SessionPhase,
    state: SessionState,
    timers: DelayQueue<Deferred>,
    ping_key: Option<delay_queue::Key>,
}

impl<S> LaunchMonitorSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(
        stream: S,
        config: SessionConfig,
        handler: Arc<dyn ShotHandler>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id: 0,
            framed: Framed::new(stream, JsonFrameCodec::new()),
            config,
            handler,
            shutdown,
            dispatches: TaskTracker::new(),
            phase: SessionPhase::default(),
            state: SessionState::default(),
            timers: DelayQueue::new(),
            ping_key: None,
        }
    }

    /// Tag log lines with a connection number.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Spawn shot dispatches on `tracker` so the owner can wait for
    /// them after the session ends.
    pub fn with_tracker(mut self, tracker: TaskTracker) -> Self {
        self.dispatches = tracker;
        self
    }

    /// Serve the connection until it ends, then close it.
    pub async fn run(mut self) -> SessionEnd {
        let period = self.config.heartbeat_interval;
        let mut heartbeat = time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shutdown = self.shutdown.clone();

        let end = loop {
            let flow = tokio::select! {
                biased;
                _ = shutdown.cancelled() => Flow::Break(SessionEnd::Shutdown),
                frame = self.framed.next() => match frame {
                    Some(Ok(frame)) => self.on_frame(&frame).await,
                    Some(Err(e)) => Flow::Break(SessionEnd::Transport(e)),
                    None => Flow::Break(SessionEnd::PeerClosed),
                },
                Some(expired) = self.timers.next(), if !self.timers.is_empty() => {
                    self.on_deferred(expired.into_inner()).await
                }
                _ = heartbeat.tick() => self.send_ping().await,
            };
            if let Flow::Break(end) = flow {
                break end;
            }
        };

        self.close(&end).await;
        end
    }

    async fn close(&mut self, end: &SessionEnd) {
        self.phase.disconnect();
        self.timers.clear();
        self.ping_key = None;
        let closing = SinkExt::<DeviceReply>::close(&mut self.framed);
        match time::timeout(Duration::from_secs(1), closing).await {
            Ok(Err(e)) => debug!(session = self.id, "closing socket: {e}"),
            Err(_) => debug!(session = self.id, "closing socket timed out"),
            Ok(Ok(())) => {}
        }
        info!(session = self.id, phase = %self.phase, "session ended: {end}");
    }

    async fn reply(&mut self, reply: DeviceReply) -> Flow {
        match self.framed.send(reply).await {
            Ok(()) => Flow::Continue(()),
            Err(e) => Flow::Break(SessionEnd::Transport(e)),
        }
    }

    // ── Incoming messages ────────────────────────────────────────

    async fn on_frame(&mut self, frame: &[u8]) -> Flow {
        let msg = match RawTelemetryMessage::parse(frame) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(
                    session = self.id,
                    frame = %String::from_utf8_lossy(frame),
                    "discarding frame: {e}"
                );
                return Flow::Continue(());
            }
        };
        debug!(session = self.id, kind = msg.kind(), "device message");

        match msg {
            RawTelemetryMessage::Handshake => self.reply(DeviceReply::handshake()).await,
            RawTelemetryMessage::Challenge => {
                if let Err(e) = self.phase.authenticate() {
                    warn!(session = self.id, phase = %self.phase, "{e}");
                } else {
                    info!(session = self.id, "device authenticated");
                }
                self.reply(DeviceReply::authenticated()).await
            }
            RawTelemetryMessage::SetClubType(Some(club)) => {
                if !club.is_known() {
                    warn!(session = self.id, club_type = %club, "unknown club type");
                }
                info!(session = self.id, club_type = %club, "club type set");
                self.state.club_type = club;
                self.reply(DeviceReply::ack("SetClubType")).await
            }
            RawTelemetryMessage::SetBallData(Some(ball)) => {
                self.state.ball = if self.config.signed_spin_axis {
                    ball.with_signed_spin_axis()
                } else {
                    ball
                };
                debug!(session = self.id, ball = ?self.state.ball, "ball data stored");
                self.reply(DeviceReply::ack("SetBallData")).await
            }
            RawTelemetryMessage::SetClubData(Some(club)) => {
                self.state.club = club;
                debug!(session = self.id, club = ?self.state.club, "club data stored");
                self.reply(DeviceReply::ack("SetClubData")).await
            }
            RawTelemetryMessage::SetClubType(None)
            | RawTelemetryMessage::SetBallData(None)
            | RawTelemetryMessage::SetClubData(None) => {
                let e = BridgeError::Validation(format!("{} without payload", msg.kind()));
                warn!(session = self.id, "{e}");
                Flow::Continue(())
            }
            RawTelemetryMessage::SendShot => self.on_send_shot().await,
            RawTelemetryMessage::Pong => {
                self.on_pong();
                Flow::Continue(())
            }
            RawTelemetryMessage::Close => Flow::Break(SessionEnd::CloseRequested),
            RawTelemetryMessage::Unrecognized(kind) => {
                info!(session = self.id, kind = %kind, "ignoring unhandled message");
                Flow::Continue(())
            }
        }
    }

    async fn on_send_shot(&mut self) -> Flow {
        if let Err(e) = self.phase.begin_shot() {
            warn!(session = self.id, phase = %self.phase, "{e}");
        }
        self.reply(DeviceReply::ack("SendShot")).await?;

        let shot = StandardizedShot::measured(
            self.state.ball.to_standard(),
            self.state.club.to_standard(),
            self.state.club_type.clone(),
        );
        info!(
            session = self.id,
            club_type = %self.state.club_type,
            speed = shot.ball.speed,
            "shot received"
        );
        let handler = Arc::clone(&self.handler);
        self.dispatches.spawn(async move { handler.on_shot(shot).await });

        self.timers
            .insert(Deferred::ShotComplete, self.config.shot_complete_delay);
        self.timers.insert(Deferred::Disarm, self.config.disarm_delay);
        self.timers.insert(Deferred::Arm, self.config.arm_delay);
        Flow::Continue(())
    }

    fn on_pong(&mut self) {
        if let Some(key) = self.ping_key.take() {
            self.timers.remove(&key);
        }
    }

    // ── Timers ───────────────────────────────────────────────────

    async fn send_ping(&mut self) -> Flow {
        self.reply(DeviceReply::command(SimCommand::Ping)).await?;
        if self.ping_key.is_none() {
            self.ping_key = Some(
                self.timers
                    .insert(Deferred::PingTimeout, self.config.ping_timeout),
            );
        }
        Flow::Continue(())
    }

    async fn on_deferred(&mut self, action: Deferred) -> Flow {
        match action {
            Deferred::PingTimeout => {
                self.ping_key = None;
                warn!(session = self.id, "device did not answer ping");
                Flow::Break(SessionEnd::LivenessTimeout)
            }
            Deferred::ShotComplete => self.reply(DeviceReply::shot_complete()).await,
            Deferred::Disarm => self.reply(DeviceReply::command(SimCommand::Disarm)).await,
            Deferred::Arm => {
                if let Err(e) = self.phase.arm() {
                    debug!(session = self.id, "{e}");
                }
                self.reply(DeviceReply::command(SimCommand::Arm)).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};

    #[derive(Default)]
    struct Collect(Mutex<Vec<StandardizedShot>>);

    #[async_trait]
    impl ShotHandler for Collect {
        async fn on_shot(&self, shot: StandardizedShot) {
            self.0.lock().unwrap().push(shot);
        }
    }

    struct Device {
        lines: Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>,
        writer: tokio::io::WriteHalf<DuplexStream>,
    }

    impl Device {
        async fn send(&mut self, json: &str) {
            self.writer.write_all(json.as_bytes()).await.unwrap();
        }

        async fn recv(&mut self) -> Value {
            let line = self.lines.next_line().await.unwrap().expect("stream closed");
            serde_json::from_str(&line).unwrap()
        }
    }

    fn start(
        config: SessionConfig,
    ) -> (Device, Arc<Collect>, tokio::task::JoinHandle<SessionEnd>) {
        let (bridge_side, device_side) = tokio::io::duplex(64 * 1024);
        let handler = Arc::new(Collect::default());
        let session =
            LaunchMonitorSession::new(bridge_side, config, handler.clone(), CancellationToken::new());
        let task = tokio::spawn(session.run());
        let (r, w) = tokio::io::split(device_side);
        let device = Device {
            lines: BufReader::new(r).lines(),
            writer: w,
        };
        (device, handler, task)
    }

    #[tokio::test(start_paused = true)]
    async fn club_type_and_data_are_acked() {
        let (mut dev, _, _task) = start(SessionConfig::default());

        dev.send(r#"{"Type":"SetClubType","ClubType":"Driver"}"#).await;
        assert_eq!(dev.recv().await["SubType"], "SetClubType");

        dev.send(r#"{"Type":"SetClubData","ClubData":{"ClubHeadSpeed":100}}"#)
            .await;
        assert_eq!(dev.recv().await["SubType"], "SetClubData");
    }

    #[tokio::test(start_paused = true)]
    async fn null_payload_gets_no_reply() {
        let (mut dev, _, _task) = start(SessionConfig::default());

        dev.send(r#"{"Type":"SetBallData","BallData":null}"#).await;
        dev.send(r#"{"Type":"Handshake"}"#).await;
        assert_eq!(dev.recv().await["Type"], "Handshake");
    }

    #[tokio::test(start_paused = true)]
    async fn club_type_without_payload_keeps_previous_club() {
        let (mut dev, handler, _task) = start(SessionConfig::default());

        dev.send(r#"{"Type":"SetClubType","ClubType":"Driver"}"#).await;
        assert_eq!(dev.recv().await["SubType"], "SetClubType");

        dev.send(r#"{"Type":"SetClubType"}{"Type":"SendShot"}"#).await;
        assert_eq!(dev.recv().await["SubType"], "SendShot");
        time::sleep(Duration::from_millis(1)).await;

        let shots = handler.0.lock().unwrap();
        assert_eq!(shots[0].club_type().unwrap().as_str(), "Driver");
    }

    #[tokio::test(start_paused = true)]
    async fn garbage_frames_are_skipped() {
        let (mut dev, _, _task) = start(SessionConfig::default());

        dev.send(r#"{"Nope":1}{"Type":"Telemetry"}{"Type":"Challenge"}"#)
            .await;
        assert_eq!(dev.recv().await["Type"], "Authentication");
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_actions_follow_a_shot_in_order() {
        let (mut dev, handler, _task) = start(SessionConfig::default());

        dev.send(r#"{"Type":"SendShot"}"#).await;
        let start = Instant::now();
        assert_eq!(dev.recv().await["SubType"], "SendShot");

        let complete = dev.recv().await;
        assert_eq!(complete["SubType"], "ShotComplete");
        assert!(start.elapsed() >= Duration::from_millis(300));
        assert!(start.elapsed() < Duration::from_millis(700));
        assert_eq!(dev.recv().await["SubType"], "Disarm");
        assert!(start.elapsed() >= Duration::from_millis(700));
        assert!(start.elapsed() < Duration::from_millis(1000));
        assert_eq!(dev.recv().await["SubType"], "Arm");
        assert!(start.elapsed() >= Duration::from_millis(1000));

        let shots = handler.0.lock().unwrap();
        assert_eq!(shots.len(), 1);
        assert_eq!(shots[0].club_type().unwrap().as_str(), "7Iron");
    }

    #[tokio::test(start_paused = true)]
    async fn close_message_ends_session() {
        let (mut dev, _, task) = start(SessionConfig::default());
        dev.send(r#"{"Type":"Close"}"#).await;
        assert!(matches!(task.await.unwrap(), SessionEnd::CloseRequested));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_stops_the_session() {
        let (bridge_side, _device_side) = tokio::io::duplex(1024);
        let token = CancellationToken::new();
        let session = LaunchMonitorSession::new(
            bridge_side,
            SessionConfig::default(),
            Arc::new(Collect::default()),
            token.clone(),
        );
        let task = tokio::spawn(session.run());
        token.cancel();
        assert!(matches!(task.await.unwrap(), SessionEnd::Shutdown));
    }

    #[tokio::test(start_paused = true)]
    async fn spin_axis_is_kept_when_not_signed() {
        let config = SessionConfig {
            signed_spin_axis: false,
            ..Default::default()
        };
        let (mut dev, handler, _task) = start(config);

        dev.send(r#"{"Type":"SetBallData","BallData":{"SpinAxis":350}}{"Type":"SendShot"}"#)
            .await;
        assert_eq!(dev.recv().await["SubType"], "SetBallData");
        assert_eq!(dev.recv().await["SubType"], "SendShot");
        tokio::task::yield_now().await;
        time::sleep(Duration::from_millis(1)).await;

        assert_eq!(handler.0.lock().unwrap()[0].ball.spin_axis, 350.0);
    }
}
