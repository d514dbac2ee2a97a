//! Outbound simulator connection.
//!
//! A [`SimulatorClient`] owns one persistent connection. Shots and
//! heartbeats share a single numbered send path; a background task
//! reads the simulator's replies and only logs them.
//!
//! The client never reconnects. Once the socket is gone every send
//! fails with [`BridgeError::NotConnected`].

mod message;

pub use message::{DeviceIdentity, PlayerInfo, ShotMessage, SimulatorResponse};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::JsonFrameCodec;
use crate::dispatch::ShotSink;
use crate::error::BridgeError;
use crate::shot::StandardizedShot;

type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Connection settings for the simulator.
#[derive(Debug, Clone)]
pub struct SimulatorOptions {
    pub identity: DeviceIdentity,
    pub heartbeat_interval: Duration,
}

impl Default for SimulatorOptions {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity::default(),
            heartbeat_interval: Duration::from_secs(5),
        }
    }
}

struct Writer {
    sink: Option<FramedWrite<BoxWriter, JsonFrameCodec>>,
    /// Last number handed out. Never wraps: once it reaches `i32::MAX`
    /// every send fails.
    shot_number: i32,
}

struct Shared {
    writer: Mutex<Writer>,
    identity: DeviceIdentity,
}

impl Shared {
    /// Number and write one shot. The counter only moves while the
    /// writer lock is held, so wire numbers follow send order.
    async fn send(&self, shot: &StandardizedShot) -> Result<i32, BridgeError> {
        let mut writer = self.writer.lock().await;
        if writer.sink.is_none() {
            return Err(BridgeError::NotConnected);
        }
        let shot_number = writer
            .shot_number
            .checked_add(1)
            .ok_or(BridgeError::ProtocolViolation("shot numbers exhausted"))?;
        writer.shot_number = shot_number;
        let msg = ShotMessage::new(shot, shot_number, &self.identity);

        let Some(sink) = writer.sink.as_mut() else {
            return Err(BridgeError::NotConnected);
        };
        let written = sink.send(msg).await;
        if let Err(e) = written {
            warn!(shot_number, "simulator write failed, dropping connection: {e}");
            writer.sink = None;
            return Err(e);
        }
        Ok(shot_number)
    }

    async fn drop_connection(&self) {
        self.writer.lock().await.sink = None;
    }
}

// ── SimulatorClient ──────────────────────────────────────────────

pub struct SimulatorClient {
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl SimulatorClient {
    /// Connect to the simulator at `addr`, resolving host names.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        options: SimulatorOptions,
    ) -> Result<Self, BridgeError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        info!(addr = %stream.peer_addr()?, "connected to simulator");
        Ok(Self::from_stream(stream, options))
    }

    /// Wrap an established stream and start the reader and heartbeat
    /// tasks.
    pub fn from_stream<S>(stream: S, options: SimulatorOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let sink = FramedWrite::new(Box::new(write_half) as BoxWriter, JsonFrameCodec::new());
        let client = Self::with_sink(Some(sink), options.identity);

        tokio::spawn(read_responses(
            FramedRead::new(read_half, JsonFrameCodec::new()),
            Arc::clone(&client.shared),
            client.shutdown.clone(),
        ));
        tokio::spawn(heartbeat(
            Arc::clone(&client.shared),
            options.heartbeat_interval,
            client.shutdown.clone(),
        ));
        client
    }

    /// A client with no connection. Every send fails with
    /// [`BridgeError::NotConnected`].
    pub fn detached(options: SimulatorOptions) -> Self {
        Self::with_sink(None, options.identity)
    }

    fn with_sink(sink: Option<FramedWrite<BoxWriter, JsonFrameCodec>>, identity: DeviceIdentity) -> Self {
        Self {
            shared: Arc::new(Shared {
                writer: Mutex::new(Writer {
                    sink,
                    shot_number: 0,
                }),
                identity,
            }),
            shutdown: CancellationToken::new(),
        }
    }

    /// Send one shot and return the shot number it went out with.
    pub async fn send_shot(&self, shot: &StandardizedShot) -> Result<i32, BridgeError> {
        self.shared.send(shot).await
    }

    /// Highest shot number handed out so far, heartbeats included.
    pub async fn shots_sent(&self) -> i32 {
        self.shared.writer.lock().await.shot_number
    }

    pub async fn is_connected(&self) -> bool {
        self.shared.writer.lock().await.sink.is_some()
    }

    /// Stop the background tasks and close the socket.
    pub async fn close(&self) {
        self.shutdown.cancel();
        let sink = self.shared.writer.lock().await.sink.take();
        if let Some(mut sink) = sink {
            if let Err(e) = SinkExt::<ShotMessage>::close(&mut sink).await {
                debug!("closing simulator connection: {e}");
            }
            info!("simulator connection closed");
        }
    }
}

impl Drop for SimulatorClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl ShotSink for SimulatorClient {
    async fn send_shot(&self, shot: &StandardizedShot) -> Result<(), BridgeError> {
        let shot_number = SimulatorClient::send_shot(self, shot).await?;
        debug!(shot_number, "shot written to simulator");
        Ok(())
    }
}

// ── Background tasks ─────────────────────────────────────────────

async fn read_responses<R>(
    mut frames: FramedRead<R, JsonFrameCodec>,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => return,
            frame = frames.next() => frame,
        };
        match frame {
            Some(Ok(frame)) => match serde_json::from_slice::<SimulatorResponse>(&frame) {
                Ok(resp) if resp.is_success() => {
                    info!(code = resp.code, player = ?resp.player, "simulator: {}", resp.message);
                }
                Ok(resp) => {
                    warn!(code = resp.code, "simulator: {}", resp.message);
                }
                Err(e) => warn!("undecodable simulator response: {e}"),
            },
            Some(Err(e)) => {
                warn!("simulator read failed: {e}");
                shared.drop_connection().await;
                return;
            }
            None => {
                warn!("simulator closed the connection");
                shared.drop_connection().await;
                return;
            }
        }
    }
}

async fn heartbeat(shared: Arc<Shared>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let beat = StandardizedShot::heartbeat();

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }
        match shared.send(&beat).await {
            Ok(shot_number) => debug!(shot_number, "simulator heartbeat"),
            Err(BridgeError::NotConnected) => return,
            Err(e) => warn!("simulator heartbeat failed: {e}"),
        }
    }
}
