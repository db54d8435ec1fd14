//! Gateway (WebSocket) transport for the Discord API.
//!
//! This module owns the WebSocket connection lifecycle:
//!   - connect, receive HELLO, send IDENTIFY
//!   - background heartbeat task
//!   - sequence number and session id tracking
//!   - reconnect and RESUME on disconnect
//!   - gateway send rate limiting (120 events / 60s)
//!
//! The rest of the crate consumes a channel of [`GatewayEvent`] values and
//! never touches `tokio_tungstenite` directly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bitflags::bitflags;
use futures_util::{SinkExt, StreamExt};
use serde::{Serialize, Serializer};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use crate::events::GatewayEvent;
use crate::types::GatewayPayload;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const DEFAULT_GATEWAY_URL: &str = "wss://gateway.discord.gg/?v=10&encoding=json";

/// Discord allows at most 120 gateway sends per 60 seconds.
const SEND_BUDGET_MAX: u32 = 120;
const SEND_BUDGET_WINDOW: Duration = Duration::from_secs(60);

/// Consecutive failed connections before the driver gives up.
const MAX_RECONNECT_ATTEMPTS: u32 = 8;

const HELLO_TIMEOUT: Duration = Duration::from_secs(30);
const EVENT_BUFFER: usize = 256;

mod opcode {
    pub const HEARTBEAT: u8 = 1;
    pub const IDENTIFY: u8 = 2;
    pub const RESUME: u8 = 6;
    pub const HELLO: u8 = 10;
}

// ---------------------------------------------------------------------------
// Intents
// ---------------------------------------------------------------------------

bitflags! {
    /// Gateway intents: which event groups Discord sends us.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Intents: u64 {
        const GUILDS = 1 << 0;
        const GUILD_MEMBERS = 1 << 1;
        const GUILD_MESSAGES = 1 << 9;
        const GUILD_MESSAGE_REACTIONS = 1 << 10;
        const DIRECT_MESSAGES = 1 << 12;
        const MESSAGE_CONTENT = 1 << 15;
    }
}

impl Intents {
    /// What the bot needs: prefix commands, dialog replies and reactions.
    pub fn bot() -> Self {
        Intents::GUILDS
            | Intents::GUILD_MEMBERS
            | Intents::GUILD_MESSAGES
            | Intents::GUILD_MESSAGE_REACTIONS
            | Intents::DIRECT_MESSAGES
            | Intents::MESSAGE_CONTENT
    }
}

impl Serialize for Intents {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.bits())
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid gateway payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Discord closed the connection with a code we must not retry.
    #[error("gateway closed with code {code}: {reason}")]
    Fatal { code: u16, reason: &'static str },

    #[error("gave up after {0} reconnect attempts")]
    ReconnectsExhausted(u32),

    #[error("gateway driver stopped: {0}")]
    Driver(String),
}

// ---------------------------------------------------------------------------
// Gateway send rate limiter
// ---------------------------------------------------------------------------

/// Sliding-window rate limiter for outbound gateway messages.
struct SendRateLimiter {
    timestamps: Vec<Instant>,
    budget: u32,
    window: Duration,
}

impl SendRateLimiter {
    fn new(budget: u32, window: Duration) -> Self {
        Self {
            timestamps: Vec::with_capacity(budget as usize),
            budget,
            window,
        }
    }

    /// How long to wait before the next send, or `None` if there is budget
    /// left. Does not record anything; call [`SendRateLimiter::record`]
    /// after sending.
    fn delay(&self, now: Instant) -> Option<Duration> {
        let in_window: Vec<Instant> = self
            .timestamps
            .iter()
            .copied()
            .filter(|&t| now.duration_since(t) < self.window)
            .collect();
        if (in_window.len() as u32) < self.budget {
            return None;
        }
        let oldest = in_window.into_iter().min()?;
        (oldest + self.window).checked_duration_since(now)
    }

    fn record(&mut self, now: Instant) {
        let window = self.window;
        self.timestamps.retain(|&t| now.duration_since(t) < window);
        self.timestamps.push(now);
    }
}

// ---------------------------------------------------------------------------
// Configuration and session state
// ---------------------------------------------------------------------------

/// Options for connecting to the Discord gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub token: String,
    pub intents: Intents,
    /// `[shard_id, num_shards]`
    pub shard: Option<[u32; 2]>,
}

impl GatewayConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            intents: Intents::bot(),
            shard: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    session_id: Option<String>,
    resume_gateway_url: Option<String>,
    sequence: Option<u64>,
}

impl SessionState {
    fn forget(&mut self) {
        self.session_id = None;
        self.sequence = None;
    }
}

// ---------------------------------------------------------------------------
// Outbound payloads
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct Outbound<D> {
    op: u8,
    d: D,
}

#[derive(Serialize)]
struct ConnectionProperties {
    os: &'static str,
    browser: &'static str,
    device: &'static str,
}

#[derive(Serialize)]
struct Identify<'a> {
    token: &'a str,
    properties: ConnectionProperties,
    intents: Intents,
    #[serde(skip_serializing_if = "Option::is_none")]
    shard: Option<[u32; 2]>,
}

#[derive(Serialize)]
struct Resume<'a> {
    token: &'a str,
    session_id: &'a str,
    seq: u64,
}

fn encode<D: Serialize>(op: u8, d: D) -> Result<String, GatewayError> {
    Ok(serde_json::to_string(&Outbound { op, d })?)
}

fn identify_payload(config: &GatewayConfig) -> Result<String, GatewayError> {
    encode(
        opcode::IDENTIFY,
        Identify {
            token: &config.token,
            properties: ConnectionProperties {
                os: std::env::consts::OS,
                browser: env!("CARGO_PKG_NAME"),
                device: env!("CARGO_PKG_NAME"),
            },
            intents: config.intents,
            shard: config.shard,
        },
    )
}

/// `None` when there is no session to resume.
fn resume_payload(token: &str, session: &SessionState) -> Option<Result<String, GatewayError>> {
    let session_id = session.session_id.as_deref()?;
    let seq = session.sequence?;
    Some(encode(
        opcode::RESUME,
        Resume {
            token,
            session_id,
            seq,
        },
    ))
}

fn heartbeat_payload(seq: Option<u64>) -> Result<String, GatewayError> {
    encode(opcode::HEARTBEAT, seq)
}

/// Resume URLs come without query parameters.
fn with_query(url: &str) -> String {
    if url.contains("v=10") {
        url.to_string()
    } else if url.contains('?') {
        format!("{}&v=10&encoding=json", url)
    } else {
        format!("{}?v=10&encoding=json", url)
    }
}

// ---------------------------------------------------------------------------
// Disconnect handling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DisconnectReason {
    ShouldResume,
    ShouldReidentify,
    Fatal { code: u16, reason: &'static str },
    EventChannelClosed,
}

fn classify_close(code: u16) -> DisconnectReason {
    let fatal = |reason| DisconnectReason::Fatal { code, reason };
    match code {
        4004 => fatal("authentication failed"),
        4010 => fatal("invalid shard"),
        4011 => fatal("sharding required"),
        4012 => fatal("invalid API version"),
        4013 => fatal("invalid intents"),
        4014 => fatal("disallowed intents"),
        4007 | 4009 => DisconnectReason::ShouldReidentify,
        _ => DisconnectReason::ShouldResume,
    }
}

/// Exponential backoff with jitter, capped at 60 s.
fn backoff_delay(attempt: u32) -> Duration {
    let base_ms = 1000u64 * 2u64.saturating_pow(attempt.min(6));
    let jittered = (rand::random::<f64>() * 0.5 + 0.75) * base_ms as f64;
    Duration::from_millis(jittered.min(60_000.0) as u64)
}

// ---------------------------------------------------------------------------
// WebSocket halves
// ---------------------------------------------------------------------------

type WsConnection =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures_util::stream::SplitSink<WsConnection, WsMessage>;
type WsStream = futures_util::stream::SplitStream<WsConnection>;

/// Write half shared between the read loop and the heartbeat task.
#[derive(Clone)]
struct Outlet {
    sink: Arc<Mutex<WsSink>>,
    limiter: Arc<Mutex<SendRateLimiter>>,
}

impl Outlet {
    fn new(sink: WsSink) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            limiter: Arc::new(Mutex::new(SendRateLimiter::new(
                SEND_BUDGET_MAX,
                SEND_BUDGET_WINDOW,
            ))),
        }
    }

    /// Send a text frame once the rate limiter allows it.
    async fn send(&self, text: String) -> Result<(), GatewayError> {
        loop {
            let delay = self.limiter.lock().await.delay(Instant::now());
            match delay {
                Some(d) => {
                    debug!(delay_ms = d.as_millis() as u64, "gateway send rate-limited");
                    tokio::time::sleep(d).await;
                }
                None => break,
            }
        }
        self.limiter.lock().await.record(Instant::now());
        self.sink.lock().await.send(WsMessage::Text(text)).await?;
        Ok(())
    }

    async fn close(&self) {
        let _ = self.sink.lock().await.send(WsMessage::Close(None)).await;
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// A running gateway connection.
pub struct GatewayHandle {
    /// Typed events, in the order Discord sent them.
    pub events: async_channel::Receiver<GatewayEvent>,
    /// Resolves when the driver stops, with the reason it stopped.
    pub driver: tokio::task::JoinHandle<Result<(), GatewayError>>,
}

/// Spawn the gateway driver and return its event channel.
///
/// The driver keeps reconnecting (resuming where possible) until the
/// receiver is dropped, Discord closes with a fatal code, or too many
/// consecutive connection attempts fail.
pub fn connect(config: GatewayConfig) -> GatewayHandle {
    let (event_tx, event_rx) = async_channel::bounded(EVENT_BUFFER);
    let driver = tokio::spawn(gateway_driver(config, event_tx));
    GatewayHandle {
        events: event_rx,
        driver,
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

async fn gateway_driver(
    config: GatewayConfig,
    event_tx: async_channel::Sender<GatewayEvent>,
) -> Result<(), GatewayError> {
    let session = Arc::new(Mutex::new(SessionState::default()));
    let mut attempts: u32 = 0;

    loop {
        if attempts > 0 {
            if attempts > MAX_RECONNECT_ATTEMPTS {
                error!(attempts, "exceeded max reconnect attempts, giving up");
                return Err(GatewayError::ReconnectsExhausted(attempts - 1));
            }
            let backoff = backoff_delay(attempts);
            warn!(
                delay_ms = backoff.as_millis() as u64,
                attempt = attempts,
                "backing off before reconnect"
            );
            tokio::time::sleep(backoff).await;
        }

        match run_connection(&config, &session, &event_tx).await {
            Ok(DisconnectReason::ShouldResume) => {
                info!("will attempt RESUME");
                attempts = 1;
            }
            Ok(DisconnectReason::ShouldReidentify) => {
                info!("session invalidated, will re-IDENTIFY");
                session.lock().await.forget();
                attempts = 1;
            }
            Ok(DisconnectReason::Fatal { code, reason }) => {
                error!(code, reason, "fatal gateway close, shutting down");
                return Err(GatewayError::Fatal { code, reason });
            }
            Ok(DisconnectReason::EventChannelClosed) => {
                info!("event channel closed, shutting down gateway driver");
                return Ok(());
            }
            Err(e) => {
                error!(error = %e, "gateway connection failed");
                attempts += 1;
            }
        }
    }
}

/// One connection, from the WebSocket handshake until it drops.
async fn run_connection(
    config: &GatewayConfig,
    session: &Arc<Mutex<SessionState>>,
    event_tx: &async_channel::Sender<GatewayEvent>,
) -> Result<DisconnectReason, GatewayError> {
    let url = {
        let s = session.lock().await;
        with_query(
            s.resume_gateway_url
                .as_deref()
                .unwrap_or(DEFAULT_GATEWAY_URL),
        )
    };
    info!(url = %url, "connecting to Discord gateway");

    let (ws, _) = tokio_tungstenite::connect_async(&url).await?;
    let (sink, mut stream) = ws.split();
    let outlet = Outlet::new(sink);

    let heartbeat_interval = read_hello(&mut stream).await?;
    info!(interval_ms = heartbeat_interval, "received HELLO");

    let resume = resume_payload(&config.token, &*session.lock().await);
    match resume {
        Some(payload) => {
            outlet.send(payload?).await?;
            info!("sent RESUME");
        }
        None => {
            outlet.send(identify_payload(config)?).await?;
            info!("sent IDENTIFY");
        }
    }

    let (stop_tx, stop_rx) = mpsc::channel::<()>(1);
    let heartbeat = tokio::spawn(heartbeat_task(
        outlet.clone(),
        Arc::clone(session),
        Duration::from_millis(heartbeat_interval),
        stop_rx,
    ));

    let reason = read_loop(&mut stream, &outlet, event_tx, session).await;

    let _ = stop_tx.send(()).await;
    heartbeat.abort();
    outlet.close().await;
    Ok(reason)
}

/// Heartbeat every `interval`, the first one after a random fraction of it.
async fn heartbeat_task(
    outlet: Outlet,
    session: Arc<Mutex<SessionState>>,
    interval: Duration,
    mut stop: mpsc::Receiver<()>,
) {
    let first = interval.mul_f64(rand::random::<f64>());
    tokio::select! {
        _ = tokio::time::sleep(first) => {}
        _ = stop.recv() => return,
    }

    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let seq = session.lock().await.sequence;
                let sent = match heartbeat_payload(seq) {
                    Ok(payload) => outlet.send(payload).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = sent {
                    warn!(error = %e, "heartbeat send failed, stopping heartbeat task");
                    return;
                }
                debug!(seq, "sent heartbeat");
            }
            _ = stop.recv() => {
                debug!("heartbeat task stopped");
                return;
            }
        }
    }
}

async fn read_loop(
    stream: &mut WsStream,
    outlet: &Outlet,
    event_tx: &async_channel::Sender<GatewayEvent>,
    session: &Arc<Mutex<SessionState>>,
) -> DisconnectReason {
    loop {
        let frame = match stream.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                warn!(error = %e, "WebSocket read error");
                return DisconnectReason::ShouldResume;
            }
            None => {
                info!("WebSocket stream ended");
                return DisconnectReason::ShouldResume;
            }
        };

        let text = match frame {
            WsMessage::Text(text) => text,
            WsMessage::Close(frame) => {
                let code = frame.map(|f| u16::from(f.code));
                warn!(close_code = ?code, "WebSocket closed by server");
                return code.map_or(DisconnectReason::ShouldResume, classify_close);
            }
            _ => continue,
        };

        let payload: GatewayPayload = match serde_json::from_str(&text) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to parse gateway payload");
                continue;
            }
        };
        if let Some(seq) = payload.s {
            session.lock().await.sequence = Some(seq);
        }

        let event = GatewayEvent::from_payload(payload);
        match &event {
            GatewayEvent::Ready(ready) => {
                let mut s = session.lock().await;
                s.session_id = Some(ready.session_id.clone());
                s.resume_gateway_url = Some(ready.resume_gateway_url.clone());
                info!(
                    session_id = %ready.session_id,
                    user = %ready.user.username,
                    "gateway READY"
                );
            }
            GatewayEvent::HeartbeatRequest => {
                let seq = session.lock().await.sequence;
                let sent = match heartbeat_payload(seq) {
                    Ok(payload) => outlet.send(payload).await,
                    Err(e) => Err(e),
                };
                if let Err(e) = sent {
                    warn!(error = %e, "failed to send requested heartbeat");
                }
                continue;
            }
            GatewayEvent::HeartbeatAck => {
                debug!("heartbeat acknowledged");
                continue;
            }
            GatewayEvent::Reconnect => {
                info!("gateway requested reconnect (op 7)");
                return DisconnectReason::ShouldResume;
            }
            GatewayEvent::InvalidSession(resumable) => {
                warn!(resumable, "session invalidated (op 9)");
                let (wait, reason) = if *resumable {
                    (2, DisconnectReason::ShouldResume)
                } else {
                    (3, DisconnectReason::ShouldReidentify)
                };
                tokio::time::sleep(Duration::from_secs(wait)).await;
                return reason;
            }
            _ => {}
        }

        if event_tx.send(event).await.is_err() {
            return DisconnectReason::EventChannelClosed;
        }
    }
}

/// Wait for HELLO and return its heartbeat interval in milliseconds.
async fn read_hello(stream: &mut WsStream) -> Result<u64, GatewayError> {
    let frame = tokio::time::timeout(HELLO_TIMEOUT, stream.next())
        .await
        .map_err(|_| GatewayError::Handshake("timed out waiting for HELLO".into()))?
        .ok_or_else(|| GatewayError::Handshake("stream ended before HELLO".into()))??;

    let WsMessage::Text(text) = frame else {
        return Err(GatewayError::Handshake(format!(
            "expected a text frame for HELLO, got {:?}",
            frame
        )));
    };
    parse_hello(&text)
}

fn parse_hello(text: &str) -> Result<u64, GatewayError> {
    let payload: GatewayPayload = serde_json::from_str(text)?;
    if payload.op != opcode::HELLO {
        return Err(GatewayError::Handshake(format!(
            "expected op {} (HELLO), got op {}",
            opcode::HELLO,
            payload.op
        )));
    }
    payload
        .d
        .as_ref()
        .and_then(|d| d.get("heartbeat_interval"))
        .and_then(|v| v.as_u64())
        .ok_or_else(|| GatewayError::Handshake("HELLO missing heartbeat_interval".into()))
}
