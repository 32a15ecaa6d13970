//! Realtime Client (§4.5): full-duplex session lifecycle, tool dispatch,
//! and connection hygiene for the dialogue service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex, RwLock};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::RealtimeError;
use crate::realtime::events::{
    ClientEvent, ConversationItem, FunctionCallOutputItem, MessageContent, ServerEvent,
    SessionConfig,
};
use crate::tools::ToolRegistry;

const DIAL_TIMEOUT: Duration = Duration::from_secs(10);
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(25);
const STALE_AFTER: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    SessionReady,
    Closing,
    Closed,
}

/// Callbacks the client invokes as events arrive. Default no-op methods
/// let implementers hook only the events they care about.
#[async_trait]
pub trait RealtimeEventHandler: Send + Sync {
    async fn on_session_created(&self) {}
    async fn on_error(&self, message: String) {
        warn!(message, "realtime client error");
    }
    async fn on_speech_started(&self) {}
    async fn on_speech_stopped(&self) {}
    /// `is_final` distinguishes a completed user-transcription event from
    /// a streaming assistant audio-transcript delta.
    async fn on_transcript(&self, text: String, is_final: bool) {
        let _ = (text, is_final);
    }
    async fn on_audio_delta(&self, base64_audio: String) {
        let _ = base64_audio;
    }
    async fn on_audio_done(&self) {}
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

struct Connection {
    sink: Mutex<WsSink>,
}

/// A full-duplex session with the dialogue service.
pub struct RealtimeClient {
    url: String,
    tools: Arc<ToolRegistry>,
    handler: Arc<dyn RealtimeEventHandler>,
    state: RwLock<SessionState>,
    connection: RwLock<Option<Arc<Connection>>>,
    last_seen: watch::Sender<std::time::Instant>,
}

impl RealtimeClient {
    pub fn new(url: String, tools: Arc<ToolRegistry>, handler: Arc<dyn RealtimeEventHandler>) -> Self {
        let (last_seen, _) = watch::channel(std::time::Instant::now());
        Self {
            url,
            tools,
            handler,
            state: RwLock::new(SessionState::Disconnected),
            connection: RwLock::new(None),
            last_seen,
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    /// Instant of the last message received from the socket (ping/pong
    /// included), for external staleness checks.
    pub fn last_message_at(&self) -> std::time::Instant {
        *self.last_seen.borrow()
    }

    /// Open the duplex channel and spawn the receive and keepalive loops.
    /// Emits nothing until the first `session.created` event; callers see
    /// `SessionReady` only after that.
    pub async fn connect(self: &Arc<Self>, cancel: CancellationToken) -> Result<(), RealtimeError> {
        *self.state.write().await = SessionState::Connecting;

        let (ws, _response) = tokio::time::timeout(DIAL_TIMEOUT, tokio_tungstenite::connect_async(self.url.as_str()))
            .await
            .map_err(|_| RealtimeError::Transport("dial timed out".into()))?
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;

        let (sink, source) = ws.split();
        *self.connection.write().await = Some(Arc::new(Connection {
            sink: Mutex::new(sink),
        }));
        *self.state.write().await = SessionState::Connected;

        let receive_this = self.clone();
        let receive_cancel = cancel.clone();
        tokio::spawn(async move { receive_this.run_receive_loop(source, receive_cancel).await });

        let keepalive_this = self.clone();
        let keepalive_cancel = cancel.clone();
        tokio::spawn(async move { keepalive_this.run_keepalive_loop(keepalive_cancel).await });

        Ok(())
    }

    async fn run_receive_loop(&self, mut source: WsSource, cancel: CancellationToken) {
        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(STALE_AFTER) => {
                    self.handler.on_error("connection considered dead: no message for 120s".into()).await;
                    *self.state.write().await = SessionState::Closed;
                    return;
                }
                msg = source.next() => msg,
            };

            let Some(msg) = next else {
                *self.state.write().await = SessionState::Closed;
                return;
            };

            let _ = self.last_seen.send(std::time::Instant::now());

            match msg {
                Ok(Message::Text(text)) => self.handle_server_text(&text).await,
                Ok(Message::Binary(_)) => {}
                Ok(Message::Ping(payload)) => {
                    if let Some(conn) = self.connection.read().await.clone() {
                        let _ = conn.sink.lock().await.send(Message::Pong(payload)).await;
                    }
                }
                Ok(Message::Pong(_)) => {}
                Ok(Message::Close(_)) => {
                    *self.state.write().await = SessionState::Closed;
                    return;
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => {
                    self.handler.on_error(e.to_string()).await;
                    *self.state.write().await = SessionState::Closed;
                    return;
                }
            }
        }
    }

    /// Pings on a fixed cadence, but skips a round if a message (including
    /// the server's own pings) already arrived within the interval.
    async fn run_keepalive_loop(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    if self.last_message_at().elapsed() < KEEPALIVE_INTERVAL {
                        continue;
                    }
                    let Some(conn) = self.connection.read().await.clone() else { return };
                    if conn.sink.lock().await.send(Message::Ping(Vec::new())).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    async fn handle_server_text(&self, text: &str) {
        let event: Result<ServerEvent, _> = serde_json::from_str(text);
        let event = match event {
            Ok(e) => e,
            Err(e) => {
                debug!(error = %e, "failed to parse server event");
                return;
            }
        };

        match event {
            ServerEvent::SessionCreated => {
                *self.state.write().await = SessionState::SessionReady;
                self.handler.on_session_created().await;
            }
            ServerEvent::Error { error } => self.handler.on_error(error.message).await,
            ServerEvent::SpeechStarted => self.handler.on_speech_started().await,
            ServerEvent::SpeechStopped => self.handler.on_speech_stopped().await,
            ServerEvent::InputAudioTranscriptionCompleted { transcript } => {
                self.handler.on_transcript(transcript, true).await
            }
            ServerEvent::ResponseAudioTranscriptDelta { delta } => {
                self.handler.on_transcript(delta, false).await
            }
            ServerEvent::ResponseAudioTranscriptDone => {}
            ServerEvent::ResponseAudioDelta { delta } => self.handler.on_audio_delta(delta).await,
            ServerEvent::ResponseAudioDone => self.handler.on_audio_done().await,
            ServerEvent::ResponseFunctionCallArgumentsDone {
                call_id,
                name,
                arguments,
            } => self.dispatch_tool_call(call_id, name, arguments).await,
            ServerEvent::Unknown => {}
        }
    }

    async fn dispatch_tool_call(&self, call_id: String, name: String, arguments: String) {
        let args: Value = match serde_json::from_str(&arguments) {
            Ok(v) => v,
            Err(e) => serde_json::json!({ "__parse_error": e.to_string() }),
        };
        let result = self.tools.dispatch(&name, args).await;
        let output = FunctionCallOutputItem::new(call_id, result);
        if let Err(e) = self
            .send_event(ClientEvent::FunctionCallOutput { item: output })
            .await
        {
            error!(error = %e, "failed to post function-call output");
            return;
        }
        if let Err(e) = self.send_event(ClientEvent::ResponseCreate).await {
            error!(error = %e, "failed to request response continuation");
        }
    }

    async fn send_event(&self, event: ClientEvent) -> Result<(), RealtimeError> {
        let guard = self.connection.read().await;
        let Some(conn) = guard.as_ref() else {
            return Err(RealtimeError::NotConnected);
        };
        let text = serde_json::to_string(&event).map_err(|e| RealtimeError::Protocol(e.to_string()))?;
        conn.sink
            .lock()
            .await
            .send(Message::Text(text))
            .await
            .map_err(|e| RealtimeError::Transport(e.to_string()))
    }

    /// Single atomic session config: modalities, PCM16 formats, server
    /// VAD, every registered tool, tool_choice=auto.
    pub async fn configure_session(
        &self,
        instructions: String,
        voice_id: String,
        silence_duration_ms: u32,
    ) -> Result<(), RealtimeError> {
        let silence_duration_ms = silence_duration_ms.clamp(200, 500);
        let tool_schemas: Vec<Value> = self
            .tools
            .schemas()
            .into_iter()
            .map(|s| s.to_json_schema_with_name())
            .collect();
        let session = SessionConfig::new(instructions, voice_id, silence_duration_ms, tool_schemas);
        self.send_event(ClientEvent::SessionUpdate { session }).await
    }

    /// Base64 and append. No-op if not connected.
    pub async fn send_audio(&self, pcm16_bytes: &[u8]) -> Result<(), RealtimeError> {
        if self.connection.read().await.is_none() {
            return Ok(());
        }
        use base64::Engine;
        let audio = base64::engine::general_purpose::STANDARD.encode(pcm16_bytes);
        self.send_event(ClientEvent::InputAudioBufferAppend { audio }).await
    }

    pub async fn commit_audio(&self) -> Result<(), RealtimeError> {
        self.send_event(ClientEvent::InputAudioBufferCommit).await
    }

    pub async fn clear_audio(&self) -> Result<(), RealtimeError> {
        self.send_event(ClientEvent::InputAudioBufferClear).await
    }

    /// Inject a user text turn and request a response.
    pub async fn send_text(&self, text: String) -> Result<(), RealtimeError> {
        self.send_event(ClientEvent::ConversationItemCreate {
            item: ConversationItem::Message {
                role: "user".to_string(),
                content: vec![MessageContent::InputText { text }],
            },
        })
        .await?;
        self.send_event(ClientEvent::ResponseCreate).await
    }

    pub async fn cancel_response(&self) -> Result<(), RealtimeError> {
        self.send_event(ClientEvent::ResponseCancel).await
    }

    /// Idempotent.
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        if *state == SessionState::Closed || *state == SessionState::Disconnected {
            return;
        }
        *state = SessionState::Closing;
        drop(state);

        if let Some(conn) = self.connection.write().await.take() {
            let _ = conn.sink.lock().await.send(Message::Close(None)).await;
        }
        *self.state.write().await = SessionState::Closed;
    }
}

/// Placeholder registrar so tool schemas carry their own name in the
/// rendered JSON Schema, matching the dialogue service's function-calling
/// tool format (`{name, description, parameters}`).
trait ToolSchemaExt {
    fn to_json_schema_with_name(&self) -> Value;
}

impl ToolSchemaExt for crate::tools::ToolSchema {
    fn to_json_schema_with_name(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "name": self.name,
            "description": self.description,
            "parameters": self.to_json_schema(),
        })
    }
}

/// A registry-backed tool-call dispatch path usable independent of a live
/// connection, for unit testing `dispatch_tool_call`'s framing logic
/// without a socket.
pub struct DispatchOnlyHandler {
    pub transcripts: std::sync::Mutex<Vec<(String, bool)>>,
    pub errors: std::sync::Mutex<Vec<String>>,
    pub session_created: AtomicBool,
}

impl Default for DispatchOnlyHandler {
    fn default() -> Self {
        Self {
            transcripts: std::sync::Mutex::new(Vec::new()),
            errors: std::sync::Mutex::new(Vec::new()),
            session_created: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl RealtimeEventHandler for DispatchOnlyHandler {
    async fn on_session_created(&self) {
        self.session_created.store(true, Ordering::SeqCst);
    }
    async fn on_error(&self, message: String) {
        self.errors.lock().unwrap().push(message);
    }
    async fn on_transcript(&self, text: String, is_final: bool) {
        self.transcripts.lock().unwrap().push((text, is_final));
    }
}
