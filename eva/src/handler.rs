//! Bridges `RealtimeClient`'s event callbacks to the `AudioPlayer`, and
//! back into the client itself for barge-in. `RealtimeClient::new` takes
//! its handler by `Arc` before the client exists, so the handler holds
//! only a `Weak` back-reference, set once the client is constructed.

use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use tracing::{info, warn};

use eva_core::audio::AudioPlayer;
use eva_core::realtime::{RealtimeClient, RealtimeEventHandler};
use eva_core::robot::AudioSink;

/// Plays streamed assistant audio and cancels both playback and the
/// in-flight response when the user starts talking over it (§4.5/§4.6
/// barge-in).
pub struct BridgeHandler<S: AudioSink> {
    player: Arc<AudioPlayer<S>>,
    client: OnceLock<Weak<RealtimeClient>>,
    assistant_text: tokio::sync::Mutex<String>,
}

impl<S: AudioSink> BridgeHandler<S> {
    pub fn new(player: Arc<AudioPlayer<S>>) -> Self {
        Self {
            player,
            client: OnceLock::new(),
            assistant_text: tokio::sync::Mutex::new(String::new()),
        }
    }

    /// Must be called exactly once, right after the owning `RealtimeClient`
    /// is wrapped in an `Arc`.
    pub fn bind_client(&self, client: &Arc<RealtimeClient>) {
        let _ = self.client.set(Arc::downgrade(client));
    }

    fn client(&self) -> Option<Arc<RealtimeClient>> {
        self.client.get().and_then(Weak::upgrade)
    }
}

#[async_trait]
impl<S: AudioSink + 'static> RealtimeEventHandler for BridgeHandler<S> {
    async fn on_session_created(&self) {
        info!("dialogue session ready");
    }

    async fn on_error(&self, message: String) {
        warn!(message, "dialogue session error");
    }

    async fn on_speech_started(&self) {
        self.player.cancel().await;
        if let Some(client) = self.client() {
            if let Err(e) = client.cancel_response().await {
                warn!(error = %e, "failed to cancel in-flight response on barge-in");
            }
        }
    }

    async fn on_speech_stopped(&self) {}

    async fn on_transcript(&self, text: String, is_final: bool) {
        info!(text, is_final, "transcript");
        if !is_final {
            let mut buf = self.assistant_text.lock().await;
            buf.push_str(&text);
            self.player.begin_utterance(buf.clone()).await;
        }
    }

    async fn on_audio_delta(&self, base64_audio: String) {
        if let Err(e) = self.player.append_audio(&base64_audio).await {
            warn!(error = %e, "failed to append assistant audio");
        }
    }

    async fn on_audio_done(&self) {
        if let Err(e) = self.player.flush_and_play().await {
            warn!(error = %e, "failed to flush assistant audio");
        }
        self.assistant_text.lock().await.clear();
    }
}
