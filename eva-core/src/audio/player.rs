//! Audio Player (§4.6): a streaming sink for base64 PCM16 at the service
//! output rate, with backpressure and instant cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use tokio::sync::broadcast;
use tokio::sync::Mutex;
use tracing::{error, warn};

use crate::audio::codec::{bytes_to_samples, AudioChunk};
use crate::error::AudioPlayerError;
use crate::robot::AudioSink;

const FLUSH_DRAIN: Duration = Duration::from_millis(100);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(30);
const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Lifecycle events emitted by the player, mirroring `OnPlaybackStart` /
/// `OnPlaybackEnd` from the spec. `End` carries the utterance's text, when
/// the caller supplied one via [`AudioPlayer::begin_utterance`], for a
/// transcript log pairing audio with what was said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Start,
    End { text: Option<String> },
}

struct Inner<S: AudioSink> {
    sink: S,
    pipeline_active: bool,
    pending_text: Option<String>,
}

/// Streaming PCM16 playback sink with base64 append, flush, and cancel.
pub struct AudioPlayer<S: AudioSink> {
    inner: Mutex<Inner<S>>,
    speaking: Arc<AtomicBool>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl<S: AudioSink> AudioPlayer<S> {
    pub fn new(sink: S) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            inner: Mutex::new(Inner {
                sink,
                pipeline_active: false,
                pending_text: None,
            }),
            speaking: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Wait-free query used by uplink gating.
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Record the text the next flushed utterance corresponds to, so the
    /// `End` event it produces can be paired with it. Optional; a caller
    /// that never calls this just gets `End { text: None }`.
    pub async fn begin_utterance(&self, text: impl Into<String>) {
        self.inner.lock().await.pending_text = Some(text.into());
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.events.send(event);
    }

    /// Decode base64 PCM16 and write it to the pipeline, starting playback
    /// lazily on the first chunk.
    pub async fn append_audio(&self, base64_pcm: &str) -> Result<(), AudioPlayerError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(base64_pcm)?;
        let samples = bytes_to_samples(&bytes);
        let chunk = AudioChunk::new(samples, OUTPUT_SAMPLE_RATE, 1);

        let mut guard = self.inner.lock().await;
        if !guard.pipeline_active {
            if let Err(e) = guard.sink.start().await {
                error!(error = %e, "audio sink failed to start");
                return Err(AudioPlayerError::SinkWrite(e.to_string()));
            }
            guard.pipeline_active = true;
            self.speaking.store(true, Ordering::SeqCst);
            self.emit(PlaybackEvent::Start);
        }

        if let Err(e) = guard.sink.write(&chunk).await {
            warn!(error = %e, "audio sink write failed, tearing down");
            let _ = guard.sink.cancel().await;
            guard.pipeline_active = false;
            let text = guard.pending_text.take();
            drop(guard);
            self.speaking.store(false, Ordering::SeqCst);
            self.emit(PlaybackEvent::End { text });
            return Err(AudioPlayerError::SinkWrite(e.to_string()));
        }
        Ok(())
    }

    /// Allow a short drain window, then close the pipeline and wait for it
    /// to finish, killing it if it exceeds the hard timeout.
    pub async fn flush_and_play(&self) -> Result<(), AudioPlayerError> {
        tokio::time::sleep(FLUSH_DRAIN).await;
        let mut guard = self.inner.lock().await;
        if !guard.pipeline_active {
            return Ok(());
        }
        let stop = guard.sink.stop();
        let result = tokio::time::timeout(FLUSH_TIMEOUT, stop).await;
        guard.pipeline_active = false;
        let text = guard.pending_text.take();
        drop(guard);
        self.speaking.store(false, Ordering::SeqCst);
        self.emit(PlaybackEvent::End { text });
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(AudioPlayerError::SinkWrite(e.to_string())),
            Err(_) => Err(AudioPlayerError::FlushTimeout(FLUSH_TIMEOUT)),
        }
    }

    /// Immediate teardown; always fires exactly one `End` per prior `Start`.
    pub async fn cancel(&self) {
        let mut guard = self.inner.lock().await;
        let was_active = guard.pipeline_active;
        let text = guard.pending_text.take();
        if was_active {
            let _ = guard.sink.cancel().await;
            guard.pipeline_active = false;
        }
        drop(guard);
        if was_active {
            self.speaking.store(false, Ordering::SeqCst);
            self.emit(PlaybackEvent::End { text });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::AudioSinkError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct MockSink {
        started: Arc<AtomicUsize>,
        writes: Arc<AtomicUsize>,
        fail_write: bool,
    }

    #[async_trait]
    impl AudioSink for MockSink {
        async fn start(&mut self) -> Result<(), AudioSinkError> {
            self.started.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn write(&mut self, _chunk: &AudioChunk) -> Result<(), AudioSinkError> {
            if self.fail_write {
                return Err(AudioSinkError("boom".into()));
            }
            self.writes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn stop(&mut self) -> Result<(), AudioSinkError> {
            Ok(())
        }
        async fn cancel(&mut self) -> Result<(), AudioSinkError> {
            Ok(())
        }
    }

    /// IsSpeaking is true between OnPlaybackStart and OnPlaybackEnd inclusive.
    #[tokio::test]
    async fn is_speaking_spans_playback_lifetime() {
        let player = AudioPlayer::new(MockSink::default());
        assert!(!player.is_speaking());
        let b64 = base64::engine::general_purpose::STANDARD.encode([0u8, 0u8]);
        player.append_audio(&b64).await.unwrap();
        assert!(player.is_speaking());
        player.flush_and_play().await.unwrap();
        assert!(!player.is_speaking());
    }

    /// Cancel always emits End exactly once per prior Start.
    #[tokio::test]
    async fn cancel_emits_end_once() {
        let player = AudioPlayer::new(MockSink::default());
        let mut rx = player.subscribe();
        let b64 = base64::engine::general_purpose::STANDARD.encode([0u8, 0u8]);
        player.append_audio(&b64).await.unwrap();
        player.cancel().await;
        assert!(!player.is_speaking());
        assert_eq!(rx.recv().await.unwrap(), PlaybackEvent::Start);
        assert_eq!(rx.recv().await.unwrap(), PlaybackEvent::End { text: None });

        // Cancel with nothing active does not emit a second End.
        player.cancel().await;
        assert!(rx.try_recv().is_err());
    }

    /// A flushed utterance's End event carries the text set via begin_utterance.
    #[tokio::test]
    async fn begin_utterance_pairs_text_with_end_event() {
        let player = AudioPlayer::new(MockSink::default());
        let mut rx = player.subscribe();
        player.begin_utterance("hello there").await;
        let b64 = base64::engine::general_purpose::STANDARD.encode([0u8, 0u8]);
        player.append_audio(&b64).await.unwrap();
        player.flush_and_play().await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), PlaybackEvent::Start);
        assert_eq!(
            rx.recv().await.unwrap(),
            PlaybackEvent::End {
                text: Some("hello there".to_string())
            }
        );
    }

    /// A failed write tears down the pipeline and surfaces the error.
    #[tokio::test]
    async fn write_failure_tears_down_and_surfaces_error() {
        let sink = MockSink {
            fail_write: true,
            ..Default::default()
        };
        let player = AudioPlayer::new(sink);
        let b64 = base64::engine::general_purpose::STANDARD.encode([0u8, 0u8]);
        let err = player.append_audio(&b64).await;
        assert!(err.is_err());
        assert!(!player.is_speaking());
    }
}
