//! Uplink task (§2 data flow, §5 concurrency model): microphone capture
//! -> resample to 24kHz mono -> PCM16 framing -> Realtime Client, yielding
//! while the Audio Player is speaking so the robot doesn't capture its own
//! voice (echo suppression).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::audio::codec::{resample, samples_to_bytes};
use crate::audio::player::AudioPlayer;
use crate::error::RealtimeError;
use crate::realtime::client::RealtimeClient;
use crate::robot::{AudioSink, AudioSource};

const ECHO_GATE_POLL: Duration = Duration::from_millis(50);
const TARGET_SAMPLE_RATE: u32 = 24_000;

/// Minimal view of the Audio Player's Speaking flag, so the uplink task
/// isn't generic over the player's concrete `AudioSink`.
pub trait SpeakingGate: Send + Sync {
    fn is_speaking(&self) -> bool;
}

impl<S: AudioSink> SpeakingGate for AudioPlayer<S> {
    fn is_speaking(&self) -> bool {
        AudioPlayer::is_speaking(self)
    }
}

/// The outbound half of the duplex session, narrowed to what the uplink
/// needs so it can be driven by a fake in tests.
#[async_trait]
pub trait AudioSender: Send + Sync {
    async fn send_audio(&self, pcm16_bytes: &[u8]) -> Result<(), RealtimeError>;
}

#[async_trait]
impl AudioSender for RealtimeClient {
    async fn send_audio(&self, pcm16_bytes: &[u8]) -> Result<(), RealtimeError> {
        RealtimeClient::send_audio(self, pcm16_bytes).await
    }
}

/// Capture -> resample -> send, looping until `cancel` fires. While the
/// player is speaking, the task sleeps in `ECHO_GATE_POLL` increments
/// instead of reading the source, so uplink resumes within one tick of
/// playback ending.
pub async fn run_uplink(
    mut source: impl AudioSource,
    sender: Arc<dyn AudioSender>,
    gate: Arc<dyn SpeakingGate>,
    cancel: CancellationToken,
) {
    loop {
        if gate.is_speaking() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(ECHO_GATE_POLL) => {}
            }
            continue;
        }

        let next = tokio::select! {
            _ = cancel.cancelled() => return,
            chunk = source.next_chunk() => chunk,
        };

        match next {
            Ok(Some(chunk)) => {
                let resampled = resample(&chunk.samples, chunk.sample_rate, TARGET_SAMPLE_RATE);
                let bytes = samples_to_bytes(&resampled);
                if let Err(e) = sender.send_audio(&bytes).await {
                    warn!(error = %e, "uplink send_audio failed");
                }
            }
            Ok(None) => return,
            Err(e) => warn!(error = %e, "audio source read failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::codec::AudioChunk;
    use crate::robot::AudioSourceError;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    struct FixedGate(AtomicBool);
    impl SpeakingGate for FixedGate {
        fn is_speaking(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    struct CountingSender {
        sends: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AudioSender for CountingSender {
        async fn send_audio(&self, _pcm16_bytes: &[u8]) -> Result<(), RealtimeError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct ScriptedSource {
        chunks: Mutex<Vec<AudioChunk>>,
    }

    #[async_trait]
    impl AudioSource for ScriptedSource {
        async fn next_chunk(&mut self) -> Result<Option<AudioChunk>, AudioSourceError> {
            let mut chunks = self.chunks.lock().await;
            Ok(chunks.pop())
        }
    }

    /// While the gate reports speaking, the uplink never calls send_audio.
    #[tokio::test]
    async fn gated_while_speaking_never_sends() {
        let sends = Arc::new(AtomicUsize::new(0));
        let sender = Arc::new(CountingSender { sends: sends.clone() }) as Arc<dyn AudioSender>;
        let gate = Arc::new(FixedGate(AtomicBool::new(true))) as Arc<dyn SpeakingGate>;
        let source = ScriptedSource {
            chunks: Mutex::new(vec![AudioChunk::new(vec![1, 2, 3, 4], 48_000, 1)]),
        };
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        let task = tokio::spawn(run_uplink(source, sender, gate, cancel_clone));
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        let _ = task.await;
        assert_eq!(sends.load(Ordering::SeqCst), 0);
    }

    /// Once not speaking, captured chunks are resampled and sent.
    #[tokio::test]
    async fn not_speaking_sends_resampled_chunks() {
        let sends = Arc::new(AtomicUsize::new(0));
        let sender = Arc::new(CountingSender { sends: sends.clone() }) as Arc<dyn AudioSender>;
        let gate = Arc::new(FixedGate(AtomicBool::new(false))) as Arc<dyn SpeakingGate>;
        let source = ScriptedSource {
            chunks: Mutex::new(vec![AudioChunk::new(vec![1, 2, 3, 4], 48_000, 1)]),
        };
        let cancel = CancellationToken::new();
        run_uplink(source, sender, gate, cancel).await;
        assert_eq!(sends.load(Ordering::SeqCst), 1);
    }
}
