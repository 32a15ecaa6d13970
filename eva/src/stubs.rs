//! Mock/stub implementations of the `eva-core` device contracts, in the
//! style of `psyche-rs`'s `DummyMotor` and `daringsby`'s `LoggingMotor`:
//! enough to exercise the wiring end to end, not production drivers. A
//! real deployment swaps these for an HTTP motor client, WebRTC capture,
//! and the dialogue service's actual wire transport (all out of scope,
//! per spec §1).

use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use eva_core::audio::codec::AudioChunk;
use eva_core::error::ToolError;
use eva_core::robot::{
    AudioSink, AudioSinkError, AudioSource, AudioSourceError, Detection, DoaError, DoaProvider,
    DoaReading, FaceDetectError, FaceDetector, RobotController, RobotError, VisionError,
    VisionProvider,
};
use eva_core::tools::handlers::{FlightSearchProvider, SceneDescriber, TimerScheduler, WebSearchProvider};

/// Logs every motor call instead of driving real hardware.
pub struct LoggingRobot;

#[async_trait]
impl RobotController for LoggingRobot {
    async fn set_head_pose(&self, roll: f32, pitch: f32, yaw: f32) -> Result<(), RobotError> {
        info!(roll, pitch, yaw, "set_head_pose");
        Ok(())
    }

    async fn set_antennas(&self, left: f32, right: f32) -> Result<(), RobotError> {
        info!(left, right, "set_antennas");
        Ok(())
    }

    async fn get_daemon_status(&self) -> Result<String, RobotError> {
        Ok("stub robot ok".to_string())
    }

    async fn set_volume(&self, level: u8) -> Result<(), RobotError> {
        info!(level, "set_volume");
        Ok(())
    }
}

/// Always reports no faces; a real implementation captures from the
/// camera over the WebRTC path named in spec §1.
pub struct NoCamera;

#[async_trait]
impl VisionProvider for NoCamera {
    async fn capture_frame(&self) -> Result<Vec<u8>, VisionError> {
        Err(VisionError("no camera wired in this build".to_string()))
    }
}

#[async_trait]
impl FaceDetector for NoCamera {
    async fn detect(&self, _jpeg: &[u8]) -> Result<Vec<Detection>, FaceDetectError> {
        Ok(Vec::new())
    }
}

/// Never produces a DOA reading; the Tracker falls back to face-only
/// targeting, per spec §7's "lost video source" / audio-only behavior in
/// reverse.
pub struct NoDoa;

#[async_trait]
impl DoaProvider for NoDoa {
    async fn poll(&self) -> Result<DoaReading, DoaError> {
        Err(DoaError("no DOA provider wired in this build".to_string()))
    }
}

/// Writes land in the log instead of an audio device.
#[derive(Default)]
pub struct LoggingSink;

#[async_trait]
impl AudioSink for LoggingSink {
    async fn start(&mut self) -> Result<(), AudioSinkError> {
        info!("audio sink start");
        Ok(())
    }

    async fn write(&mut self, chunk: &AudioChunk) -> Result<(), AudioSinkError> {
        info!(samples = chunk.samples.len(), "audio sink write");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), AudioSinkError> {
        info!("audio sink stop");
        Ok(())
    }

    async fn cancel(&mut self) -> Result<(), AudioSinkError> {
        info!("audio sink cancel");
        Ok(())
    }
}

/// Yields no chunks; the uplink task stays parked between polls rather
/// than busy-looping on a source that doesn't exist yet.
pub struct NoAudioSource;

#[async_trait]
impl AudioSource for NoAudioSource {
    async fn next_chunk(&mut self) -> Result<Option<AudioChunk>, AudioSourceError> {
        tokio::time::sleep(Duration::from_millis(500)).await;
        Err(AudioSourceError("no microphone wired in this build".to_string()))
    }
}

pub struct StubSceneDescriber;

#[async_trait]
impl SceneDescriber for StubSceneDescriber {
    async fn describe(&self, _jpeg: &[u8]) -> Result<String, ToolError> {
        Ok("scene description is not wired in this build".to_string())
    }
}

pub struct StubWebSearch;

#[async_trait]
impl WebSearchProvider for StubWebSearch {
    async fn search(&self, query: &str) -> Result<String, ToolError> {
        Ok(format!("web search is not wired in this build (query: {query})"))
    }
}

pub struct StubFlightSearch;

#[async_trait]
impl FlightSearchProvider for StubFlightSearch {
    async fn search(
        &self,
        origin: &str,
        destination: &str,
        date: &str,
        cabin_class: &str,
    ) -> Result<String, ToolError> {
        Ok(format!(
            "flight search is not wired in this build ({origin} -> {destination}, {date}, {cabin_class})"
        ))
    }
}

pub struct LoggingTimerScheduler;

#[async_trait]
impl TimerScheduler for LoggingTimerScheduler {
    async fn schedule(&self, seconds: u32, label: &str) -> Result<(), ToolError> {
        info!(seconds, label, "timer scheduled (stub, not enforced)");
        Ok(())
    }
}
