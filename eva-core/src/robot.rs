//! External interfaces (§6): the collaborators eva-core depends on but
//! does not implement. Only the capability contracts are specified here;
//! concrete device drivers (HTTP motor API, WebRTC capture, the speech
//! service's wire protocol) are out of scope (§1).

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::codec::AudioChunk;

#[derive(Debug, Error)]
#[error("robot controller error: {0}")]
pub struct RobotError(pub String);

/// Minimum contract the core depends on for moving the robot's body.
#[async_trait]
pub trait RobotController: Send + Sync {
    /// roll/pitch/yaw in radians; conventions per §4.2.
    async fn set_head_pose(&self, roll: f32, pitch: f32, yaw: f32) -> Result<(), RobotError>;
    async fn set_antennas(&self, left: f32, right: f32) -> Result<(), RobotError>;
    /// A no-op if the robot has no rotating body.
    async fn set_body_yaw(&self, yaw: f32) -> Result<(), RobotError> {
        let _ = yaw;
        Ok(())
    }
    async fn get_daemon_status(&self) -> Result<String, RobotError>;
    async fn set_volume(&self, level: u8) -> Result<(), RobotError>;
}

#[derive(Debug, Error)]
#[error("vision provider error: {0}")]
pub struct VisionError(pub String);

#[async_trait]
pub trait VisionProvider: Send + Sync {
    async fn capture_frame(&self) -> Result<Vec<u8>, VisionError>;
}

#[derive(Debug, Error)]
#[error("face detector error: {0}")]
pub struct FaceDetectError(pub String);

/// A single detected face, normalized to [0,1] within the frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
}

#[async_trait]
pub trait FaceDetector: Send + Sync {
    async fn detect(&self, jpeg: &[u8]) -> Result<Vec<Detection>, FaceDetectError>;
}

#[derive(Debug, Error)]
#[error("audio source error: {0}")]
pub struct AudioSourceError(pub String);

/// A push-mode microphone source: chunks are pulled as they arrive, at
/// 48kHz or 24kHz mono (the core resamples to 24kHz mono).
#[async_trait]
pub trait AudioSource: Send + Sync {
    async fn next_chunk(&mut self) -> Result<Option<AudioChunk>, AudioSourceError>;
}

#[derive(Debug, Error)]
#[error("audio sink error: {0}")]
pub struct AudioSinkError(pub String);

/// The transport/device pipeline that an Audio Player implementation
/// drives. Ordered byte delivery, bounded buffering, and cancellation are
/// the contract; a conforming implementation may be a subprocess pipe or
/// a native audio API.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn start(&mut self) -> Result<(), AudioSinkError>;
    async fn write(&mut self, chunk: &AudioChunk) -> Result<(), AudioSinkError>;
    async fn stop(&mut self) -> Result<(), AudioSinkError>;
    /// Immediate teardown, discarding any buffered audio.
    async fn cancel(&mut self) -> Result<(), AudioSinkError>;
}

/// A single direction-of-arrival reading (§3 AudioSource data model).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DoaReading {
    pub angle: f32,
    pub confidence: f32,
    pub speaking: bool,
}

#[derive(Debug, Error)]
#[error("DOA provider error: {0}")]
pub struct DoaError(pub String);

/// Optional direction-of-arrival collaborator. Push streaming is
/// preferred (§4.4); `poll` is the fallback path at 10Hz.
#[async_trait]
pub trait DoaProvider: Send + Sync {
    /// Attempt to subscribe to push-mode DOA readings. `None` means the
    /// provider only supports polling.
    async fn subscribe(
        &self,
    ) -> Option<tokio::sync::mpsc::Receiver<DoaReading>> {
        None
    }

    async fn poll(&self) -> Result<DoaReading, DoaError>;
}
