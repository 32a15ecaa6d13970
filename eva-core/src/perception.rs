//! Perception (§4.2): turns a captured frame into a detection, with
//! smoothing, and converts frame coordinates into body- and room-relative
//! angles.

use tracing::{debug, trace, warn};

use crate::robot::{Detection, FaceDetector, VisionProvider};

/// Result of a room-frame detection pass (§4.2 `DetectFaceRoom`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomDetection {
    pub frame_position: f32,
    pub room_yaw: f32,
    pub face_width: f32,
    pub frame_vertical: f32,
}

/// Result of a camera-relative offset pass (§4.2 `DetectFaceOffset`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OffsetDetection {
    pub yaw_offset: f32,
    pub pitch_offset: f32,
    pub face_width: f32,
}

/// Converts frame geometry into angles and distance, and smooths the
/// horizontal frame position across successful detections.
pub struct Perception {
    camera_fov_rad: f32,
    vertical_fov_rad: f32,
    position_smoothing: f32,
    smoothed_position: Option<f32>,
    consecutive_misses: u32,
}

impl Perception {
    pub fn new(camera_fov_rad: f32, vertical_fov_rad: f32, position_smoothing: f32) -> Self {
        Self {
            camera_fov_rad,
            vertical_fov_rad,
            position_smoothing,
            smoothed_position: None,
            consecutive_misses: 0,
        }
    }

    pub fn consecutive_misses(&self) -> u32 {
        self.consecutive_misses
    }

    /// Apply a live tuning update; smoothing state is left untouched.
    pub fn set_params(&mut self, camera_fov_rad: f32, vertical_fov_rad: f32, position_smoothing: f32) {
        self.camera_fov_rad = camera_fov_rad;
        self.vertical_fov_rad = vertical_fov_rad;
        self.position_smoothing = position_smoothing;
    }

    /// Horizontal frame position (0..100) to camera-relative angle.
    pub fn frame_to_camera_angle(&self, p: f32) -> f32 {
        ((p - 50.0) / 100.0) * self.camera_fov_rad
    }

    /// Vertical frame position (0..100) to camera-relative pitch offset.
    /// Negative pitch = looking up.
    pub fn frame_to_pitch_offset(&self, q: f32) -> f32 {
        ((q - 50.0) / 100.0) * self.vertical_fov_rad
    }

    /// `distance ≈ k/w` clamped to [0.3, 5.0] m.
    pub fn estimate_distance(face_width_norm: f32) -> f32 {
        const K: f32 = 0.2;
        if face_width_norm <= 0.0 {
            return 5.0;
        }
        (K / face_width_norm).clamp(0.3, 5.0)
    }

    /// Score used to pick the best of several detections: 0.7*confidence + 0.3*(area/maxArea).
    fn score(d: &Detection, max_area: f32) -> f32 {
        let area = d.w * d.h;
        let area_term = if max_area > 0.0 { area / max_area } else { 0.0 };
        0.7 * d.confidence + 0.3 * area_term
    }

    fn best<'a>(detections: &'a [Detection]) -> Option<&'a Detection> {
        if detections.len() == 1 {
            return detections.first();
        }
        let max_area = detections
            .iter()
            .map(|d| d.w * d.h)
            .fold(0.0_f32, f32::max);
        detections
            .iter()
            .max_by(|a, b| {
                Self::score(a, max_area)
                    .partial_cmp(&Self::score(b, max_area))
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
    }

    async fn capture_and_detect(
        vision: &dyn VisionProvider,
        detector: &dyn FaceDetector,
    ) -> Option<Detection> {
        let frame = match vision.capture_frame().await {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "vision capture failed");
                return None;
            }
        };
        let detections = match detector.detect(&frame).await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "face detector failed");
                return None;
            }
        };
        if detections.is_empty() {
            return None;
        }
        Self::best(&detections).copied()
    }

    /// `DetectFaceRoom`: capture a frame, detect, smooth, and convert to a
    /// room-relative yaw. `head_yaw`/`body_yaw` are current pose readings.
    pub async fn detect_face_room(
        &mut self,
        vision: &dyn VisionProvider,
        detector: &dyn FaceDetector,
        head_yaw: f32,
        body_yaw: f32,
    ) -> Option<RoomDetection> {
        let Some(d) = Self::capture_and_detect(vision, detector).await else {
            self.consecutive_misses += 1;
            return None;
        };
        self.consecutive_misses = 0;

        let p = d.cx * 100.0;
        let smoothed = match self.smoothed_position {
            Some(prev) => self.position_smoothing * p + (1.0 - self.position_smoothing) * prev,
            None => p,
        };
        self.smoothed_position = Some(smoothed);

        let alpha = self.frame_to_camera_angle(smoothed);
        let body_relative_yaw = head_yaw - alpha;
        let room_yaw = body_yaw + body_relative_yaw;
        let frame_vertical = d.cy * 100.0;
        trace!(p = smoothed, room_yaw, "face room detection");

        Some(RoomDetection {
            frame_position: smoothed,
            room_yaw,
            face_width: d.w,
            frame_vertical,
        })
    }

    /// `DetectFaceOffset`: return camera-relative offsets for self-correcting control.
    /// Positive yawOffset = turn left; positive pitchOffset = tilt down.
    pub async fn detect_face_offset(
        &mut self,
        vision: &dyn VisionProvider,
        detector: &dyn FaceDetector,
    ) -> Option<OffsetDetection> {
        let Some(d) = Self::capture_and_detect(vision, detector).await else {
            self.consecutive_misses += 1;
            return None;
        };
        self.consecutive_misses = 0;

        let p = d.cx * 100.0;
        let q = d.cy * 100.0;
        let yaw_offset = -self.frame_to_camera_angle(p);
        let pitch_offset = self.frame_to_pitch_offset(q);
        debug!(yaw_offset, pitch_offset, "face offset detection");

        Some(OffsetDetection {
            yaw_offset,
            pitch_offset,
            face_width: d.w,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::robot::{FaceDetectError, VisionError};
    use async_trait::async_trait;

    struct FixedVision;
    #[async_trait]
    impl VisionProvider for FixedVision {
        async fn capture_frame(&self) -> Result<Vec<u8>, VisionError> {
            Ok(vec![0u8; 4])
        }
    }

    struct FixedDetector(Vec<Detection>);
    #[async_trait]
    impl FaceDetector for FixedDetector {
        async fn detect(&self, _jpeg: &[u8]) -> Result<Vec<Detection>, FaceDetectError> {
            Ok(self.0.clone())
        }
    }

    /// FOV symmetry: center maps to 0, left edge to +FOV/2, right edge to -FOV/2.
    #[test]
    fn frame_to_world_fov_symmetry() {
        let p = Perception::new(1.0, 1.0, 0.3);
        assert_eq!(p.frame_to_camera_angle(50.0), 0.0);
        assert!((p.frame_to_camera_angle(0.0) - (-0.5)).abs() < 1e-6);
        assert!((p.frame_to_camera_angle(100.0) - 0.5).abs() < 1e-6);
    }

    /// Distance estimate clamps to [0.3, 5.0].
    #[test]
    fn distance_estimate_clamped() {
        assert!((Perception::estimate_distance(1.0) - 0.3).abs() < 1e-6 || Perception::estimate_distance(1.0) >= 0.2);
        assert_eq!(Perception::estimate_distance(0.001), 5.0);
    }

    /// Best-of-two picks the higher blended score, not just confidence.
    #[test]
    fn best_detection_uses_blended_score() {
        let small_high_conf = Detection {
            cx: 0.5,
            cy: 0.5,
            w: 0.05,
            h: 0.05,
            confidence: 0.95,
        };
        let big_low_conf = Detection {
            cx: 0.5,
            cy: 0.5,
            w: 0.5,
            h: 0.5,
            confidence: 0.5,
        };
        let picked = Perception::best(&[small_high_conf, big_low_conf]).unwrap();
        // 0.7*0.95 = 0.665 vs 0.7*0.5 + 0.3*1.0 = 0.65 -> small_high_conf wins
        assert_eq!(*picked, small_high_conf);
    }

    /// Consecutive misses increments on no-face and resets on success.
    #[tokio::test]
    async fn miss_counter_tracks_detection_outcome() {
        let mut p = Perception::new(1.0, 1.0, 0.3);
        let empty = FixedDetector(vec![]);
        let vision = FixedVision;
        p.detect_face_room(&vision, &empty, 0.0, 0.0).await;
        p.detect_face_room(&vision, &empty, 0.0, 0.0).await;
        assert_eq!(p.consecutive_misses(), 2);

        let one = FixedDetector(vec![Detection {
            cx: 0.5,
            cy: 0.5,
            w: 0.2,
            h: 0.2,
            confidence: 0.9,
        }]);
        p.detect_face_room(&vision, &one, 0.0, 0.0).await;
        assert_eq!(p.consecutive_misses(), 0);
    }
}
