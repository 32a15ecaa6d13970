//! World Model (§4.3): spatial registry of tracked entities plus the
//! audio source and body orientation, confidence decay, and target
//! priority.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::config::AudioSwitchConfig;
use crate::perception::Perception;

/// A single tracked person (§3 TrackedEntity).
#[derive(Debug, Clone)]
pub struct TrackedEntity {
    pub identity: String,
    pub room_angle: f32,
    pub last_frame_position: f32,
    pub last_frame_vertical: Option<f32>,
    pub confidence: f32,
    pub last_seen: Instant,
    pub angular_velocity: f32,
    pub audio_confidence: f32,
    pub last_audio_match: Option<Instant>,
    pub face_width_norm: f32,
    pub estimated_distance: f32,
}

impl TrackedEntity {
    fn new(identity: String, room_angle: f32, frame_position: f32, now: Instant) -> Self {
        Self {
            identity,
            room_angle,
            last_frame_position: frame_position,
            last_frame_vertical: None,
            confidence: 1.0,
            last_seen: now,
            angular_velocity: 0.0,
            audio_confidence: 0.0,
            last_audio_match: None,
            face_width_norm: 0.0,
            estimated_distance: 5.0,
        }
    }

    fn is_stale(&self, now: Instant, stale_after: Duration) -> bool {
        now.duration_since(self.last_seen) > stale_after
    }
}

/// Current audio direction-of-arrival reading (§3 AudioSource).
#[derive(Debug, Clone, Copy)]
pub struct AudioSourceState {
    pub angle: f32,
    pub confidence: f32,
    pub speaking: bool,
    pub last_seen: Instant,
}

impl AudioSourceState {
    fn is_stale(&self, now: Instant) -> bool {
        now.duration_since(self.last_seen) > Duration::from_secs(1)
    }
}

/// Source that produced the current target, for diagnostics/tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetSource {
    FaceAndAudio,
    Face,
    Audio,
}

pub struct WorldModel {
    entities: HashMap<String, TrackedEntity>,
    focus: Option<String>,
    body_yaw: f32,
    body_yaw_limit: f32,
    audio: Option<AudioSourceState>,
    audio_switch: AudioSwitchConfig,
    decay_rate: f32,
    forget_threshold: f32,
    forget_timeout: Duration,
}

impl WorldModel {
    pub fn new(
        body_yaw_limit: f32,
        audio_switch: AudioSwitchConfig,
        decay_rate: f32,
        forget_threshold: f32,
        forget_timeout: Duration,
    ) -> Self {
        Self {
            entities: HashMap::new(),
            focus: None,
            body_yaw: 0.0,
            body_yaw_limit,
            audio: None,
            audio_switch,
            decay_rate,
            forget_threshold,
            forget_timeout,
        }
    }

    pub fn body_yaw(&self) -> f32 {
        self.body_yaw
    }

    /// Apply a live tuning update (§6 Tuning API) to the decay/forget/
    /// audio-association knobs and the mechanical body yaw limit;
    /// re-clamps the current body yaw if the limit shrank below it.
    pub fn apply_tuning(
        &mut self,
        body_yaw_limit: f32,
        audio_switch: AudioSwitchConfig,
        decay_rate: f32,
        forget_threshold: f32,
        forget_timeout: Duration,
    ) {
        self.body_yaw_limit = body_yaw_limit;
        self.audio_switch = audio_switch;
        self.decay_rate = decay_rate;
        self.forget_threshold = forget_threshold;
        self.forget_timeout = forget_timeout;
        self.body_yaw = self.body_yaw.clamp(-self.body_yaw_limit, self.body_yaw_limit);
    }

    /// bodyYaw writes are clamped to [-bodyYawLimit, +bodyYawLimit].
    pub fn set_body_yaw(&mut self, yaw: f32) {
        self.body_yaw = yaw.clamp(-self.body_yaw_limit, self.body_yaw_limit);
    }

    pub fn is_body_at_limit(&self, direction: f32) -> bool {
        self.body_yaw.abs() >= self.body_yaw_limit && direction.signum() == self.body_yaw.signum()
    }

    pub fn entity(&self, id: &str) -> Option<&TrackedEntity> {
        self.entities.get(id)
    }

    pub fn focus_id(&self) -> Option<&str> {
        self.focus.as_deref()
    }

    /// Create or smooth-update a tracked entity from a new room-frame detection.
    pub fn update_entity(&mut self, id: &str, room_yaw: f32, frame_position: f32, face_width: f32) {
        let now = Instant::now();
        if let Some(entity) = self.entities.get_mut(id) {
            let dt = now.duration_since(entity.last_seen).as_secs_f32();
            let smoothed = 0.7 * room_yaw + 0.3 * entity.room_angle;
            if dt > 0.0 && dt < 1.0 {
                entity.angular_velocity = (smoothed - entity.room_angle) / dt;
            }
            entity.room_angle = smoothed;
            entity.last_frame_position = frame_position;
            entity.last_seen = now;
            entity.confidence = 1.0;
            if face_width > 0.0 {
                entity.face_width_norm = if entity.face_width_norm > 0.0 {
                    0.7 * face_width + 0.3 * entity.face_width_norm
                } else {
                    face_width
                };
                entity.estimated_distance = Perception::estimate_distance(entity.face_width_norm);
            }
        } else {
            self.entities.insert(
                id.to_string(),
                TrackedEntity::new(id.to_string(), room_yaw, frame_position, now),
            );
            if self.focus.is_none() {
                self.focus = Some(id.to_string());
            }
        }
    }

    pub fn update_audio_source(&mut self, angle: f32, confidence: f32, speaking: bool) {
        self.audio = Some(AudioSourceState {
            angle,
            confidence,
            speaking,
            last_seen: Instant::now(),
        });
    }

    /// Associate an audio reading with the nearest matching visible entity.
    /// Returns the matched entity id, if any.
    pub fn associate_audio(&mut self, angle: f32, speaking: bool, confidence: f32) -> Option<String> {
        if !speaking || confidence < self.audio_switch.min_confidence {
            return None;
        }
        let now = Instant::now();
        let stale_after = Duration::from_secs_f32(self.audio_switch.stale_after_secs);
        let window = self.audio_switch.association_window_rad;

        let matched = self
            .entities
            .values()
            .filter(|e| !e.is_stale(now, stale_after))
            .find(|e| (e.room_angle - angle).abs() < window)
            .map(|e| e.identity.clone());

        if let Some(id) = &matched {
            if let Some(entity) = self.entities.get_mut(id) {
                entity.audio_confidence = confidence;
                entity.last_audio_match = Some(now);
            }
        }
        matched
    }

    pub fn speaking_entity(&self) -> Option<&TrackedEntity> {
        let now = Instant::now();
        let window = Duration::from_secs_f32(self.audio_switch.speaking_window_secs);
        self.entities.values().find(|e| {
            e.audio_confidence > 0.3
                && e.last_audio_match
                    .map(|t| now.duration_since(t) <= window)
                    .unwrap_or(false)
        })
    }

    /// Predicted room angle + damped velocity extrapolation when fresh.
    fn predicted_room_angle(entity: &TrackedEntity, now: Instant) -> f32 {
        let age = now.duration_since(entity.last_seen);
        if age <= Duration::from_millis(500) {
            entity.room_angle + entity.angular_velocity * age.as_secs_f32() * 0.5
        } else {
            entity.room_angle
        }
    }

    /// The focus entity's predicted angle, body-relative.
    pub fn target_world_angle(&self) -> Option<f32> {
        let id = self.focus.as_ref()?;
        let entity = self.entities.get(id)?;
        let now = Instant::now();
        Some(Self::predicted_room_angle(entity, now) - self.body_yaw)
    }

    /// Priority: speaking face+audio > any face > speaking audio alone > none.
    pub fn target(&self) -> Option<(f32, TargetSource)> {
        let now = Instant::now();

        if let Some(speaking) = self.speaking_entity() {
            let angle = Self::predicted_room_angle(speaking, now) - self.body_yaw;
            return Some((angle, TargetSource::FaceAndAudio));
        }
        if let Some(id) = &self.focus {
            if let Some(entity) = self.entities.get(id) {
                let angle = Self::predicted_room_angle(entity, now) - self.body_yaw;
                return Some((angle, TargetSource::Face));
            }
        }
        if let Some(audio) = &self.audio {
            if audio.speaking
                && audio.confidence > self.audio_switch.min_confidence
                && !audio.is_stale(now)
            {
                return Some((audio.angle - self.body_yaw, TargetSource::Audio));
            }
        }
        None
    }

    /// Decay confidence for all entities, removing ones below threshold or
    /// past their forget timeout; promote another entity if focus is removed.
    pub fn decay_confidence(&mut self, dt: Duration) {
        let now = Instant::now();
        let decay = self.decay_rate * dt.as_secs_f32();
        let mut removed_focus = false;

        self.entities.retain(|id, entity| {
            entity.confidence = (entity.confidence - decay).max(0.0);
            let expired = entity.confidence < self.forget_threshold
                || now.duration_since(entity.last_seen) > self.forget_timeout;
            if expired && self.focus.as_deref() == Some(id.as_str()) {
                removed_focus = true;
            }
            !expired
        });

        if removed_focus {
            self.focus = self.entities.keys().next().cloned();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wm() -> WorldModel {
        WorldModel::new(
            1.5,
            AudioSwitchConfig::default(),
            0.2,
            0.05,
            Duration::from_secs(5),
        )
    }

    /// After UpdateEntity then SetBodyYaw, GetTargetWorldAngle = a - b (no velocity drift on first reading).
    #[test]
    fn target_world_angle_subtracts_body_yaw() {
        let mut w = wm();
        w.update_entity("primary", 0.5, 50.0, 0.0);
        w.set_body_yaw(0.2);
        let angle = w.target_world_angle().unwrap();
        assert!((angle - 0.3).abs() < 1e-3);
    }

    /// Face + fresh matching speaking audio -> source face+audio, angle = roomAngle - bodyYaw.
    #[test]
    fn face_and_audio_handoff() {
        let mut w = wm();
        w.update_entity("primary", 0.5, 50.0, 0.0);
        w.update_audio_source(0.55, 0.8, true);
        let matched = w.associate_audio(0.55, true, 0.8);
        assert_eq!(matched.as_deref(), Some("primary"));
        let (angle, source) = w.target().unwrap();
        assert_eq!(source, TargetSource::FaceAndAudio);
        assert!((angle - 0.5).abs() < 1e-3);
    }

    /// A visible face with no audio match still yields source = face.
    #[test]
    fn face_alone_is_face_source() {
        let mut w = wm();
        w.update_entity("primary", 0.5, 50.0, 0.0);
        let (_, source) = w.target().unwrap();
        assert_eq!(source, TargetSource::Face);
    }

    /// Speaking audio alone (no visible face) yields source = audio.
    #[test]
    fn audio_alone_is_audio_source() {
        let mut w = wm();
        w.update_audio_source(0.4, 0.8, true);
        let (angle, source) = w.target().unwrap();
        assert_eq!(source, TargetSource::Audio);
        assert!((angle - 0.4).abs() < 1e-3);
    }

    /// A live tuning update shrinking the body yaw limit re-clamps the
    /// current body yaw immediately.
    #[test]
    fn apply_tuning_reclamps_body_yaw() {
        let mut w = wm();
        w.set_body_yaw(1.4);
        w.apply_tuning(1.0, AudioSwitchConfig::default(), 0.2, 0.05, Duration::from_secs(5));
        assert_eq!(w.body_yaw(), 1.0);
    }

    /// bodyYaw writes clamp to the configured limit.
    #[test]
    fn body_yaw_clamps_to_limit() {
        let mut w = wm();
        w.set_body_yaw(10.0);
        assert_eq!(w.body_yaw(), 1.5);
        assert!(w.is_body_at_limit(1.0));
        assert!(!w.is_body_at_limit(-1.0));
    }

    /// Decaying below the forget threshold removes the entity and promotes another focus.
    #[test]
    fn decay_removes_entity_and_promotes_focus() {
        let mut w = wm();
        w.update_entity("a", 0.1, 10.0, 0.0);
        w.update_entity("b", 0.2, 20.0, 0.0);
        assert_eq!(w.focus_id(), Some("a"));
        w.decay_confidence(Duration::from_secs(10));
        assert!(w.entity("a").is_none());
        assert!(w.entity("b").is_none());
    }
}
