//! Tuning parameters (§6 Tuning API, §4 numeric defaults).
//!
//! `Tuning` is the flat, serializable parameter object the tuning API
//! exposes over GET/POST. `TuningPatch` is its all-`Option` mirror used
//! for partial POST updates: unset fields preserve the current value.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdAxisConfig {
    pub kp: f32,
    pub kd: f32,
    pub dead_zone: f32,
    pub soft_limit: f32,
    pub max_abs: f32,
    pub max_step_per_tick: f32,
    pub max_target_velocity: f32,
}

impl PdAxisConfig {
    pub fn yaw_defaults() -> Self {
        Self {
            kp: 0.6,
            kd: 0.15,
            dead_zone: 0.02,
            soft_limit: 0.8,
            max_abs: 1.0,
            max_step_per_tick: 0.15,
            max_target_velocity: 0.0,
        }
    }

    pub fn pitch_defaults() -> Self {
        Self {
            kp: 0.5,
            kd: 0.12,
            dead_zone: 0.02,
            soft_limit: 0.8,
            max_abs: 0.6,
            max_step_per_tick: 0.12,
            max_target_velocity: 0.0,
        }
    }

    fn validate(&self, axis: &'static str) -> Result<(), ConfigError> {
        if self.kp < 0.0 {
            return Err(ConfigError::NegativeGain {
                field: axis,
                value: self.kp,
            });
        }
        if self.kd < 0.0 {
            return Err(ConfigError::NegativeGain {
                field: axis,
                value: self.kd,
            });
        }
        if self.max_abs <= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: axis,
                value: self.max_abs,
                min: 0.0,
                max: f32::MAX,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub start_delay_secs: f32,
    pub return_to_neutral_secs: f32,
    pub range: f32,
    pub speed: f32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            start_delay_secs: 2.0,
            return_to_neutral_secs: 1.0,
            range: 0.5,
            speed: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyRotationConfig {
    pub max_yaw: f32,
    pub threshold: f32,
    pub step: f32,
}

impl Default for BodyRotationConfig {
    fn default() -> Self {
        Self {
            max_yaw: 1.5,
            threshold: 0.8,
            step: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioSwitchConfig {
    pub association_window_rad: f32,
    pub min_confidence: f32,
    pub stale_after_secs: f32,
    pub speaking_window_secs: f32,
}

impl Default for AudioSwitchConfig {
    fn default() -> Self {
        Self {
            association_window_rad: 0.26,
            min_confidence: 0.3,
            stale_after_secs: 1.0,
            speaking_window_secs: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuning {
    pub yaw: PdAxisConfig,
    pub pitch: PdAxisConfig,
    pub scan: ScanConfig,
    pub body_rotation: BodyRotationConfig,
    pub audio_switch: AudioSwitchConfig,
    pub detection_hz: f32,
    pub decay_rate: f32,
    pub forget_threshold: f32,
    pub forget_timeout_secs: f32,
    pub silence_duration_ms: u32,
    pub camera_fov_rad: f32,
    pub vertical_fov_rad: f32,
    pub position_smoothing: f32,
    /// When true, breathing/audio-switch/scan knobs are disabled and reset
    /// to their defaults; the pre-tuning values are restored when cleared.
    pub tuning_mode: bool,
    #[serde(skip)]
    saved_for_tuning: Option<Box<(ScanConfig, AudioSwitchConfig, bool)>>,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            yaw: PdAxisConfig::yaw_defaults(),
            pitch: PdAxisConfig::pitch_defaults(),
            scan: ScanConfig::default(),
            body_rotation: BodyRotationConfig::default(),
            audio_switch: AudioSwitchConfig::default(),
            detection_hz: 4.0,
            decay_rate: 0.2,
            forget_threshold: 0.05,
            forget_timeout_secs: 5.0,
            silence_duration_ms: 300,
            camera_fov_rad: std::f32::consts::FRAC_PI_3,
            vertical_fov_rad: std::f32::consts::FRAC_PI_4,
            position_smoothing: 0.3,
            tuning_mode: false,
            saved_for_tuning: None,
        }
    }
}

/// All-optional mirror of [`Tuning`] for partial POST updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TuningPatch {
    pub yaw: Option<PdAxisConfig>,
    pub pitch: Option<PdAxisConfig>,
    pub scan: Option<ScanConfig>,
    pub body_rotation: Option<BodyRotationConfig>,
    pub audio_switch: Option<AudioSwitchConfig>,
    pub detection_hz: Option<f32>,
    pub decay_rate: Option<f32>,
    pub forget_threshold: Option<f32>,
    pub forget_timeout_secs: Option<f32>,
    pub silence_duration_ms: Option<u32>,
    pub camera_fov_rad: Option<f32>,
    pub vertical_fov_rad: Option<f32>,
    pub position_smoothing: Option<f32>,
    pub tuning_mode: Option<bool>,
}

impl Tuning {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.yaw.validate("yaw")?;
        self.pitch.validate("pitch")?;
        if !(200..=500).contains(&self.silence_duration_ms) {
            return Err(ConfigError::OutOfRange {
                field: "silence_duration_ms",
                value: self.silence_duration_ms as f32,
                min: 200.0,
                max: 500.0,
            });
        }
        if !(1.0..=20.0).contains(&self.detection_hz) {
            return Err(ConfigError::OutOfRange {
                field: "detection_hz",
                value: self.detection_hz,
                min: 1.0,
                max: 20.0,
            });
        }
        Ok(())
    }

    /// Merge a partial update in place; unset fields keep their current value.
    pub fn apply_patch(&mut self, patch: TuningPatch) -> Result<(), ConfigError> {
        if let Some(v) = patch.yaw {
            self.yaw = v;
        }
        if let Some(v) = patch.pitch {
            self.pitch = v;
        }
        if let Some(v) = patch.scan {
            self.scan = v;
        }
        if let Some(v) = patch.body_rotation {
            self.body_rotation = v;
        }
        if let Some(v) = patch.audio_switch {
            self.audio_switch = v;
        }
        if let Some(v) = patch.detection_hz {
            self.detection_hz = v;
        }
        if let Some(v) = patch.decay_rate {
            self.decay_rate = v;
        }
        if let Some(v) = patch.forget_threshold {
            self.forget_threshold = v;
        }
        if let Some(v) = patch.forget_timeout_secs {
            self.forget_timeout_secs = v;
        }
        if let Some(v) = patch.silence_duration_ms {
            self.silence_duration_ms = v;
        }
        if let Some(v) = patch.camera_fov_rad {
            self.camera_fov_rad = v;
        }
        if let Some(v) = patch.vertical_fov_rad {
            self.vertical_fov_rad = v;
        }
        if let Some(v) = patch.position_smoothing {
            self.position_smoothing = v;
        }
        if let Some(mode) = patch.tuning_mode {
            self.set_tuning_mode(mode);
        }
        self.validate()
    }

    /// Toggle tuning mode: entering it snapshots and resets breathing/
    /// audio-switch/scan knobs; leaving it restores the snapshot.
    pub fn set_tuning_mode(&mut self, enabled: bool) {
        if enabled == self.tuning_mode {
            return;
        }
        if enabled {
            self.saved_for_tuning = Some(Box::new((
                self.scan.clone(),
                self.audio_switch.clone(),
                self.tuning_mode,
            )));
            self.scan = ScanConfig::default();
            self.audio_switch = AudioSwitchConfig::default();
        } else if let Some(saved) = self.saved_for_tuning.take() {
            self.scan = saved.0;
            self.audio_switch = saved.1;
        }
        self.tuning_mode = enabled;
    }
}
