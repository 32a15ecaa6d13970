//! PD Controller (§4.1): smooth, bounded scalar control for one actuator
//! axis with dead zones, soft limits, and interpolated motion.

use std::time::{Duration, Instant};

use crate::config::PdAxisConfig;

#[derive(Debug, Clone, Copy)]
struct Interpolation {
    from: f32,
    to: f32,
    start: Instant,
    duration: Duration,
}

/// One axis (yaw or pitch) of bounded, dead-zoned PD control.
#[derive(Debug)]
pub struct PdController {
    cfg: PdAxisConfig,
    current: f32,
    target: f32,
    last_error: f32,
    last_output: f32,
    settled: bool,
    interp: Option<Interpolation>,
}

impl PdController {
    pub fn new(cfg: PdAxisConfig) -> Self {
        Self {
            cfg,
            current: 0.0,
            target: 0.0,
            last_error: 0.0,
            last_output: 0.0,
            settled: false,
            interp: None,
        }
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_settled(&self) -> bool {
        self.settled
    }

    pub fn is_interpolating(&self) -> bool {
        self.interp.is_some()
    }

    /// Swap in a new gain/limit configuration (e.g. from a live tuning
    /// update); current value, target, and any in-flight interpolation are
    /// left untouched.
    pub fn set_config(&mut self, cfg: PdAxisConfig) {
        self.cfg = cfg;
    }

    fn clamp_abs(&self, v: f32) -> f32 {
        v.clamp(-self.cfg.max_abs, self.cfg.max_abs)
    }

    /// Cancel any interpolation and set an explicit target.
    pub fn set_target(&mut self, v: f32) {
        self.interp = None;
        self.target = self.clamp_abs(v);
        self.settled = false;
    }

    /// Self-correcting mode: nudge the target by an observed offset,
    /// rate-limited by `max_target_velocity` when positive.
    pub fn set_target_from_offset(&mut self, delta: f32) {
        self.interp = None;
        let desired = self.clamp_abs(self.current + delta);
        let next = if self.cfg.max_target_velocity > 0.0 {
            let max_step = self.cfg.max_target_velocity;
            let bounded_delta = (desired - self.target).clamp(-max_step, max_step);
            self.target + bounded_delta
        } else {
            desired
        };
        self.target = self.clamp_abs(next);
        self.settled = false;
    }

    pub fn interpolate_to(&mut self, v: f32, duration: Duration) {
        self.interp = Some(Interpolation {
            from: self.current,
            to: self.clamp_abs(v),
            start: Instant::now(),
            duration,
        });
        self.settled = false;
    }

    pub fn interpolate_to_neutral(&mut self, duration: Duration) {
        self.interpolate_to(0.0, duration);
    }

    /// When the body rotates by `delta`, shift current/target (and any
    /// in-flight interpolation endpoints) to preserve gaze on the
    /// previously fixated room direction, and resync `last_error` so the
    /// derivative term doesn't spike on the next tick.
    pub fn adjust_for_body_rotation(&mut self, delta: f32) {
        self.current = self.clamp_abs(self.current - delta);
        self.target = self.clamp_abs(self.target - delta);
        if let Some(interp) = self.interp.as_mut() {
            interp.from = self.clamp_abs(interp.from - delta);
            interp.to = self.clamp_abs(interp.to - delta);
        }
        self.last_error = self.target - self.current;
    }

    /// `(threshold fraction of max_abs exceeded by target, current within
    /// 5% of that same limit)` -> signed rotation step, or `None`.
    pub fn needs_body_rotation(&self, threshold: f32, step: f32) -> Option<f32> {
        let limit = self.cfg.max_abs * threshold;
        if self.target.abs() <= limit {
            return None;
        }
        let near_limit = limit * 0.95;
        if self.current.abs() < near_limit {
            return None;
        }
        Some(step.copysign(self.target))
    }

    /// Advance the controller by one tick. Returns `(new_value, moved)`.
    pub fn update(&mut self) -> (f32, bool) {
        if let Some(interp) = self.interp {
            let elapsed = interp.start.elapsed();
            let t = if interp.duration.is_zero() {
                1.0
            } else {
                (elapsed.as_secs_f32() / interp.duration.as_secs_f32()).clamp(0.0, 1.0)
            };
            self.current = interp.from + (interp.to - interp.from) * t;
            if elapsed >= interp.duration {
                self.interp = None;
                self.target = interp.to;
            }
            return (self.current, true);
        }

        let error = self.target - self.current;
        if error.abs() < self.cfg.dead_zone {
            self.settled = true;
            self.last_error = error;
            return (self.current, false);
        }
        self.settled = false;

        let mut output = self.cfg.kp * error + self.cfg.kd * (error - self.last_error);
        if self.current.abs() > self.cfg.soft_limit {
            let limit_factor =
                ((self.current.abs() - self.cfg.soft_limit) / self.cfg.soft_limit.max(1e-6))
                    .min(1.0);
            output *= 1.0 - limit_factor * 0.8;
        }
        output = output.clamp(-self.cfg.max_step_per_tick, self.cfg.max_step_per_tick);

        self.last_error = error;
        self.last_output = output;
        self.current = self.clamp_abs(self.current + output);
        (self.current, true)
    }

    pub fn last_output(&self) -> f32 {
        self.last_output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> PdAxisConfig {
        PdAxisConfig {
            kp: 0.6,
            kd: 0.1,
            dead_zone: 0.02,
            soft_limit: 0.8,
            max_abs: 1.0,
            max_step_per_tick: 0.2,
            max_target_velocity: 0.0,
        }
    }

    /// Output never exceeds max_abs regardless of target.
    #[test]
    fn update_never_exceeds_max_abs() {
        let mut pd = PdController::new(cfg());
        pd.set_target(10.0);
        for _ in 0..200 {
            let (v, _) = pd.update();
            assert!(v.abs() <= pd.cfg.max_abs + 1e-6);
        }
    }

    /// Inside the dead zone, Update reports no movement and doesn't change current.
    #[test]
    fn dead_zone_suppresses_motion() {
        let mut pd = PdController::new(cfg());
        pd.set_target(0.01);
        let (v, moved) = pd.update();
        assert!(!moved);
        assert_eq!(v, 0.0);
    }

    /// After InterpolateTo(v, d) and elapsed >= d, Update reaches v exactly and clears interpolation.
    #[test]
    fn interpolation_completes_and_settles_on_target() {
        let mut pd = PdController::new(cfg());
        pd.interpolate_to(0.5, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        let (v, moved) = pd.update();
        assert_eq!(v, 0.5);
        assert!(moved);
        assert!(!pd.is_interpolating());
        assert_eq!(pd.target(), 0.5);
    }

    /// SetTarget while interpolating cancels the interpolation and starts from the current value.
    #[test]
    fn set_target_cancels_interpolation() {
        let mut pd = PdController::new(cfg());
        pd.interpolate_to(0.9, Duration::from_secs(10));
        std::thread::sleep(Duration::from_millis(5));
        let (partial, _) = pd.update();
        pd.set_target(0.1);
        assert!(!pd.is_interpolating());
        assert_eq!(pd.current(), partial);
    }

    /// NeedsBodyRotation triggers only when target exceeds threshold*max_abs and current is near the limit.
    #[test]
    fn needs_body_rotation_matches_scenario() {
        let mut pd = PdController::new(PdAxisConfig {
            max_abs: 1.5,
            ..cfg()
        });
        pd.current = 1.2;
        pd.set_target(1.4);
        let step = pd.needs_body_rotation(0.8, 0.5);
        assert_eq!(step, Some(0.5));
    }

    /// AdjustForBodyRotation shifts current and target and resyncs lastError.
    #[test]
    fn adjust_for_body_rotation_preserves_room_direction() {
        let mut pd = PdController::new(cfg());
        pd.current = 0.4;
        pd.set_target(0.6);
        pd.adjust_for_body_rotation(0.3);
        assert!((pd.current() - 0.1).abs() < 1e-6);
        assert!((pd.target() - 0.3).abs() < 1e-6);
        assert_eq!(pd.last_error, pd.target() - pd.current());
    }
}
