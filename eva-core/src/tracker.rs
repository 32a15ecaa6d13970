//! Tracker (§4.4): the perception/control loop that keeps the head (and
//! optionally the body) aimed at a person of interest. Owns three
//! independent tickers — movement, detection, decay — plus the audio
//! DOA integration path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::config::Tuning;
use crate::pd_controller::PdController;
use crate::perception::Perception;
use crate::robot::{DoaProvider, DoaReading, FaceDetector, RobotController, VisionProvider};
use crate::world_model::WorldModel;

const PRIMARY: &str = "primary";
const MOVEMENT_PERIOD: Duration = Duration::from_millis(50);
const DECAY_PERIOD: Duration = Duration::from_millis(100);
const DOA_POLL_PERIOD: Duration = Duration::from_millis(100);
const ERROR_LOG_INTERVAL: Duration = Duration::from_secs(5);

/// A body-relative motor command, emitted either to the robot directly or
/// to a registered [`OffsetHandler`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Offset {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

/// An alternative sink for movement-tick output, used when some outer
/// layer (e.g. a higher-level gaze fuser) wants offsets instead of
/// direct robot calls.
#[async_trait]
pub trait OffsetHandler: Send + Sync {
    async fn handle_offset(&self, offset: Offset);
}

/// Invoked when the tracked target has driven the yaw controller past its
/// rotation threshold; expected to physically rotate the body by `step`
/// radians and then call [`WorldModel::set_body_yaw`].
#[async_trait]
pub trait BodyRotationHandler: Send + Sync {
    async fn rotate_body(&self, step: f32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanPhase {
    Idle,
    ReturningToNeutral,
    Sweeping { direction: i8 },
}

struct RateLimitedLog {
    last_logged: Option<Instant>,
}

impl RateLimitedLog {
    fn new() -> Self {
        Self { last_logged: None }
    }

    fn should_log(&mut self) -> bool {
        let now = Instant::now();
        let fire = self
            .last_logged
            .map(|t| now.duration_since(t) >= ERROR_LOG_INTERVAL)
            .unwrap_or(true);
        if fire {
            self.last_logged = Some(now);
        }
        fire
    }
}

/// Shared, mutable control state for one tracking session.
struct Controllers {
    yaw: PdController,
    pitch: PdController,
    perception: Perception,
    last_face_seen: Instant,
    scan_phase: ScanPhase,
}

pub struct Tracker {
    world: Arc<RwLock<WorldModel>>,
    robot: Arc<dyn RobotController>,
    vision: Option<Arc<dyn VisionProvider>>,
    detector: Option<Arc<dyn FaceDetector>>,
    doa: Option<Arc<dyn DoaProvider>>,
    offset_handler: Option<Arc<dyn OffsetHandler>>,
    body_rotation_handler: Option<Arc<dyn BodyRotationHandler>>,
    controllers: RwLock<Controllers>,
    /// Shared with the Tuning API router (§6) so a `POST /tuning` takes
    /// effect on the next tick rather than a disconnected private copy.
    tuning: Arc<RwLock<Tuning>>,
    enabled: AtomicBool,
    running: AtomicBool,
    head_pose_errors: std::sync::Mutex<RateLimitedLog>,
}

impl Tracker {
    pub fn new(
        world: Arc<RwLock<WorldModel>>,
        robot: Arc<dyn RobotController>,
        vision: Option<Arc<dyn VisionProvider>>,
        detector: Option<Arc<dyn FaceDetector>>,
        doa: Option<Arc<dyn DoaProvider>>,
        tuning: Arc<RwLock<Tuning>>,
    ) -> Self {
        let initial = tuning
            .try_read()
            .expect("tuning lock uncontended at construction")
            .clone();
        let controllers = Controllers {
            yaw: PdController::new(initial.yaw.clone()),
            pitch: PdController::new(initial.pitch.clone()),
            perception: Perception::new(
                initial.camera_fov_rad,
                initial.vertical_fov_rad,
                initial.position_smoothing,
            ),
            last_face_seen: Instant::now(),
            scan_phase: ScanPhase::Idle,
        };
        Self {
            world,
            robot,
            vision,
            detector,
            doa,
            offset_handler: None,
            body_rotation_handler: None,
            controllers: RwLock::new(controllers),
            tuning,
            enabled: AtomicBool::new(true),
            running: AtomicBool::new(false),
            head_pose_errors: std::sync::Mutex::new(RateLimitedLog::new()),
        }
    }

    pub fn with_offset_handler(mut self, handler: Arc<dyn OffsetHandler>) -> Self {
        self.offset_handler = Some(handler);
        self
    }

    pub fn with_body_rotation_handler(mut self, handler: Arc<dyn BodyRotationHandler>) -> Self {
        self.body_rotation_handler = Some(handler);
        self
    }

    /// SetEnabled(false) begins a 1-s return-to-neutral and suppresses
    /// detection; SetEnabled(true) resumes immediately.
    pub async fn set_enabled(&self, enabled: bool) {
        let was_enabled = self.enabled.swap(enabled, Ordering::SeqCst);
        if was_enabled && !enabled {
            let mut ctl = self.controllers.write().await;
            ctl.yaw.interpolate_to_neutral(Duration::from_secs(1));
            ctl.pitch.interpolate_to_neutral(Duration::from_secs(1));
            ctl.scan_phase = ScanPhase::Idle;
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Runs the three tickers and the audio integration task until
    /// `cancel` fires. Ticker loops exit after finishing their current
    /// tick. Errors with `AlreadyRunning` if called twice on the same
    /// `Tracker` concurrently (the Init -> Run -> Close lifecycle expects
    /// one `run` in flight at a time).
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<(), crate::error::TrackerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(crate::error::TrackerError::AlreadyRunning);
        }

        let movement = {
            let this = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { this.run_movement_tick(cancel).await })
        };
        let detection = {
            let this = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { this.run_detection_tick(cancel).await })
        };
        let decay = {
            let this = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { this.run_decay_tick(cancel).await })
        };
        let audio = {
            let this = self.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { this.run_audio_integration(cancel).await })
        };

        let _ = tokio::join!(movement, detection, decay, audio);
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn run_movement_tick(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(MOVEMENT_PERIOD);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => self.movement_tick().await,
            }
        }
    }

    async fn run_detection_tick(&self, cancel: CancellationToken) {
        loop {
            let hz = self.tuning.read().await.detection_hz.max(1.0);
            let period = Duration::from_secs_f32(1.0 / hz);
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(period) => self.detection_tick().await,
            }
        }
    }

    async fn run_decay_tick(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(DECAY_PERIOD);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    let tuning = self.tuning.read().await.clone();
                    let mut world = self.world.write().await;
                    world.apply_tuning(
                        tuning.body_rotation.max_yaw,
                        tuning.audio_switch,
                        tuning.decay_rate,
                        tuning.forget_threshold,
                        Duration::from_secs_f32(tuning.forget_timeout_secs),
                    );
                    world.decay_confidence(DECAY_PERIOD);
                }
            }
        }
    }

    /// Prefer push-mode DOA; fall back to 10 Hz polling if the provider
    /// only supports `poll`.
    async fn run_audio_integration(&self, cancel: CancellationToken) {
        let Some(doa) = &self.doa else { return };

        if let Some(mut rx) = doa.subscribe().await {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    reading = rx.recv() => {
                        match reading {
                            Some(r) => self.apply_doa_reading(r).await,
                            None => return,
                        }
                    }
                }
            }
        } else {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(DOA_POLL_PERIOD) => {
                        match doa.poll().await {
                            Ok(r) => self.apply_doa_reading(r).await,
                            Err(e) => warn!(error = %e, "DOA poll failed"),
                        }
                    }
                }
            }
        }
    }

    async fn apply_doa_reading(&self, reading: DoaReading) {
        let mut world = self.world.write().await;
        world.update_audio_source(reading.angle, reading.confidence, reading.speaking);
        world.associate_audio(reading.angle, reading.speaking, reading.confidence);
    }

    async fn movement_tick(&self) {
        let enabled = self.enabled.load(Ordering::SeqCst);
        let tuning = self.tuning.read().await.clone();
        let mut ctl = self.controllers.write().await;
        ctl.yaw.set_config(tuning.yaw.clone());
        ctl.pitch.set_config(tuning.pitch.clone());

        if !enabled {
            let (_, _) = ctl.yaw.update();
            let (_, _) = ctl.pitch.update();
            self.emit_pose(&ctl).await;
            return;
        }

        let target = { self.world.read().await.target() };

        match target {
            Some((yaw_angle, _source)) => {
                ctl.scan_phase = ScanPhase::Idle;
                ctl.last_face_seen = Instant::now();
                ctl.yaw.set_target(yaw_angle);
            }
            None => self.drive_scan(&mut ctl, &tuning.scan),
        }

        let (_, _) = ctl.yaw.update();
        let (_, _) = ctl.pitch.update();

        if let Some(step) = ctl
            .yaw
            .needs_body_rotation(tuning.body_rotation.threshold, tuning.body_rotation.step)
        {
            if let Some(handler) = &self.body_rotation_handler {
                let is_at_limit = { self.world.read().await.is_body_at_limit(step) };
                if !is_at_limit {
                    handler.rotate_body(step).await;
                    ctl.yaw.adjust_for_body_rotation(step);
                }
            }
        }

        self.emit_pose(&ctl).await;
    }

    fn drive_scan(&self, ctl: &mut Controllers, scan: &crate::config::ScanConfig) {
        let since_last_face = ctl.last_face_seen.elapsed();
        match ctl.scan_phase {
            ScanPhase::Idle => {
                if since_last_face >= Duration::from_secs_f32(scan.start_delay_secs) {
                    ctl.yaw
                        .interpolate_to_neutral(Duration::from_secs_f32(scan.return_to_neutral_secs));
                    ctl.scan_phase = ScanPhase::ReturningToNeutral;
                }
            }
            ScanPhase::ReturningToNeutral => {
                if !ctl.yaw.is_interpolating() {
                    let duration = Self::sweep_leg_duration(scan.range - ctl.yaw.current(), scan.speed);
                    ctl.yaw.interpolate_to(scan.range, duration);
                    ctl.scan_phase = ScanPhase::Sweeping { direction: 1 };
                }
            }
            ScanPhase::Sweeping { direction } => {
                if !ctl.yaw.is_interpolating() {
                    let next_direction = -direction;
                    let next_target = scan.range * next_direction as f32;
                    let duration = Self::sweep_leg_duration(next_target - ctl.yaw.current(), scan.speed);
                    ctl.yaw.interpolate_to(next_target, duration);
                    ctl.scan_phase = ScanPhase::Sweeping {
                        direction: next_direction,
                    };
                }
            }
        }
    }

    /// Time to cover `distance` radians of sweep at `speed` rad/s (§4.4
    /// "oscillate ... at scanSpeed"); guards against a non-positive speed.
    fn sweep_leg_duration(distance: f32, speed: f32) -> Duration {
        Duration::from_secs_f32(distance.abs() / speed.max(1e-3))
    }

    async fn emit_pose(&self, ctl: &Controllers) {
        let pitch = ctl.pitch.current();
        let yaw = ctl.yaw.current();
        if let Some(handler) = &self.offset_handler {
            handler
                .handle_offset(Offset {
                    roll: 0.0,
                    pitch,
                    yaw,
                })
                .await;
            return;
        }
        if let Err(e) = self.robot.set_head_pose(0.0, pitch, yaw).await {
            let mut log = self.head_pose_errors.lock().unwrap();
            if log.should_log() {
                error!(error = %e, "set_head_pose failed");
            }
        }
    }

    async fn detection_tick(&self) {
        let (Some(vision), Some(detector)) = (&self.vision, &self.detector) else {
            return;
        };
        if !self.enabled.load(Ordering::SeqCst) {
            return;
        }

        let (head_yaw, body_yaw) = {
            let ctl = self.controllers.read().await;
            (ctl.yaw.current(), self.world.read().await.body_yaw())
        };

        let tuning = self.tuning.read().await.clone();
        let detection = {
            let mut ctl = self.controllers.write().await;
            ctl.perception.set_params(
                tuning.camera_fov_rad,
                tuning.vertical_fov_rad,
                tuning.position_smoothing,
            );
            ctl.perception
                .detect_face_room(vision.as_ref(), detector.as_ref(), head_yaw, body_yaw)
                .await
        };

        if let Some(room) = detection {
            let mut world = self.world.write().await;
            world.update_entity(PRIMARY, room.room_yaw, room.frame_position, room.face_width);
            drop(world);

            let mut ctl = self.controllers.write().await;
            ctl.last_face_seen = Instant::now();
            let pitch_offset = ctl.perception.frame_to_pitch_offset(room.frame_vertical);
            let pitch_target = ctl.pitch.current() + pitch_offset;
            ctl.pitch.set_target(pitch_target);
        }
    }
}

/// A minimal push/pull audio source that lets Tracker be driven
/// directly by a channel, rather than always implementing
/// [`DoaProvider`] — useful for tests and simple adapters.
pub struct ChannelDoaProvider {
    rx: tokio::sync::Mutex<Option<mpsc::Receiver<DoaReading>>>,
}

impl ChannelDoaProvider {
    pub fn new(rx: mpsc::Receiver<DoaReading>) -> Self {
        Self {
            rx: tokio::sync::Mutex::new(Some(rx)),
        }
    }
}

#[async_trait]
impl DoaProvider for ChannelDoaProvider {
    async fn subscribe(&self) -> Option<mpsc::Receiver<DoaReading>> {
        self.rx.lock().await.take()
    }

    async fn poll(&self) -> Result<DoaReading, crate::robot::DoaError> {
        Err(crate::robot::DoaError("push-only provider".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AudioSwitchConfig;
    use crate::robot::RobotError;
    use std::sync::atomic::AtomicU32;

    struct CountingRobot {
        head_pose_calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl RobotController for CountingRobot {
        async fn set_head_pose(&self, _roll: f32, _pitch: f32, _yaw: f32) -> Result<(), RobotError> {
            self.head_pose_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn set_antennas(&self, _left: f32, _right: f32) -> Result<(), RobotError> {
            Ok(())
        }
        async fn get_daemon_status(&self) -> Result<String, RobotError> {
            Ok("ok".into())
        }
        async fn set_volume(&self, _level: u8) -> Result<(), RobotError> {
            Ok(())
        }
    }

    fn tracker() -> Tracker {
        tracker_with_counter().0
    }

    fn tracker_with_counter() -> (Tracker, Arc<AtomicU32>) {
        let world = Arc::new(RwLock::new(WorldModel::new(
            1.5,
            AudioSwitchConfig::default(),
            0.2,
            0.05,
            Duration::from_secs(5),
        )));
        let head_pose_calls = Arc::new(AtomicU32::new(0));
        let robot = Arc::new(CountingRobot {
            head_pose_calls: head_pose_calls.clone(),
        });
        (
            Tracker::new(
                world,
                robot,
                None,
                None,
                None,
                Arc::new(RwLock::new(Tuning::default())),
            ),
            head_pose_calls,
        )
    }

    /// Disabling begins a return-to-neutral interpolation and suppresses
    /// the scan state machine.
    #[tokio::test]
    async fn disabling_starts_return_to_neutral() {
        let t = tracker();
        {
            let mut ctl = t.controllers.write().await;
            ctl.yaw.set_target(0.5);
            let _ = ctl.yaw.update();
        }
        t.set_enabled(false).await;
        let ctl = t.controllers.read().await;
        assert!(ctl.yaw.is_interpolating());
    }

    /// With no target and past scanStartDelay, the scan state machine
    /// moves Idle -> ReturningToNeutral on the next movement tick.
    #[tokio::test]
    async fn scan_onset_after_start_delay() {
        let t = tracker();
        {
            let mut ctl = t.controllers.write().await;
            ctl.last_face_seen = Instant::now() - Duration::from_secs(3);
        }
        t.movement_tick().await;
        let ctl = t.controllers.read().await;
        assert_eq!(ctl.scan_phase, ScanPhase::ReturningToNeutral);
    }

    /// The sweep's first leg is paced by scan.speed: covering `range`
    /// radians at a slower speed takes a longer interpolation than at a
    /// faster one.
    #[tokio::test]
    async fn sweep_leg_duration_scales_with_scan_speed() {
        let t = tracker();
        let mut ctl = t.controllers.write().await;
        ctl.scan_phase = ScanPhase::ReturningToNeutral;
        let scan = crate::config::ScanConfig {
            range: 0.5,
            speed: 0.25,
            ..Default::default()
        };
        t.drive_scan(&mut ctl, &scan);
        assert_eq!(ctl.scan_phase, ScanPhase::Sweeping { direction: 1 });
        assert!(ctl.yaw.is_interpolating());

        // At 0.25 rad/s, sweeping 0.5 rad takes ~2s: well short of done after one tick.
        let (_, moved) = ctl.yaw.update();
        assert!(moved);
        assert!(ctl.yaw.is_interpolating());
    }

    /// A present World Model target cancels any scan in progress.
    #[tokio::test]
    async fn target_present_cancels_scan() {
        let t = tracker();
        {
            let mut ctl = t.controllers.write().await;
            ctl.scan_phase = ScanPhase::Sweeping { direction: 1 };
        }
        {
            let mut world = t.world.write().await;
            world.update_entity(PRIMARY, 0.2, 50.0, 0.2);
        }
        t.movement_tick().await;
        let ctl = t.controllers.read().await;
        assert_eq!(ctl.scan_phase, ScanPhase::Idle);
    }

    /// Movement ticks call the robot's SetHeadPose when no OffsetHandler
    /// is registered.
    #[tokio::test]
    async fn movement_tick_drives_robot_directly() {
        let (t, calls) = tracker_with_counter();
        t.movement_tick().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    /// A tuning update made through the shared handle (as the Tuning API
    /// would) takes effect on the next movement tick, not a disconnected copy.
    #[tokio::test]
    async fn shared_tuning_update_reaches_pd_controller() {
        let world = Arc::new(RwLock::new(WorldModel::new(
            1.5,
            AudioSwitchConfig::default(),
            0.2,
            0.05,
            Duration::from_secs(5),
        )));
        let robot = Arc::new(CountingRobot {
            head_pose_calls: Arc::new(AtomicU32::new(0)),
        });
        let tuning = Arc::new(RwLock::new(Tuning::default()));
        let t = Tracker::new(world, robot, None, None, None, tuning.clone());

        {
            let mut guard = tuning.write().await;
            guard.yaw.max_step_per_tick = 0.001;
        }

        {
            let mut ctl = t.controllers.write().await;
            ctl.yaw.set_target(1.0);
        }
        t.movement_tick().await;
        let ctl = t.controllers.read().await;
        assert!(ctl.yaw.current().abs() <= 0.001 + 1e-6);
    }

    /// A second concurrent `run` on the same Tracker is rejected rather
    /// than spawning a duplicate set of tickers.
    #[tokio::test]
    async fn concurrent_run_is_rejected() {
        let t = Arc::new(tracker());
        let cancel = CancellationToken::new();
        let first = {
            let t = t.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { t.run(cancel).await })
        };
        tokio::task::yield_now().await;

        let second = t.clone().run(cancel.clone()).await;
        assert!(matches!(second, Err(crate::error::TrackerError::AlreadyRunning)));

        cancel.cancel();
        let _ = first.await;
    }
}
