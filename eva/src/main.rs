mod args;
mod handler;
mod stubs;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use eva_core::audio::AudioPlayer;
use eva_core::config::Tuning;
use eva_core::memory::Memory;
use eva_core::realtime::RealtimeClient;
use eva_core::robot::{DoaProvider, FaceDetector, RobotController, VisionProvider};
use eva_core::tools::handlers::{
    DescribeSceneTool, ExpressEmotionTool, FindPersonTool, GetTimeTool, LookAroundTool,
    MoveHeadTool, NodYesTool, RecallPersonTool, RememberPersonTool, SearchFlightsTool,
    SetTimerTool, SetVolumeTool, ShakeHeadNoTool, WaveHelloTool, WebSearchTool,
};
use eva_core::tools::ToolRegistry;
use eva_core::tracker::Tracker;
use eva_core::uplink::{self, AudioSender};
use eva_core::world_model::WorldModel;

use args::Args;
use handler::BridgeHandler;
use stubs::{
    LoggingRobot, LoggingSink, LoggingTimerScheduler, NoCamera, NoDoa, StubFlightSearch,
    StubSceneDescriber, StubWebSearch,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(tracing_subscriber::filter::LevelFilter::from(args.log_level))
        .init();

    let tuning = Tuning::default();
    tuning.validate()?;
    let tuning_shared = Arc::new(RwLock::new(tuning.clone()));

    let robot: Arc<dyn RobotController> = Arc::new(LoggingRobot);
    let camera = Arc::new(NoCamera);
    let vision: Arc<dyn VisionProvider> = camera.clone();
    let detector: Arc<dyn FaceDetector> = camera.clone();
    let doa: Arc<dyn DoaProvider> = Arc::new(NoDoa);
    let memory = Arc::new(Memory::new(None));

    let world = Arc::new(RwLock::new(WorldModel::new(
        tuning.body_rotation.max_yaw,
        tuning.audio_switch.clone(),
        tuning.decay_rate,
        tuning.forget_threshold,
        Duration::from_secs_f32(tuning.forget_timeout_secs),
    )));

    let tracker = Arc::new(Tracker::new(
        world.clone(),
        robot.clone(),
        Some(vision.clone()),
        Some(detector.clone()),
        Some(doa.clone()),
        tuning_shared.clone(),
    ));

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(MoveHeadTool::new(robot.clone())));
    registry.register(Arc::new(ExpressEmotionTool::new(robot.clone())));
    registry.register(Arc::new(WaveHelloTool::new(robot.clone())));
    registry.register(Arc::new(NodYesTool::new(robot.clone())));
    registry.register(Arc::new(ShakeHeadNoTool::new(robot.clone())));
    registry.register(Arc::new(LookAroundTool::new(robot.clone())));
    registry.register(Arc::new(RememberPersonTool::new(memory.clone())));
    registry.register(Arc::new(RecallPersonTool::new(memory.clone())));
    registry.register(Arc::new(DescribeSceneTool::new(
        vision.clone(),
        Arc::new(StubSceneDescriber),
    )));
    registry.register(Arc::new(FindPersonTool::new(
        vision.clone(),
        detector.clone(),
        memory.clone(),
    )));
    registry.register(Arc::new(SearchFlightsTool::new(Arc::new(StubFlightSearch))));
    registry.register(Arc::new(WebSearchTool::new(Arc::new(StubWebSearch))));
    registry.register(Arc::new(SetTimerTool::new(Arc::new(LoggingTimerScheduler))));
    registry.register(Arc::new(GetTimeTool));
    registry.register(Arc::new(SetVolumeTool::new(robot.clone())));
    let tools = Arc::new(registry);

    let player = Arc::new(AudioPlayer::new(LoggingSink::default()));
    let bridge_handler = Arc::new(BridgeHandler::new(player.clone()));
    let realtime = Arc::new(RealtimeClient::new(
        args.realtime_url.clone(),
        tools,
        bridge_handler.clone(),
    ));
    bridge_handler.bind_client(&realtime);

    let cancel = CancellationToken::new();

    realtime.connect(cancel.clone()).await?;
    realtime
        .configure_session(args.instructions.clone(), args.voice_id.clone(), tuning.silence_duration_ms)
        .await?;

    let tuning_addr = args.tuning_addr.clone();
    let tuning_router = eva_core::tuning_api::router(tuning_shared.clone());
    let tuning_cancel = cancel.clone();
    let tuning_server = tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(&tuning_addr).await {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(error = %e, addr = %tuning_addr, "failed to bind tuning API");
                return;
            }
        };
        info!(addr = %tuning_addr, "tuning API listening");
        let serve = axum::serve(listener, tuning_router);
        tokio::select! {
            _ = tuning_cancel.cancelled() => {}
            result = serve => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "tuning API server exited");
                }
            }
        }
    });

    let tracker_task = {
        let tracker = tracker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tracker.run(cancel).await {
                tracing::error!(error = %e, "tracker exited");
            }
        })
    };

    let uplink_task = {
        let sender = realtime.clone() as Arc<dyn AudioSender>;
        let gate = player.clone() as Arc<dyn uplink::SpeakingGate>;
        let cancel = cancel.clone();
        tokio::spawn(async move { uplink::run_uplink(stubs::NoAudioSource, sender, gate, cancel).await })
    };

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    cancel.cancel();
    realtime.close().await;

    let _ = tokio::join!(tracker_task, uplink_task, tuning_server);
    Ok(())
}
