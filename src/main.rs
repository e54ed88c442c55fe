use std::sync::Arc;
use std::time::Duration;
use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use cell_arena_server::config::ServerConfig;
use cell_arena_server::game::mode::WorldRequest;
use cell_arena_server::game::objects::{ObjectKind, WorldObject};
use cell_arena_server::game::world::World;
use cell_arena_server::metrics::{self, Metrics};
use cell_arena_server::net::game_session::{start_game_loop, start_outbound_pump, SharedWorld};
use cell_arena_server::net::protocol::ClientInput;
use cell_arena_server::util::rect::Rect;
use cell_arena_server::util::vec2::Vec2;

const FOOD_COUNT: usize = 500;
const FOOD_SIZE: f32 = 10.0;
const PLAYER_START_SIZE: f32 = 32.0;

fn random_point(border: &Rect) -> Vec2 {
    let mut rng = rand::thread_rng();
    Vec2::new(
        rng.gen_range(border.left..border.right),
        rng.gen_range(border.top..border.bottom),
    )
}

/// Stand-in simulation: honours spawn requests, logs the rest
async fn handle_request(world: &SharedWorld, request: WorldRequest) {
    match request {
        WorldRequest::Spawn { session } => {
            let mut world = world.write().await;
            let position = random_point(&world.config().border);
            let id = world.spawn_object(
                WorldObject::new(ObjectKind::PlayerCell, position, PLAYER_START_SIZE).with_owner(session),
            );
            debug!("Spawned cell {} for session {}", id, session);
        }
        WorldRequest::Split { session } | WorldRequest::Eject { session } => {
            debug!("Session {} requested {:?}", session, request);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Cell Arena Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    config.validate()?;
    info!(
        "Configuration loaded: {} Hz, mode {:?}, view refresh every {} ticks",
        config.tick_rate, config.game_mode, config.view_refresh_period
    );

    let metrics = Arc::new(Metrics::new());
    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let tick_rate = config.tick_rate;
    let pump_period = Duration::from_millis(config.tick_duration_ms());
    let mut world = World::new(config, metrics.clone());

    let border = world.config().border;
    for _ in 0..FOOD_COUNT {
        world.spawn_object(WorldObject::new(ObjectKind::Food, random_point(&border), FOOD_SIZE));
    }

    // Headless clients so the pipeline has someone to serve
    let mut pumps = Vec::new();
    for input in [ClientInput::Join { name: "drifter".into() }, ClientInput::Spectate] {
        let (id, handle) = world.connect_client();
        handle.push(ClientInput::Handshake { protocol: 6 })?;
        handle.push(input)?;
        info!("Headless client attached as session {}", id);
        pumps.push(start_outbound_pump(handle, metrics.clone(), pump_period));
    }

    let world: SharedWorld = Arc::new(RwLock::new(world));
    let (game_loop, mut reports) = start_game_loop(world.clone(), tick_rate);

    let simulation = {
        let world = world.clone();
        tokio::spawn(async move {
            while let Some(report) = reports.recv().await {
                for request in report.requests {
                    handle_request(&world, request).await;
                }
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    game_loop.abort();
    simulation.abort();
    for pump in pumps {
        pump.abort();
    }

    info!("Server stopped");
    Ok(())
}
