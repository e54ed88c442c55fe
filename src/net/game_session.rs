//! Game loop runner - ticks the world on a fixed interval and pumps
//! outbound session queues onto the wire encoding

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::game::world::{TickReport, World};
use crate::metrics::Metrics;
use crate::net::client_link::ClientHandle;
use crate::net::protocol::encode;

pub type SharedWorld = Arc<RwLock<World>>;

/// Start the fixed-rate tick task.
///
/// Reports carrying world requests are forwarded on the returned channel;
/// ticks with nothing to report are not sent.
pub fn start_game_loop(
    world: SharedWorld,
    tick_rate: u32,
) -> (JoinHandle<()>, mpsc::UnboundedReceiver<TickReport>) {
    let (report_tx, report_rx) = mpsc::unbounded_channel();

    let handle = tokio::spawn(async move {
        let tick_rate = tick_rate.max(1);
        let mut ticker = interval(Duration::from_micros(1_000_000 / tick_rate as u64));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("Game loop started at {} Hz", tick_rate);
        let start = Instant::now();
        let mut tick_count: u64 = 0;

        loop {
            ticker.tick().await;
            tick_count += 1;

            let report = world.write().await.tick();

            for id in &report.torn_down {
                debug!("Session {} left the world", id);
            }
            if !report.requests.is_empty() || !report.torn_down.is_empty() {
                if report_tx.send(report).is_err() {
                    debug!("Tick report receiver dropped");
                }
            }

            // Every 30 seconds
            if tick_count % (tick_rate as u64 * 30) == 0 {
                let world = world.read().await;
                info!(
                    "World: {}s, tick {}, {} sessions, {} objects",
                    start.elapsed().as_secs(),
                    world.current_tick(),
                    world.session_count(),
                    world.objects().len()
                );
            }
        }
    });

    (handle, report_rx)
}

/// Drain one client's outbound queue every `period`, encoding each message.
///
/// Stands in for a transport writer; ends once the session is torn down.
pub fn start_outbound_pump(client: ClientHandle, metrics: Arc<Metrics>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let messages = match client.recv_pending() {
                Ok(messages) => messages,
                Err(e) => {
                    debug!("Outbound pump stopping: {}", e);
                    break;
                }
            };
            for message in &messages {
                match encode(message) {
                    Ok(bytes) => {
                        metrics.bytes_encoded.fetch_add(bytes.len() as u64, Ordering::Relaxed);
                    }
                    Err(e) => warn!("Failed to encode outbound message: {}", e),
                }
            }
        }
    })
}
