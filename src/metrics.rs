//! Prometheus-compatible metrics endpoint
//!
//! Exposes session and tick metrics in Prometheus format.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, debug};

/// Rolling window used for tick percentiles
const TICK_HISTORY: usize = 1000;

/// Metrics registry for the game server
#[derive(Debug)]
pub struct Metrics {
    // Session counts
    pub sessions_active: AtomicU64,
    pub sessions_playing: AtomicU64,
    pub sessions_spectating: AtomicU64,
    pub sessions_disconnecting: AtomicU64,
    pub sessions_connected_total: AtomicU64,
    pub sessions_torn_down_total: AtomicU64,

    // World
    pub objects_live: AtomicU64,
    pub world_requests_total: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // Visibility churn
    pub full_refreshes: AtomicU64,
    pub nodes_updated: AtomicU64,
    pub nodes_removed: AtomicU64,

    // Outbound queue
    pub messages_sent: AtomicU64,
    pub messages_dropped: AtomicU64,
    pub bytes_encoded: AtomicU64,

    start_time: Instant,

    // VecDeque for O(1) pop_front
    tick_history: RwLock<VecDeque<u64>>,
}

#[derive(Serialize)]
struct SessionsSnapshot {
    active: u64,
    playing: u64,
    spectating: u64,
    disconnecting: u64,
    connected_total: u64,
    torn_down_total: u64,
}

#[derive(Serialize)]
struct PerformanceSnapshot {
    tick_time_us: u64,
    tick_time_p95_us: u64,
    tick_time_p99_us: u64,
    tick_time_max_us: u64,
    tick_count: u64,
}

#[derive(Serialize)]
struct VisibilitySnapshot {
    full_refreshes: u64,
    nodes_updated: u64,
    nodes_removed: u64,
}

#[derive(Serialize)]
struct NetworkSnapshot {
    messages_sent: u64,
    messages_dropped: u64,
    bytes_encoded: u64,
}

#[derive(Serialize)]
struct MetricsSnapshot {
    sessions: SessionsSnapshot,
    objects: u64,
    world_requests: u64,
    performance: PerformanceSnapshot,
    visibility: VisibilitySnapshot,
    network: NetworkSnapshot,
    uptime_seconds: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            sessions_active: AtomicU64::new(0),
            sessions_playing: AtomicU64::new(0),
            sessions_spectating: AtomicU64::new(0),
            sessions_disconnecting: AtomicU64::new(0),
            sessions_connected_total: AtomicU64::new(0),
            sessions_torn_down_total: AtomicU64::new(0),
            objects_live: AtomicU64::new(0),
            world_requests_total: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            full_refreshes: AtomicU64::new(0),
            nodes_updated: AtomicU64::new(0),
            nodes_removed: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
            bytes_encoded: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        // Sessions
        metric!("cell_arena_sessions_active", "Sessions in the registry", "gauge",
            self.sessions_active.load(Ordering::Relaxed));
        metric!("cell_arena_sessions_playing", "Sessions owning at least one cell", "gauge",
            self.sessions_playing.load(Ordering::Relaxed));
        metric!("cell_arena_sessions_spectating", "Sessions in a spectate camera mode", "gauge",
            self.sessions_spectating.load(Ordering::Relaxed));
        metric!("cell_arena_sessions_disconnecting", "Sessions counting down after disconnect", "gauge",
            self.sessions_disconnecting.load(Ordering::Relaxed));
        metric!("cell_arena_sessions_connected_total", "Sessions ever connected", "counter",
            self.sessions_connected_total.load(Ordering::Relaxed));
        metric!("cell_arena_sessions_torn_down_total", "Sessions torn down", "counter",
            self.sessions_torn_down_total.load(Ordering::Relaxed));

        // World
        metric!("cell_arena_objects", "Live world objects", "gauge",
            self.objects_live.load(Ordering::Relaxed));
        metric!("cell_arena_world_requests_total", "Spawn/split/eject requests raised by sessions", "counter",
            self.world_requests_total.load(Ordering::Relaxed));

        // Performance
        metric!("cell_arena_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("cell_arena_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("cell_arena_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("cell_arena_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("cell_arena_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));

        // Visibility
        metric!("cell_arena_visibility_full_refreshes_total", "Full visibility rescans", "counter",
            self.full_refreshes.load(Ordering::Relaxed));
        metric!("cell_arena_nodes_updated_total", "Node updates sent", "counter",
            self.nodes_updated.load(Ordering::Relaxed));
        metric!("cell_arena_nodes_removed_total", "Node removals sent", "counter",
            self.nodes_removed.load(Ordering::Relaxed));

        // Network
        metric!("cell_arena_messages_sent_total", "Messages queued to clients", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("cell_arena_messages_dropped_total", "Messages dropped on a full outbound queue", "counter",
            self.messages_dropped.load(Ordering::Relaxed));
        metric!("cell_arena_bytes_encoded_total", "Bytes encoded for the wire", "counter",
            self.bytes_encoded.load(Ordering::Relaxed));
        metric!("cell_arena_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics (alternative for direct API access)
    pub fn to_json(&self) -> String {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let snapshot = MetricsSnapshot {
            sessions: SessionsSnapshot {
                active: load(&self.sessions_active),
                playing: load(&self.sessions_playing),
                spectating: load(&self.sessions_spectating),
                disconnecting: load(&self.sessions_disconnecting),
                connected_total: load(&self.sessions_connected_total),
                torn_down_total: load(&self.sessions_torn_down_total),
            },
            objects: load(&self.objects_live),
            world_requests: load(&self.world_requests_total),
            performance: PerformanceSnapshot {
                tick_time_us: load(&self.tick_time_us),
                tick_time_p95_us: load(&self.tick_time_p95_us),
                tick_time_p99_us: load(&self.tick_time_p99_us),
                tick_time_max_us: load(&self.tick_time_max_us),
                tick_count: load(&self.tick_count),
            },
            visibility: VisibilitySnapshot {
                full_refreshes: load(&self.full_refreshes),
                nodes_updated: load(&self.nodes_updated),
                nodes_removed: load(&self.nodes_removed),
            },
            network: NetworkSnapshot {
                messages_sent: load(&self.messages_sent),
                messages_dropped: load(&self.messages_dropped),
                bytes_encoded: load(&self.bytes_encoded),
            },
            uptime_seconds: self.uptime_seconds(),
        };
        serde_json::to_string_pretty(&snapshot).unwrap_or_else(|_| "{}".to_string())
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Route a raw request line to a response
fn route(request: &str, metrics: &Metrics) -> String {
    if request.starts_with("GET /metrics/json") || request.starts_with("GET /json") {
        http_response("application/json", &metrics.to_json())
    } else if request.starts_with("GET /metrics") {
        http_response("text/plain; version=0.0.4", &metrics.to_prometheus())
    } else if request.starts_with("GET /health") || request.starts_with("GET / ") {
        http_response("text/plain", "OK")
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = route(&request, &metrics);
                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.sessions_active.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_tick_time() {
        let metrics = Metrics::new();
        for i in 0..100 {
            metrics.record_tick_time(Duration::from_micros(100 + i * 10));
        }

        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 100);
        assert!(metrics.tick_time_p95_us.load(Ordering::Relaxed) >= 1040);
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 1090);
    }

    #[test]
    fn test_tick_history_is_bounded() {
        let metrics = Metrics::new();
        for _ in 0..(TICK_HISTORY + 50) {
            metrics.record_tick_time(Duration::from_micros(10));
        }
        assert_eq!(metrics.tick_history.read().len(), TICK_HISTORY);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.sessions_active.store(12, Ordering::Relaxed);
        metrics.sessions_spectating.store(3, Ordering::Relaxed);

        let output = metrics.to_prometheus();

        assert!(output.contains("cell_arena_sessions_active 12"));
        assert!(output.contains("cell_arena_sessions_spectating 3"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.sessions_active.store(100, Ordering::Relaxed);

        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(value["sessions"]["active"], 100);
        assert!(value["performance"].is_object());
    }

    #[test]
    fn test_routes() {
        let metrics = Metrics::new();
        assert!(route("GET /metrics/json HTTP/1.1", &metrics).contains("application/json"));
        assert!(route("GET /metrics HTTP/1.1", &metrics).contains("version=0.0.4"));
        assert!(route("GET /health HTTP/1.1", &metrics).ends_with("OK"));
        assert!(route("GET /nope HTTP/1.1", &metrics).starts_with("HTTP/1.1 404"));
    }
}
