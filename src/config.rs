use std::str::FromStr;

use crate::game::constants::{camera, disconnect, leaderboard, queue, refresh, tick};
use crate::util::rect::Rect;

/// Which rule set the world runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameModeKind {
    FreeForAll,
    Teams,
}

impl FromStr for GameModeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ffa" | "free_for_all" => Ok(GameModeKind::FreeForAll),
            "teams" => Ok(GameModeKind::Teams),
            other => Err(format!("unknown game mode '{}'", other)),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Base viewport width before zoom scaling
    pub view_base_width: f32,
    /// Base viewport height before zoom scaling
    pub view_base_height: f32,
    /// World border
    pub border: Rect,
    /// Offset outbound coordinates by a per-session random amount
    pub scramble_coords: bool,
    /// Ticks between full visibility refreshes
    pub view_refresh_period: u32,
    /// Ticks between leaderboard sends
    pub leaderboard_refresh_period: u32,
    /// Ticks a disconnected player's cells linger
    pub disconnect_grace_ticks: u32,
    /// Whether teaming events are recorded (decay always runs)
    pub anti_teaming_enabled: bool,
    /// Leaderboard rows
    pub leaderboard_size: usize,
    /// Per-client outbound queue capacity
    pub outbound_queue_capacity: usize,
    /// Port for the metrics endpoint
    pub metrics_port: u16,
    /// Rule set
    pub game_mode: GameModeKind,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: tick::DEFAULT_RATE,
            view_base_width: camera::VIEW_BASE_X,
            view_base_height: camera::VIEW_BASE_Y,
            border: Rect::new(0.0, 0.0, 6000.0, 6000.0),
            scramble_coords: true,
            view_refresh_period: refresh::VIEW_PERIOD,
            leaderboard_refresh_period: refresh::LEADERBOARD_PERIOD,
            disconnect_grace_ticks: disconnect::GRACE_TICKS,
            anti_teaming_enabled: true,
            leaderboard_size: leaderboard::SIZE,
            outbound_queue_capacity: queue::OUTBOUND_CAPACITY,
            metrics_port: 9090,
            game_mode: GameModeKind::FreeForAll,
        }
    }
}

/// Parse an env var, warning and returning None if it is malformed
fn read_env<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", name, raw);
            None
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Some(rate) = read_env::<u32>("TICK_RATE") {
            if (1..=120).contains(&rate) {
                config.tick_rate = rate;
            } else {
                tracing::warn!("TICK_RATE must be 1-120, using default");
            }
        }

        if let Some(x) = read_env::<f32>("VIEW_BASE_X") {
            if x > 0.0 {
                config.view_base_width = x;
            } else {
                tracing::warn!("VIEW_BASE_X must be > 0, using default");
            }
        }
        if let Some(y) = read_env::<f32>("VIEW_BASE_Y") {
            if y > 0.0 {
                config.view_base_height = y;
            } else {
                tracing::warn!("VIEW_BASE_Y must be > 0, using default");
            }
        }

        let mut border = config.border;
        if let Some(v) = read_env::<f32>("BORDER_LEFT") {
            border.left = v;
        }
        if let Some(v) = read_env::<f32>("BORDER_TOP") {
            border.top = v;
        }
        if let Some(v) = read_env::<f32>("BORDER_RIGHT") {
            border.right = v;
        }
        if let Some(v) = read_env::<f32>("BORDER_BOTTOM") {
            border.bottom = v;
        }
        if border.width() > 0.0 && border.height() > 0.0 {
            config.border = border;
        } else {
            tracing::warn!("Border {:?} is empty or inverted, using default", border);
        }

        if let Some(flag) = read_env::<u8>("SCRAMBLE_COORDS") {
            config.scramble_coords = flag != 0;
        }
        if let Some(flag) = read_env::<u8>("ANTI_TEAMING") {
            config.anti_teaming_enabled = flag != 0;
        }

        if let Some(ticks) = read_env::<u32>("VIEW_REFRESH_TICKS") {
            if ticks > 0 {
                config.view_refresh_period = ticks;
            } else {
                tracing::warn!("VIEW_REFRESH_TICKS must be > 0, using default");
            }
        }
        if let Some(ticks) = read_env::<u32>("LEADERBOARD_REFRESH_TICKS") {
            if ticks > 0 {
                config.leaderboard_refresh_period = ticks;
            } else {
                tracing::warn!("LEADERBOARD_REFRESH_TICKS must be > 0, using default");
            }
        }
        if let Some(ticks) = read_env::<u32>("DISCONNECT_GRACE_TICKS") {
            config.disconnect_grace_ticks = ticks;
        }

        if let Some(size) = read_env::<usize>("LEADERBOARD_SIZE") {
            config.leaderboard_size = size;
        }
        if let Some(capacity) = read_env::<usize>("OUTBOUND_QUEUE") {
            if capacity > 0 {
                config.outbound_queue_capacity = capacity;
            } else {
                tracing::warn!("OUTBOUND_QUEUE must be > 0, using default");
            }
        }
        if let Some(port) = read_env::<u16>("METRICS_PORT") {
            config.metrics_port = port;
        }
        if let Some(mode) = read_env::<GameModeKind>("GAME_MODE") {
            config.game_mode = mode;
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("tick_rate must be at least 1"));
        }
        if !(self.view_base_width > 0.0 && self.view_base_height > 0.0) {
            return Err(ConfigError::Invalid("view base must be positive"));
        }
        if !(self.border.width() > 0.0 && self.border.height() > 0.0) {
            return Err(ConfigError::Invalid("border must be non-empty"));
        }
        if self.view_refresh_period == 0 || self.leaderboard_refresh_period == 0 {
            return Err(ConfigError::Invalid("refresh periods must be at least 1"));
        }
        if self.outbound_queue_capacity == 0 {
            return Err(ConfigError::Invalid("outbound_queue_capacity must be at least 1"));
        }
        Ok(())
    }

    /// Tick duration in milliseconds
    pub fn tick_duration_ms(&self) -> u64 {
        1000 / self.tick_rate.max(1) as u64
    }

    /// The read-only subset sessions use every tick
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            view_base_width: self.view_base_width,
            view_base_height: self.view_base_height,
            border: self.border,
            view_refresh_period: self.view_refresh_period,
            leaderboard_refresh_period: self.leaderboard_refresh_period,
            disconnect_grace_ticks: self.disconnect_grace_ticks,
        }
    }
}

/// Per-tick settings a session reads
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub view_base_width: f32,
    pub view_base_height: f32,
    pub border: Rect,
    pub view_refresh_period: u32,
    pub leaderboard_refresh_period: u32,
    pub disconnect_grace_ticks: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        ServerConfig::default().session_config()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}
