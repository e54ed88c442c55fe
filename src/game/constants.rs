/// Tick timing
pub mod tick {
    /// Default simulation rate in Hz (50 ms ticks)
    pub const DEFAULT_RATE: u32 = 20;
}

/// Viewport and camera constants
pub mod camera {
    /// Default base viewport width in world units (scaled by total size)
    pub const VIEW_BASE_X: f32 = 1024.0;
    /// Default base viewport height in world units
    pub const VIEW_BASE_Y: f32 = 592.0;
    /// Smallest total size fed into `sqrt(s) / ln(s)`: the curve's minimum.
    /// Above it the scale is finite and non-decreasing in total size.
    pub const MIN_SCALE_SIZE: f32 = std::f32::consts::E * std::f32::consts::E;
    /// Numerator of the spectate-follow zoom (`zoom = SPECTATE_ZOOM / scale`)
    pub const SPECTATE_ZOOM: f32 = 1.5;
    /// Fixed zoom sent while free-roaming
    pub const FREE_ROAM_ZOOM: f32 = 0.4995;
    /// Free-roam viewport is this many base viewports wide/high
    pub const FREE_ROAM_VIEW_MULT: f32 = 2.5;
    /// Free-roam speed is `distance / FREE_ROAM_SPEED_DIVISOR` per tick
    pub const FREE_ROAM_SPEED_DIVISOR: f32 = 10.0;
    /// Free-roam speed cap per tick
    pub const FREE_ROAM_MAX_SPEED: f32 = 30.0;
}

/// Refresh cadences (ticks)
pub mod refresh {
    /// Full visibility rescan period
    pub const VIEW_PERIOD: u32 = 5;
    /// Leaderboard resend period
    pub const LEADERBOARD_PERIOD: u32 = 10;
}

/// Anti-teaming feedback model
pub mod anti_teaming {
    /// Per-tick retention of the loss/gain accumulators
    pub const RETENTION: f32 = 0.997;
    /// Upper bound of the teaming ratio (and therefore of the decay multiplier)
    pub const MAX_RATIO: f32 = 2.0;
    /// Base weight added to the ratio when an event is recorded
    pub const EVENT_BASE_WEIGHT: f32 = 0.5;
    /// Floor for `score / 2` so an empty session never divides by zero
    pub const SCORE_EPSILON: f32 = 1e-6;
}

/// Disconnect handling
pub mod disconnect {
    /// Default grace period: 60 seconds at the default tick rate
    pub const GRACE_TICKS: u32 = 60 * super::tick::DEFAULT_RATE;
}

/// Coordinate obfuscation
pub mod scramble {
    /// Scramble offsets are drawn from `0..RANGE` on each axis
    pub const RANGE: i32 = 1 << 15;
}

/// Outbound/inbound queue sizing
pub mod queue {
    /// Messages buffered per client before sends start dropping
    pub const OUTBOUND_CAPACITY: usize = 256;
    /// Input events buffered per client between ticks
    pub const INPUT_CAPACITY: usize = 64;
}

/// Leaderboard
pub mod leaderboard {
    /// Number of entries shown
    pub const SIZE: usize = 10;
}

/// Teams mode
pub mod teams {
    /// Number of teams sessions are spread across
    pub const COUNT: u8 = 3;
}
