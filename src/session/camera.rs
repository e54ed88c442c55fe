//! Camera modes: normal play, spectate-follow and free-roam
//!
//! Every tick the controller turns the session's state into a
//! [`CameraFrame`]: where the camera is, which rectangle of the world is
//! relevant, what zoom to tell the client and whether visibility should be
//! computed or mirrored from a followed session.

use tracing::trace;

use crate::config::SessionConfig;
use crate::game::constants::camera::{
    FREE_ROAM_MAX_SPEED, FREE_ROAM_SPEED_DIVISOR, FREE_ROAM_VIEW_MULT, FREE_ROAM_ZOOM,
    MIN_SCALE_SIZE, SPECTATE_ZOOM,
};
use crate::game::objects::{ObjectId, SessionId};
use crate::session::error::SessionError;
use crate::session::CellTotals;
use crate::util::rect::Rect;
use crate::util::vec2::Vec2;

/// Which camera the session runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CameraMode {
    /// Follow own cells
    #[default]
    Normal,
    /// Follow the largest session, mirroring what it sees
    SpectateFollow,
    /// Fly toward the mouse target inside the border
    FreeRoam,
}

impl CameraMode {
    #[inline]
    pub fn is_spectating(&self) -> bool {
        !matches!(self, CameraMode::Normal)
    }
}

/// What a spectator needs to know about the session it follows
#[derive(Debug, Clone, PartialEq)]
pub struct SpectateTarget {
    pub id: SessionId,
    pub center: Vec2,
    pub total_size: f32,
    pub visible: Vec<ObjectId>,
}

/// Where the visible set comes from this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewSource {
    /// Computed from this session's own viewport
    Own,
    /// Adopted verbatim from the followed session
    Mirror(SessionId),
}

/// Output of one camera step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraFrame {
    /// Mode that actually ran (spectate-follow falls back to free-roam)
    pub mode: CameraMode,
    pub center: Vec2,
    pub viewport: Rect,
    pub zoom: f32,
    pub source: ViewSource,
}

/// `sqrt(s) / ln(s)`, refusing sizes where the log is at or under the clamp
pub fn checked_scale(total_size: f32) -> Result<f32, SessionError> {
    if total_size.is_nan() || total_size < MIN_SCALE_SIZE {
        return Err(SessionError::DegenerateZoom(total_size));
    }
    Ok(total_size.sqrt() / total_size.ln())
}

/// View scale for a total size, clamping degenerate sizes up to the minimum
pub fn view_scale(total_size: f32) -> f32 {
    checked_scale(total_size).unwrap_or_else(|e| {
        trace!("{}, clamping to {}", e, MIN_SCALE_SIZE);
        MIN_SCALE_SIZE.sqrt() / MIN_SCALE_SIZE.ln()
    })
}

/// Per-session camera state
#[derive(Debug, Clone, Default)]
pub struct CameraController {
    mode: CameraMode,
    center: Vec2,
    mouse: Vec2,
}

impl CameraController {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn mode(&self) -> CameraMode {
        self.mode
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        self.center
    }

    #[inline]
    pub fn mouse(&self) -> Vec2 {
        self.mouse
    }

    pub fn set_mouse(&mut self, target: Vec2) {
        self.mouse = target;
    }

    /// Move the camera directly. Free-roaming cameras stay inside the border.
    pub fn set_center(&mut self, center: Vec2, border: &Rect) {
        self.center = if self.mode == CameraMode::FreeRoam {
            border.clamp_point(center)
        } else {
            center
        };
    }

    pub fn enter_spectate(&mut self) {
        if self.mode == CameraMode::Normal {
            self.mode = CameraMode::SpectateFollow;
        }
    }

    pub fn leave_spectate(&mut self) {
        self.mode = CameraMode::Normal;
    }

    /// Switch between following and free-roaming. Returns false (and does
    /// nothing) when not spectating.
    pub fn toggle_free_roam(&mut self) -> bool {
        self.mode = match self.mode {
            CameraMode::Normal => return false,
            CameraMode::SpectateFollow => CameraMode::FreeRoam,
            CameraMode::FreeRoam => CameraMode::SpectateFollow,
        };
        true
    }

    /// Run the active mode for one tick
    pub fn step(
        &mut self,
        cells: &CellTotals,
        target: Option<&SpectateTarget>,
        config: &SessionConfig,
    ) -> CameraFrame {
        match self.mode {
            CameraMode::Normal => self.follow_cells(cells, config),
            CameraMode::SpectateFollow => match Self::select_target(target) {
                Ok(target) => self.follow_target(target, config),
                Err(e) => {
                    trace!("{}, free-roaming instead", e);
                    self.free_roam(config)
                }
            },
            CameraMode::FreeRoam => self.free_roam(config),
        }
    }

    fn select_target(target: Option<&SpectateTarget>) -> Result<&SpectateTarget, SessionError> {
        target.ok_or(SessionError::NoSpectateTarget)
    }

    fn follow_cells(&mut self, cells: &CellTotals, config: &SessionConfig) -> CameraFrame {
        if let Some(centroid) = cells.centroid() {
            self.center = centroid;
        }

        let scale = view_scale(cells.size);
        CameraFrame {
            mode: CameraMode::Normal,
            center: self.center,
            viewport: Rect::centered(
                self.center,
                config.view_base_width * scale,
                config.view_base_height * scale,
            ),
            zoom: SPECTATE_ZOOM / scale,
            source: ViewSource::Own,
        }
    }

    fn follow_target(&mut self, target: &SpectateTarget, config: &SessionConfig) -> CameraFrame {
        let scale = view_scale(target.total_size);
        self.center = target.center;

        CameraFrame {
            mode: CameraMode::SpectateFollow,
            center: self.center,
            viewport: Rect::centered(
                self.center,
                config.view_base_width * scale,
                config.view_base_height * scale,
            ),
            zoom: SPECTATE_ZOOM / scale,
            source: ViewSource::Mirror(target.id),
        }
    }

    fn free_roam(&mut self, config: &SessionConfig) -> CameraFrame {
        let (direction, distance) = (self.mouse - self.center).normalize_with_length();
        let speed = (distance / FREE_ROAM_SPEED_DIVISOR).min(FREE_ROAM_MAX_SPEED);
        self.center = config.border.clamp_point(self.center + direction * speed);

        CameraFrame {
            mode: CameraMode::FreeRoam,
            center: self.center,
            viewport: Rect::centered(
                self.center,
                config.view_base_width * FREE_ROAM_VIEW_MULT,
                config.view_base_height * FREE_ROAM_VIEW_MULT,
            ),
            zoom: FREE_ROAM_ZOOM,
            source: ViewSource::Own,
        }
    }
}
