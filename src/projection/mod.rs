//! Projection Module
//!
//! A projection binds a source window to a target window: the target shows
//! the source's pixels, transformed by the brightness set on the target.

pub mod brightness;
pub mod lifecycle;
pub mod redraw;
pub mod registry;

use thiserror::Error;

use crate::display::{
    Damage, DisplayError, Gcontext, MapState, Rect, Region, Visualid, Window, WindowInfo,
    NO_WINDOW,
};
use crate::transfer::{Transfer, TransferError};

/// Stable identity of a projection, independent of its window ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProjectionId(pub u64);

/// Why an ENABLE request was not honoured
#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error(
        "0x{:08x} -> 0x{:08x} overlaps existing projection 0x{:08x} -> 0x{:08x}",
        .source_window, .target_window, .existing_source, .existing_target
    )]
    AlreadyProjected {
        source_window: Window,
        target_window: Window,
        existing_source: Window,
        existing_target: Window,
    },

    #[error("can't project 0x{0:08x} onto itself")]
    SameWindow(Window),

    #[error("failed to get attributes for {role} 0x{window:08x}: {error}")]
    AttributeQueryFailed {
        role: &'static str,
        window: Window,
        #[source]
        error: DisplayError,
    },

    #[error("can't project between different {0}")]
    IncompatibleWindows(&'static str),

    #[error("failed to set up projection resources: {0}")]
    Resource(#[from] DisplayError),

    #[error("failed to create transfer backend: {0}")]
    BackendCreationFailed(#[from] TransferError),
}

/// Projection state read by the redraw pipeline and the transfer backends
#[derive(Debug, Clone)]
pub struct ProjectionState {
    pub source: Window,
    pub target: Window,

    pub root: Window,
    pub depth: u8,
    pub visual: Visualid,

    /// Source position and size, border excluded
    pub source_geometry: Rect,
    pub target_width: u16,
    pub target_height: u16,

    /// Tracked, but redraws are not skipped while the target is obscured
    pub target_is_visible: bool,
    pub source_is_mapped: bool,

    /// Always within -255..=255
    pub brightness: i32,
}

impl ProjectionState {
    pub(crate) fn new(
        source: Window,
        target: Window,
        source_info: &WindowInfo,
        target_info: &WindowInfo,
    ) -> Self {
        Self {
            source,
            target,
            root: target_info.root,
            depth: target_info.depth,
            visual: target_info.visual,
            source_geometry: Self::inner_geometry(
                source_info.x,
                source_info.y,
                source_info.width,
                source_info.height,
                source_info.border_width,
            ),
            target_width: target_info.width,
            target_height: target_info.height,
            target_is_visible: target_info.map_state == MapState::Viewable,
            source_is_mapped: source_info.map_state != MapState::Unmapped,
            brightness: 0,
        }
    }

    /// Window geometry with the border stripped off
    pub fn inner_geometry(x: i16, y: i16, width: u16, height: u16, border_width: u16) -> Rect {
        let border = border_width as i16;
        Rect::new(x.wrapping_add(border), y.wrapping_add(border), width, height)
    }

    /// Target-local area to source-local coordinates
    pub fn source_area(&self, target_area: Rect) -> Rect {
        target_area.offset(self.source_geometry.x, self.source_geometry.y)
    }

    /// Where a source-local rectangle lands in the target
    pub fn target_origin(&self, source_area: Rect) -> (i16, i16) {
        (
            source_area.x.wrapping_sub(self.source_geometry.x),
            source_area.y.wrapping_sub(self.source_geometry.y),
        )
    }

    /// The whole source
    pub fn full_area(&self) -> Rect {
        Rect::new(0, 0, self.source_geometry.width, self.source_geometry.height)
    }

    /// Which side of the projection a window is, if any
    pub fn side_of(&self, window: Window) -> Option<Side> {
        if window == NO_WINDOW {
            None
        } else if window == self.target {
            Some(Side::Target)
        } else if window == self.source {
            Some(Side::Source)
        } else {
            None
        }
    }

    pub fn involves(&self, window: Window) -> bool {
        self.side_of(window).is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

/// A live projection and every resource it owns
pub struct Projection {
    pub id: ProjectionId,
    pub state: ProjectionState,

    /// Direct-copy context for the no-effect path
    pub(crate) gc: Gcontext,

    /// Tracks when the source redraws itself
    pub(crate) damage: Damage,
    pub(crate) damage_region: Region,

    pub(crate) transfer: Box<dyn Transfer>,
}

impl std::fmt::Debug for Projection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Projection")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("transfer", &self.transfer.name())
            .finish()
    }
}
