//! Display Module
//!
//! The windowing-system seam. Everything the projection engine and the
//! transfer backends need from the X server goes through the [`Display`]
//! trait, so the engine can run against a real connection (`x11::X11Display`)
//! or an in-memory fake in tests.

use bitflags::bitflags;
use thiserror::Error;
use x11rb::errors::{ConnectionError, ReplyError, ReplyOrIdError};
use x11rb::protocol::xproto::Rectangle;
use x11rb::x11_utils::X11Error;

pub use x11rb::protocol::render::Pictformat;
pub use x11rb::protocol::xproto::{Atom, Gcontext, Pixmap, Visualid, Window};
pub use x11rb::protocol::damage::Damage;
pub use x11rb::protocol::render::Picture;
pub use x11rb::protocol::xfixes::Region;

/// The "none" window id. A projection side cleared to this value belongs to
/// a window that no longer exists.
pub const NO_WINDOW: Window = x11rb::NONE;

/// Rectangle in window-local coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub fn new(x: i16, y: i16, width: u16, height: u16) -> Self {
        Self { x, y, width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Same size, moved by (dx, dy)
    pub fn offset(&self, dx: i16, dy: i16) -> Self {
        Self {
            x: self.x.wrapping_add(dx),
            y: self.y.wrapping_add(dy),
            ..*self
        }
    }
}

impl From<Rectangle> for Rect {
    fn from(r: Rectangle) -> Self {
        Self::new(r.x, r.y, r.width, r.height)
    }
}

impl From<Rect> for Rectangle {
    fn from(r: Rect) -> Self {
        Rectangle {
            x: r.x,
            y: r.y,
            width: r.width,
            height: r.height,
        }
    }
}

/// Window map state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapState {
    Unmapped,
    Unviewable,
    Viewable,
}

/// Window attributes and geometry, as one query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowInfo {
    pub root: Window,
    pub depth: u8,
    pub visual: Visualid,
    pub map_state: MapState,
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
    pub border_width: u16,
}

bitflags! {
    /// Notifications a window is subscribed to
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EventInterest: u32 {
        const STRUCTURE = 1 << 0;
        const EXPOSURE = 1 << 1;
        const VISIBILITY = 1 << 2;
        const PROPERTY = 1 << 3;
    }
}

impl EventInterest {
    /// Everything a target window needs to drive redraws
    pub fn target() -> Self {
        Self::STRUCTURE | Self::EXPOSURE | Self::VISIBILITY | Self::PROPERTY
    }

    /// Sources only report resize, map state and destruction
    pub fn source() -> Self {
        Self::STRUCTURE
    }
}

/// Compositing operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictOp {
    Src,
    Add,
}

/// 16-bit per channel colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
    pub alpha: u16,
}

impl Color {
    /// Opaque grey with every colour channel set to `level` expanded to 16 bits
    pub fn grey(level: u8) -> Self {
        let v = ((level as u16) << 8) | level as u16;
        Self {
            red: v,
            green: v,
            blue: v,
            alpha: 0xffff,
        }
    }
}

/// Picture creation options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PictureOptions {
    pub include_inferiors: bool,
    pub repeat: bool,
    pub component_alpha: bool,
}

/// Byte order of Z-format image data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LsbFirst,
    MsbFirst,
}

/// Z-format pixel data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub width: u16,
    pub height: u16,
    pub depth: u8,
    pub data: Vec<u8>,
}

/// An asynchronous protocol error reported by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    pub code: u8,
    pub kind: String,
    pub request: String,
    pub major_opcode: u8,
    pub minor_opcode: u16,
    pub resource: u32,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} for request {} ({} minor {}) resource 0x{:08x}",
            self.kind, self.request, self.major_opcode, self.minor_opcode, self.resource
        )
    }
}

impl From<&X11Error> for ProtocolError {
    fn from(e: &X11Error) -> Self {
        Self {
            code: e.error_code,
            kind: format!("{:?}", e.error_kind),
            request: e
                .request_name
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{}", e.major_opcode)),
            major_opcode: e.major_opcode,
            minor_opcode: e.minor_opcode,
            resource: e.bad_value,
        }
    }
}

/// Windowing-system failures
#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("X11 connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("X11 protocol error: {0}")]
    Protocol(ProtocolError),

    #[error("X11 ran out of resource ids")]
    IdsExhausted,
}

impl From<ReplyError> for DisplayError {
    fn from(e: ReplyError) -> Self {
        match e {
            ReplyError::ConnectionError(e) => Self::Connection(e),
            ReplyError::X11Error(e) => Self::Protocol(ProtocolError::from(&e)),
        }
    }
}

impl From<ReplyOrIdError> for DisplayError {
    fn from(e: ReplyOrIdError) -> Self {
        match e {
            ReplyOrIdError::ConnectionError(e) => Self::Connection(e),
            ReplyOrIdError::X11Error(e) => Self::Protocol(ProtocolError::from(&e)),
            ReplyOrIdError::IdsExhausted => Self::IdsExhausted,
        }
    }
}

/// A windowing-system notification, classified for the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    ClientMessage {
        window: Window,
        message_type: Atom,
        format: u8,
        data: [u32; 5],
    },
    Expose {
        window: Window,
        area: Rect,
    },
    Configure {
        window: Window,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
        border_width: u16,
    },
    Destroy {
        window: Window,
    },
    Map {
        window: Window,
    },
    Unmap {
        window: Window,
    },
    Property {
        window: Window,
        atom: Atom,
    },
    Visibility {
        window: Window,
        fully_obscured: bool,
    },
    Damage {
        drawable: Window,
    },
    Error(ProtocolError),
    Other,
}

/// The windowing-system operations used by the projection engine
///
/// Drawing requests are fire-and-forget: their protocol errors arrive later
/// as [`Notification::Error`]. Callers that must know whether a batch of
/// requests succeeded call [`Display::sync`] before and after the batch.
pub trait Display {
    /// Attributes and geometry of a window
    fn window_info(&self, window: Window) -> Result<WindowInfo, DisplayError>;

    /// Replace the set of notifications selected on a window
    fn select_input(&self, window: Window, interest: EventInterest) -> Result<(), DisplayError>;

    /// Raw brightness property item of a window, `None` when the property
    /// is absent or not a single 32-bit INTEGER
    fn read_brightness(&self, window: Window) -> Result<Option<u32>, DisplayError>;

    /// Plain graphics context including inferiors, for direct pixel copies
    fn create_copy_context(&self, drawable: Window) -> Result<Gcontext, DisplayError>;
    fn free_copy_context(&self, gc: Gcontext) -> Result<(), DisplayError>;
    fn copy_area(
        &self,
        gc: Gcontext,
        source: Window,
        target: Window,
        area: Rect,
        dst_x: i16,
        dst_y: i16,
    ) -> Result<(), DisplayError>;

    /// Damage accumulator reporting only "non-empty"
    fn create_damage(&self, window: Window) -> Result<Damage, DisplayError>;
    fn destroy_damage(&self, damage: Damage) -> Result<(), DisplayError>;
    /// Move all accumulated damage into `region`
    fn subtract_damage(&self, damage: Damage, region: Region) -> Result<(), DisplayError>;

    fn create_region(&self) -> Result<Region, DisplayError>;
    fn destroy_region(&self, region: Region) -> Result<(), DisplayError>;
    /// Disjoint rectangles making up a region
    fn fetch_region(&self, region: Region) -> Result<Vec<Rect>, DisplayError>;

    /// Bits per pixel of the Z-format images for a depth
    fn bits_per_pixel(&self, depth: u8) -> Option<u8>;
    /// Largest request the server accepts
    fn max_request_bytes(&self) -> usize;
    /// Byte order the server uses for image data
    fn image_byte_order(&self) -> ByteOrder;
    fn get_image(&self, window: Window, area: Rect) -> Result<Image, DisplayError>;
    fn put_image(
        &self,
        gc: Gcontext,
        window: Window,
        dst_x: i16,
        dst_y: i16,
        image: &Image,
    ) -> Result<(), DisplayError>;

    /// Whether the RENDER extension can be used
    fn has_render(&self) -> bool;
    fn visual_format(&self, visual: Visualid) -> Result<Option<Pictformat>, DisplayError>;
    /// The standard 24-bit RGB format
    fn rgb24_format(&self) -> Result<Option<Pictformat>, DisplayError>;
    fn create_pixmap(
        &self,
        drawable: Window,
        depth: u8,
        width: u16,
        height: u16,
    ) -> Result<Pixmap, DisplayError>;
    fn free_pixmap(&self, pixmap: Pixmap) -> Result<(), DisplayError>;
    fn create_picture(
        &self,
        drawable: u32,
        format: Pictformat,
        options: PictureOptions,
    ) -> Result<Picture, DisplayError>;
    fn free_picture(&self, picture: Picture) -> Result<(), DisplayError>;
    fn fill_rectangle(
        &self,
        op: PictOp,
        picture: Picture,
        color: Color,
        area: Rect,
    ) -> Result<(), DisplayError>;
    #[allow(clippy::too_many_arguments)]
    fn composite(
        &self,
        op: PictOp,
        source: Picture,
        mask: Option<Picture>,
        target: Picture,
        src_x: i16,
        src_y: i16,
        dst_x: i16,
        dst_y: i16,
        width: u16,
        height: u16,
    ) -> Result<(), DisplayError>;

    /// Round trip to the server. Returns the most recent protocol error
    /// caused by requests issued since the previous checkpoint. Every error
    /// seen is also queued for [`Display::poll_notification`].
    fn sync(&self) -> Result<Option<ProtocolError>, DisplayError>;

    /// Next queued or already received notification, without blocking
    fn poll_notification(&self) -> Result<Option<Notification>, DisplayError>;
}
