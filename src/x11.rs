//! X11 Display
//!
//! The `Display` implementation over an x11rb connection, plus the startup
//! work around it: extension probing, atom interning and the control window.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use area_projector_proto::ProtocolAtoms;
use tracing::{debug, info};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::protocol::composite::ConnectionExt as _;
use x11rb::protocol::damage::{self, ConnectionExt as _};
use x11rb::protocol::render::{self, ConnectionExt as _, CreatePictureAux, PictType, Repeat};
use x11rb::protocol::xfixes::ConnectionExt as _;
use x11rb::protocol::xproto::{
    AtomEnum, ChangeWindowAttributesAux, ConnectionExt as _, CreateGCAux, CreateWindowAux,
    EventMask, ImageFormat, ImageOrder, PropMode, Rectangle, SubwindowMode, Visibility,
    WindowClass,
};
use x11rb::protocol::Event;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use crate::display::{
    ByteOrder, Color, Damage, Display, DisplayError, EventInterest, Gcontext, Image, MapState,
    Notification, PictOp, Pictformat, Picture, PictureOptions, Pixmap, ProtocolError, Rect, Region,
    Visualid, Window, WindowInfo,
};

/// Versions of the extensions in use
#[derive(Debug, Clone, Copy)]
pub struct Extensions {
    pub composite: (u32, u32),
    pub damage: (u32, u32),
    pub xfixes: (u32, u32),
    /// Optional, enables the composition backend
    pub render: Option<(u32, u32)>,
}

/// Picture formats, looked up once at startup
#[derive(Debug, Default)]
struct PictFormats {
    by_visual: HashMap<Visualid, Pictformat>,
    rgb24: Option<Pictformat>,
}

pub struct X11Display {
    conn: Arc<RustConnection>,
    root: Window,
    extensions: Extensions,
    atoms: ProtocolAtoms,
    pict_formats: PictFormats,
    /// Notifications read while waiting in `sync()`
    backlog: RefCell<VecDeque<Event>>,
}

impl X11Display {
    /// Open the display and check it has everything projection needs
    pub fn connect(name: Option<&str>) -> Result<Self> {
        let (conn, _screen_num) =
            RustConnection::connect(name).context("Failed to connect to X server")?;
        let conn = Arc::new(conn);
        let root = conn.setup().roots[0].root;

        let extensions = Self::detect_extensions(&conn)?;
        info!(
            "X11 Extensions: composite={}.{}, damage={}.{}, xfixes={}.{}, render={}",
            extensions.composite.0,
            extensions.composite.1,
            extensions.damage.0,
            extensions.damage.1,
            extensions.xfixes.0,
            extensions.xfixes.1,
            extensions
                .render
                .map(|(major, minor)| format!("{}.{}", major, minor))
                .unwrap_or_else(|| "no".to_string()),
        );

        let atoms = intern_atoms(conn.as_ref())?;
        debug!("Protocol atoms: {:?}", atoms);

        let pict_formats = if extensions.render.is_some() {
            Self::query_pict_formats(&conn)?
        } else {
            PictFormats::default()
        };

        Ok(Self {
            conn,
            root,
            extensions,
            atoms,
            pict_formats,
            backlog: RefCell::new(VecDeque::new()),
        })
    }

    fn detect_extensions(conn: &RustConnection) -> Result<Extensions> {
        let present = |name: &[u8]| -> Result<bool> {
            Ok(conn.query_extension(name)?.reply()?.present)
        };

        if !present(b"XFIXES")? {
            bail!("No XFIXES extension");
        }
        let reply = conn.xfixes_query_version(5, 0)?.reply()?;
        let xfixes = (reply.major_version, reply.minor_version);

        if !present(b"Composite")? {
            bail!("No Composite extension");
        }
        let reply = conn.composite_query_version(0, 4)?.reply()?;
        let composite = (reply.major_version, reply.minor_version);

        if !present(b"DAMAGE")? {
            bail!("No DAMAGE extension");
        }
        let reply = conn.damage_query_version(1, 1)?.reply()?;
        let damage = (reply.major_version, reply.minor_version);

        let render = if present(b"RENDER")? {
            let reply = conn.render_query_version(0, 11)?.reply()?;
            Some((reply.major_version, reply.minor_version))
        } else {
            None
        };

        Ok(Extensions {
            composite,
            damage,
            xfixes,
            render,
        })
    }

    fn query_pict_formats(conn: &RustConnection) -> Result<PictFormats> {
        let reply = conn
            .render_query_pict_formats()?
            .reply()
            .context("Failed to query picture formats")?;

        let by_visual = reply
            .screens
            .iter()
            .flat_map(|screen| &screen.depths)
            .flat_map(|depth| &depth.visuals)
            .map(|v| (v.visual, v.format))
            .collect();

        // Standard RGB24: 8 bits per channel, no alpha
        let rgb24 = reply
            .formats
            .iter()
            .find(|f| {
                f.type_ == PictType::DIRECT
                    && f.depth == 24
                    && f.direct.red_shift == 16
                    && f.direct.red_mask == 0xff
                    && f.direct.green_shift == 8
                    && f.direct.green_mask == 0xff
                    && f.direct.blue_shift == 0
                    && f.direct.blue_mask == 0xff
                    && f.direct.alpha_mask == 0
            })
            .map(|f| f.id);

        Ok(PictFormats { by_visual, rgb24 })
    }

    pub fn connection(&self) -> Arc<RustConnection> {
        self.conn.clone()
    }

    pub fn atoms(&self) -> ProtocolAtoms {
        self.atoms
    }

    pub fn extensions(&self) -> Extensions {
        self.extensions
    }

    /// Create the control window and advertise it on the root window
    pub fn publish_control_window(&self) -> Result<Window> {
        let window = self.conn.generate_id()?;
        self.conn.create_window(
            0,
            window,
            self.root,
            -1,
            -1,
            1,
            1,
            0,
            WindowClass::INPUT_ONLY,
            0,
            &CreateWindowAux::new(),
        )?;
        self.conn.change_property32(
            PropMode::REPLACE,
            self.root,
            self.atoms.control_window,
            AtomEnum::WINDOW,
            &[window],
        )?;
        self.conn.flush()?;

        info!("Control window 0x{:08x}", window);
        Ok(window)
    }

    /// Undo `publish_control_window`
    pub fn remove_control_window(&self, window: Window) -> Result<()> {
        self.conn.delete_property(self.root, self.atoms.control_window)?;
        self.conn.destroy_window(window)?;
        self.conn.flush()?;
        debug!("Removed control window 0x{:08x}", window);
        Ok(())
    }

    pub fn flush(&self) -> Result<(), DisplayError> {
        self.conn.flush()?;
        Ok(())
    }
}

/// Intern the control protocol atoms
pub fn intern_atoms<C: Connection>(conn: &C) -> Result<ProtocolAtoms> {
    let mut values = [0; 4];
    for (value, name) in values.iter_mut().zip(ProtocolAtoms::NAMES) {
        *value = conn
            .intern_atom(false, name.as_bytes())?
            .reply()
            .with_context(|| format!("Failed to intern {}", name))?
            .atom;
    }
    Ok(ProtocolAtoms::from_interned(values))
}

/// Classify an x11rb event for the dispatcher
fn translate(event: Event) -> Notification {
    match event {
        Event::ClientMessage(e) => Notification::ClientMessage {
            window: e.window,
            message_type: e.type_,
            format: e.format,
            data: e.data.as_data32(),
        },
        Event::Expose(e) => Notification::Expose {
            window: e.window,
            area: Rect::new(e.x as i16, e.y as i16, e.width, e.height),
        },
        Event::ConfigureNotify(e) => Notification::Configure {
            window: e.window,
            x: e.x,
            y: e.y,
            width: e.width,
            height: e.height,
            border_width: e.border_width,
        },
        Event::DestroyNotify(e) => Notification::Destroy { window: e.window },
        Event::MapNotify(e) => Notification::Map { window: e.window },
        Event::UnmapNotify(e) => Notification::Unmap { window: e.window },
        Event::PropertyNotify(e) => Notification::Property {
            window: e.window,
            atom: e.atom,
        },
        Event::VisibilityNotify(e) => Notification::Visibility {
            window: e.window,
            fully_obscured: e.state == Visibility::FULLY_OBSCURED,
        },
        Event::DamageNotify(e) => Notification::Damage { drawable: e.drawable },
        Event::Error(e) => Notification::Error(ProtocolError::from(&e)),
        _ => Notification::Other,
    }
}

fn event_mask(interest: EventInterest) -> EventMask {
    let mut mask = EventMask::NO_EVENT;
    if interest.contains(EventInterest::STRUCTURE) {
        mask = mask | EventMask::STRUCTURE_NOTIFY;
    }
    if interest.contains(EventInterest::EXPOSURE) {
        mask = mask | EventMask::EXPOSURE;
    }
    if interest.contains(EventInterest::VISIBILITY) {
        mask = mask | EventMask::VISIBILITY_CHANGE;
    }
    if interest.contains(EventInterest::PROPERTY) {
        mask = mask | EventMask::PROPERTY_CHANGE;
    }
    mask
}

fn pict_op(op: PictOp) -> render::PictOp {
    match op {
        PictOp::Src => render::PictOp::SRC,
        PictOp::Add => render::PictOp::ADD,
    }
}

impl Display for X11Display {
    fn window_info(&self, window: Window) -> Result<WindowInfo, DisplayError> {
        let attributes = self.conn.get_window_attributes(window)?;
        let geometry = self.conn.get_geometry(window)?;
        let attributes = attributes.reply()?;
        let geometry = geometry.reply()?;

        let map_state = match attributes.map_state {
            x11rb::protocol::xproto::MapState::VIEWABLE => MapState::Viewable,
            x11rb::protocol::xproto::MapState::UNVIEWABLE => MapState::Unviewable,
            _ => MapState::Unmapped,
        };

        Ok(WindowInfo {
            root: geometry.root,
            depth: geometry.depth,
            visual: attributes.visual,
            map_state,
            x: geometry.x,
            y: geometry.y,
            width: geometry.width,
            height: geometry.height,
            border_width: geometry.border_width,
        })
    }

    fn select_input(&self, window: Window, interest: EventInterest) -> Result<(), DisplayError> {
        self.conn.change_window_attributes(
            window,
            &ChangeWindowAttributesAux::new().event_mask(event_mask(interest)),
        )?;
        Ok(())
    }

    fn read_brightness(&self, window: Window) -> Result<Option<u32>, DisplayError> {
        let reply = self
            .conn
            .get_property(false, window, self.atoms.brightness, AtomEnum::INTEGER, 0, 1)?
            .reply()?;

        if reply.type_ != u32::from(AtomEnum::INTEGER)
            || reply.format != 32
            || reply.value_len != 1
        {
            return Ok(None);
        }
        Ok(reply.value32().and_then(|mut values| values.next()))
    }

    fn create_copy_context(&self, drawable: Window) -> Result<Gcontext, DisplayError> {
        let gc = self.conn.generate_id()?;
        self.conn.create_gc(
            gc,
            drawable,
            &CreateGCAux::new()
                .subwindow_mode(SubwindowMode::INCLUDE_INFERIORS)
                .graphics_exposures(0u32),
        )?;
        Ok(gc)
    }

    fn free_copy_context(&self, gc: Gcontext) -> Result<(), DisplayError> {
        self.conn.free_gc(gc)?;
        Ok(())
    }

    fn copy_area(
        &self,
        gc: Gcontext,
        source: Window,
        target: Window,
        area: Rect,
        dst_x: i16,
        dst_y: i16,
    ) -> Result<(), DisplayError> {
        self.conn
            .copy_area(source, target, gc, area.x, area.y, dst_x, dst_y, area.width, area.height)?;
        Ok(())
    }

    fn create_damage(&self, window: Window) -> Result<Damage, DisplayError> {
        let damage = self.conn.generate_id()?;
        self.conn
            .damage_create(damage, window, damage::ReportLevel::NON_EMPTY)?;
        Ok(damage)
    }

    fn destroy_damage(&self, damage: Damage) -> Result<(), DisplayError> {
        self.conn.damage_destroy(damage)?;
        Ok(())
    }

    fn subtract_damage(&self, damage: Damage, region: Region) -> Result<(), DisplayError> {
        self.conn.damage_subtract(damage, x11rb::NONE, region)?;
        Ok(())
    }

    fn create_region(&self) -> Result<Region, DisplayError> {
        let region = self.conn.generate_id()?;
        self.conn.xfixes_create_region(region, &[])?;
        Ok(region)
    }

    fn destroy_region(&self, region: Region) -> Result<(), DisplayError> {
        self.conn.xfixes_destroy_region(region)?;
        Ok(())
    }

    fn fetch_region(&self, region: Region) -> Result<Vec<Rect>, DisplayError> {
        let reply = self.conn.xfixes_fetch_region(region)?.reply()?;
        Ok(reply.rectangles.into_iter().map(Rect::from).collect())
    }

    fn bits_per_pixel(&self, depth: u8) -> Option<u8> {
        self.conn
            .setup()
            .pixmap_formats
            .iter()
            .find(|f| f.depth == depth)
            .map(|f| f.bits_per_pixel)
    }

    fn max_request_bytes(&self) -> usize {
        self.conn.maximum_request_bytes()
    }

    fn image_byte_order(&self) -> ByteOrder {
        if self.conn.setup().image_byte_order == ImageOrder::MSB_FIRST {
            ByteOrder::MsbFirst
        } else {
            ByteOrder::LsbFirst
        }
    }

    fn get_image(&self, window: Window, area: Rect) -> Result<Image, DisplayError> {
        let reply = self
            .conn
            .get_image(ImageFormat::Z_PIXMAP, window, area.x, area.y, area.width, area.height, !0)?
            .reply()?;

        Ok(Image {
            width: area.width,
            height: area.height,
            depth: reply.depth,
            data: reply.data,
        })
    }

    fn put_image(
        &self,
        gc: Gcontext,
        window: Window,
        dst_x: i16,
        dst_y: i16,
        image: &Image,
    ) -> Result<(), DisplayError> {
        self.conn.put_image(
            ImageFormat::Z_PIXMAP,
            window,
            gc,
            image.width,
            image.height,
            dst_x,
            dst_y,
            0,
            image.depth,
            &image.data,
        )?;
        Ok(())
    }

    fn has_render(&self) -> bool {
        self.extensions.render.is_some()
    }

    fn visual_format(&self, visual: Visualid) -> Result<Option<Pictformat>, DisplayError> {
        Ok(self.pict_formats.by_visual.get(&visual).copied())
    }

    fn rgb24_format(&self) -> Result<Option<Pictformat>, DisplayError> {
        Ok(self.pict_formats.rgb24)
    }

    fn create_pixmap(
        &self,
        drawable: Window,
        depth: u8,
        width: u16,
        height: u16,
    ) -> Result<Pixmap, DisplayError> {
        let pixmap = self.conn.generate_id()?;
        self.conn.create_pixmap(depth, pixmap, drawable, width, height)?;
        Ok(pixmap)
    }

    fn free_pixmap(&self, pixmap: Pixmap) -> Result<(), DisplayError> {
        self.conn.free_pixmap(pixmap)?;
        Ok(())
    }

    fn create_picture(
        &self,
        drawable: u32,
        format: Pictformat,
        options: PictureOptions,
    ) -> Result<Picture, DisplayError> {
        let mut aux = CreatePictureAux::new();
        if options.include_inferiors {
            aux = aux.subwindowmode(SubwindowMode::INCLUDE_INFERIORS);
        }
        if options.repeat {
            aux = aux.repeat(Repeat::NORMAL);
        }
        if options.component_alpha {
            aux = aux.componentalpha(1u32);
        }

        let picture = self.conn.generate_id()?;
        self.conn.render_create_picture(picture, drawable, format, &aux)?;
        Ok(picture)
    }

    fn free_picture(&self, picture: Picture) -> Result<(), DisplayError> {
        self.conn.render_free_picture(picture)?;
        Ok(())
    }

    fn fill_rectangle(
        &self,
        op: PictOp,
        picture: Picture,
        color: Color,
        area: Rect,
    ) -> Result<(), DisplayError> {
        let color = render::Color {
            red: color.red,
            green: color.green,
            blue: color.blue,
            alpha: color.alpha,
        };
        self.conn
            .render_fill_rectangles(pict_op(op), picture, color, &[Rectangle::from(area)])?;
        Ok(())
    }

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
    ) -> Result<(), DisplayError> {
        self.conn.render_composite(
            pict_op(op),
            source,
            mask.unwrap_or(x11rb::NONE),
            target,
            src_x,
            src_y,
            0,
            0,
            dst_x,
            dst_y,
            width,
            height,
        )?;
        Ok(())
    }

    fn sync(&self) -> Result<Option<ProtocolError>, DisplayError> {
        // Any reply forces the server through every earlier request
        self.conn.get_input_focus()?.reply()?;

        let mut latest = None;
        while let Some(event) = self.conn.poll_for_event()? {
            match event {
                Event::Error(e) => {
                    debug!("Error at sync point: {:?}", e.error_kind);
                    latest = Some(ProtocolError::from(&e));
                    self.backlog.borrow_mut().push_back(Event::Error(e));
                }
                other => self.backlog.borrow_mut().push_back(other),
            }
        }
        Ok(latest)
    }

    fn poll_notification(&self) -> Result<Option<Notification>, DisplayError> {
        if let Some(event) = self.backlog.borrow_mut().pop_front() {
            return Ok(Some(translate(event)));
        }
        Ok(self.conn.poll_for_event()?.map(translate))
    }
}
