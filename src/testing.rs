//! In-memory windowing system for tests
//!
//! Records every request and keeps a pixel buffer per window and pixmap, so
//! the projection engine and both backends can be checked end to end.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};

use area_projector_proto::ProtocolAtoms;

use crate::display::{
    ByteOrder, Color, Damage, Display, DisplayError, EventInterest, Gcontext, Image, MapState,
    Notification, PictOp, Pictformat, Picture, PictureOptions, Pixmap, ProtocolError, Rect, Region,
    Visualid, Window, WindowInfo,
};
use crate::projection::ProjectionState;
use crate::projection::brightness::mul_div255;
use crate::projector::Projector;
use crate::transfer::{TransferKind, TransferSettings};

pub const ROOT: Window = 1;
pub const VISUAL: Visualid = 0x21;
const WINDOW_FORMAT: Pictformat = 0x40;
const RGB24_FORMAT: Pictformat = 0x41;

/// A request seen by the fake server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    WindowInfo(Window),
    SelectInput { window: Window, interest: EventInterest },
    ReadBrightness(Window),
    CreateGc(Window),
    FreeGc(Gcontext),
    CopyArea { source: Window, target: Window, area: Rect, dst_x: i16, dst_y: i16 },
    CreateDamage(Window),
    DestroyDamage(Damage),
    SubtractDamage(Damage),
    CreateRegion,
    DestroyRegion(Region),
    FetchRegion(Region),
    GetImage { window: Window, area: Rect },
    PutImage { window: Window, dst_x: i16, dst_y: i16, width: u16, height: u16 },
    CreatePixmap { drawable: Window },
    FreePixmap(Pixmap),
    CreatePicture { drawable: u32 },
    FreePicture(Picture),
    FillRectangle { picture: Picture, area: Rect },
    Composite { op: PictOp, source: Picture, target: Picture },
    Sync,
}

impl Call {
    /// The window this request addresses, if it addresses one
    pub fn window(&self) -> Option<Window> {
        match *self {
            Self::WindowInfo(w)
            | Self::ReadBrightness(w)
            | Self::CreateGc(w)
            | Self::CreateDamage(w)
            | Self::SelectInput { window: w, .. }
            | Self::GetImage { window: w, .. }
            | Self::PutImage { window: w, .. }
            | Self::CreatePixmap { drawable: w } => Some(w),
            _ => None,
        }
    }

    pub fn touches(&self, window: Window) -> bool {
        match *self {
            Self::CopyArea { source, target, .. } => source == window || target == window,
            Self::CreatePicture { drawable } => drawable == window,
            _ => self.window() == Some(window),
        }
    }
}

struct Surface {
    width: u16,
    height: u16,
    pixels: Vec<[u8; 4]>,
}

impl Surface {
    fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            pixels: vec![[0; 4]; width as usize * height as usize],
        }
    }

    fn contains(&self, area: Rect) -> bool {
        area.x >= 0
            && area.y >= 0
            && area.x as i32 + area.width as i32 <= self.width as i32
            && area.y as i32 + area.height as i32 <= self.height as i32
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            None
        } else {
            Some(y as usize * self.width as usize + x as usize)
        }
    }

    fn get(&self, x: i32, y: i32) -> [u8; 4] {
        self.index(x, y).map(|i| self.pixels[i]).unwrap_or([0; 4])
    }

    fn set(&mut self, x: i32, y: i32, pixel: [u8; 4]) {
        if let Some(i) = self.index(x, y) {
            self.pixels[i] = pixel;
        }
    }
}

struct FakeWindow {
    info: WindowInfo,
    brightness: Option<u32>,
    interest: EventInterest,
}

struct FakePicture {
    drawable: u32,
    repeat: bool,
}

struct FakeState {
    windows: HashMap<Window, FakeWindow>,
    surfaces: HashMap<u32, Surface>,
    pictures: HashMap<Picture, FakePicture>,
    pixmaps: HashSet<Pixmap>,
    gcs: HashSet<Gcontext>,
    damages: HashMap<Damage, (Window, Vec<Rect>)>,
    regions: HashMap<Region, Vec<Rect>>,
    next_id: u32,
    calls: Vec<Call>,
    pending_errors: Vec<ProtocolError>,
    queued: VecDeque<Notification>,
    reject_next_picture: bool,
    render: bool,
    visual_formats: bool,
    bits_per_pixel: u8,
    max_request_bytes: usize,
    byte_order: ByteOrder,
}

impl FakeState {
    fn allocate(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn error(&mut self, kind: &str, request: &str, resource: u32) {
        self.pending_errors.push(protocol_error(kind, request, resource));
    }
}

fn protocol_error(kind: &str, request: &str, resource: u32) -> ProtocolError {
    ProtocolError {
        code: 3,
        kind: kind.to_string(),
        request: request.to_string(),
        major_opcode: 0,
        minor_opcode: 0,
        resource,
    }
}

fn to_bytes(color: Color) -> [u8; 4] {
    [
        (color.blue >> 8) as u8,
        (color.green >> 8) as u8,
        (color.red >> 8) as u8,
        (color.alpha >> 8) as u8,
    ]
}

pub struct FakeDisplay {
    state: RefCell<FakeState>,
}

impl FakeDisplay {
    pub fn new() -> Self {
        let display = Self {
            state: RefCell::new(FakeState {
                windows: HashMap::new(),
                surfaces: HashMap::new(),
                pictures: HashMap::new(),
                pixmaps: HashSet::new(),
                gcs: HashSet::new(),
                damages: HashMap::new(),
                regions: HashMap::new(),
                next_id: 0x0100_0000,
                calls: Vec::new(),
                pending_errors: Vec::new(),
                queued: VecDeque::new(),
                reject_next_picture: false,
                render: true,
                visual_formats: true,
                bits_per_pixel: 32,
                max_request_bytes: 16 * 1024 * 1024,
                byte_order: ByteOrder::LsbFirst,
            }),
        };
        display.add_window(ROOT, Self::window_info(0, 0, 640, 480));
        display
    }

    /// A viewable, borderless window on the default root and visual
    pub fn window_info(x: i16, y: i16, width: u16, height: u16) -> WindowInfo {
        WindowInfo {
            root: ROOT,
            depth: 24,
            visual: VISUAL,
            map_state: MapState::Viewable,
            x,
            y,
            width,
            height,
            border_width: 0,
        }
    }

    pub fn add_window(&self, window: Window, info: WindowInfo) {
        let mut state = self.state.borrow_mut();
        state.surfaces.insert(window, Surface::new(info.width, info.height));
        state.windows.insert(
            window,
            FakeWindow {
                info,
                brightness: None,
                interest: EventInterest::empty(),
            },
        );
    }

    /// The window disappears from the server
    pub fn destroy_window(&self, window: Window) {
        let mut state = self.state.borrow_mut();
        state.windows.remove(&window);
        state.surfaces.remove(&window);
    }

    pub fn set_brightness(&self, window: Window, value: Option<u32>) {
        if let Some(w) = self.state.borrow_mut().windows.get_mut(&window) {
            w.brightness = value;
        }
    }

    pub fn interest(&self, window: Window) -> Option<EventInterest> {
        self.state.borrow().windows.get(&window).map(|w| w.interest)
    }

    /// Report damage on every damage object watching `window`
    pub fn add_damage(&self, window: Window, rect: Rect) {
        for (watched, rects) in self.state.borrow_mut().damages.values_mut() {
            if *watched == window {
                rects.push(rect);
            }
        }
    }

    pub fn fill_window(&self, window: Window, pixel: [u8; 4]) {
        if let Some(surface) = self.state.borrow_mut().surfaces.get_mut(&window) {
            surface.pixels.fill(pixel);
        }
    }

    pub fn set_pixel(&self, window: Window, x: i32, y: i32, pixel: [u8; 4]) {
        if let Some(surface) = self.state.borrow_mut().surfaces.get_mut(&window) {
            surface.set(x, y, pixel);
        }
    }

    pub fn pixel(&self, window: Window, x: i32, y: i32) -> [u8; 4] {
        self.state
            .borrow()
            .surfaces
            .get(&window)
            .map(|s| s.get(x, y))
            .unwrap_or([0; 4])
    }

    /// All pixels of a window
    pub fn snapshot(&self, window: Window) -> Vec<[u8; 4]> {
        self.state
            .borrow()
            .surfaces
            .get(&window)
            .map(|s| s.pixels.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn count_calls(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    /// Server-side resources created and not yet released
    pub fn live_resources(&self) -> usize {
        let state = self.state.borrow();
        state.gcs.len()
            + state.damages.len()
            + state.regions.len()
            + state.pictures.len()
            + state.pixmaps.len()
    }

    pub fn set_render_available(&self, available: bool) {
        self.state.borrow_mut().render = available;
    }

    pub fn set_visual_formats(&self, available: bool) {
        self.state.borrow_mut().visual_formats = available;
    }

    pub fn set_bits_per_pixel(&self, bits: u8) {
        self.state.borrow_mut().bits_per_pixel = bits;
    }

    pub fn set_max_request_bytes(&self, bytes: usize) {
        self.state.borrow_mut().max_request_bytes = bytes;
    }

    pub fn set_byte_order(&self, order: ByteOrder) {
        self.state.borrow_mut().byte_order = order;
    }

    /// An asynchronous error from some earlier request, reported at the next sync
    pub fn raise_error(&self, kind: &str, request: &str, resource: u32) {
        self.state.borrow_mut().error(kind, request, resource);
    }

    /// Deliver a notification through `poll_notification`
    pub fn queue(&self, notification: Notification) {
        self.state.borrow_mut().queued.push_back(notification);
    }

    /// The next picture creation fails asynchronously
    pub fn reject_next_picture(&self) {
        self.state.borrow_mut().reject_next_picture = true;
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }
}

impl Default for FakeDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for FakeDisplay {
    fn window_info(&self, window: Window) -> Result<WindowInfo, DisplayError> {
        self.record(Call::WindowInfo(window));
        self.state
            .borrow()
            .windows
            .get(&window)
            .map(|w| w.info)
            .ok_or_else(|| {
                DisplayError::Protocol(protocol_error("Window", "GetWindowAttributes", window))
            })
    }

    fn select_input(&self, window: Window, interest: EventInterest) -> Result<(), DisplayError> {
        self.record(Call::SelectInput { window, interest });
        let mut state = self.state.borrow_mut();
        match state.windows.get_mut(&window) {
            Some(w) => w.interest = interest,
            None => state.error("Window", "ChangeWindowAttributes", window),
        }
        Ok(())
    }

    fn read_brightness(&self, window: Window) -> Result<Option<u32>, DisplayError> {
        self.record(Call::ReadBrightness(window));
        self.state
            .borrow()
            .windows
            .get(&window)
            .map(|w| w.brightness)
            .ok_or_else(|| DisplayError::Protocol(protocol_error("Window", "GetProperty", window)))
    }

    fn create_copy_context(&self, drawable: Window) -> Result<Gcontext, DisplayError> {
        self.record(Call::CreateGc(drawable));
        let mut state = self.state.borrow_mut();
        let gc = state.allocate();
        state.gcs.insert(gc);
        Ok(gc)
    }

    fn free_copy_context(&self, gc: Gcontext) -> Result<(), DisplayError> {
        self.record(Call::FreeGc(gc));
        self.state.borrow_mut().gcs.remove(&gc);
        Ok(())
    }

    fn copy_area(
        &self,
        _gc: Gcontext,
        source: Window,
        target: Window,
        area: Rect,
        dst_x: i16,
        dst_y: i16,
    ) -> Result<(), DisplayError> {
        self.record(Call::CopyArea {
            source,
            target,
            area,
            dst_x,
            dst_y,
        });

        let mut state = self.state.borrow_mut();
        let Some(src) = state.surfaces.get(&source) else {
            state.error("Drawable", "CopyArea", source);
            return Ok(());
        };

        let mut copied = Vec::with_capacity(area.width as usize * area.height as usize);
        for j in 0..area.height as i32 {
            for i in 0..area.width as i32 {
                copied.push((i, j, src.get(area.x as i32 + i, area.y as i32 + j)));
            }
        }

        match state.surfaces.get_mut(&target) {
            Some(dst) => {
                for (i, j, pixel) in copied {
                    dst.set(dst_x as i32 + i, dst_y as i32 + j, pixel);
                }
            }
            None => state.error("Drawable", "CopyArea", target),
        }
        Ok(())
    }

    fn create_damage(&self, window: Window) -> Result<Damage, DisplayError> {
        self.record(Call::CreateDamage(window));
        let mut state = self.state.borrow_mut();
        let damage = state.allocate();
        state.damages.insert(damage, (window, Vec::new()));
        Ok(damage)
    }

    fn destroy_damage(&self, damage: Damage) -> Result<(), DisplayError> {
        self.record(Call::DestroyDamage(damage));
        self.state.borrow_mut().damages.remove(&damage);
        Ok(())
    }

    fn subtract_damage(&self, damage: Damage, region: Region) -> Result<(), DisplayError> {
        self.record(Call::SubtractDamage(damage));
        let mut state = self.state.borrow_mut();
        let rects = state
            .damages
            .get_mut(&damage)
            .map(|(_, rects)| std::mem::take(rects))
            .unwrap_or_default();
        state.regions.insert(region, rects);
        Ok(())
    }

    fn create_region(&self) -> Result<Region, DisplayError> {
        self.record(Call::CreateRegion);
        let mut state = self.state.borrow_mut();
        let region = state.allocate();
        state.regions.insert(region, Vec::new());
        Ok(region)
    }

    fn destroy_region(&self, region: Region) -> Result<(), DisplayError> {
        self.record(Call::DestroyRegion(region));
        self.state.borrow_mut().regions.remove(&region);
        Ok(())
    }

    fn fetch_region(&self, region: Region) -> Result<Vec<Rect>, DisplayError> {
        self.record(Call::FetchRegion(region));
        Ok(self.state.borrow().regions.get(&region).cloned().unwrap_or_default())
    }

    fn bits_per_pixel(&self, _depth: u8) -> Option<u8> {
        Some(self.state.borrow().bits_per_pixel)
    }

    fn max_request_bytes(&self) -> usize {
        self.state.borrow().max_request_bytes
    }

    fn get_image(&self, window: Window, area: Rect) -> Result<Image, DisplayError> {
        self.record(Call::GetImage { window, area });
        let state = self.state.borrow();
        let surface = state
            .surfaces
            .get(&window)
            .ok_or_else(|| DisplayError::Protocol(protocol_error("Drawable", "GetImage", window)))?;
        if !surface.contains(area) {
            return Err(DisplayError::Protocol(protocol_error("Match", "GetImage", window)));
        }

        let mut data = Vec::with_capacity(area.width as usize * area.height as usize * 4);
        for j in 0..area.height as i32 {
            for i in 0..area.width as i32 {
                data.extend_from_slice(&surface.get(area.x as i32 + i, area.y as i32 + j));
            }
        }

        Ok(Image {
            width: area.width,
            height: area.height,
            depth: 24,
            data,
        })
    }

    fn put_image(
        &self,
        _gc: Gcontext,
        window: Window,
        dst_x: i16,
        dst_y: i16,
        image: &Image,
    ) -> Result<(), DisplayError> {
        self.record(Call::PutImage {
            window,
            dst_x,
            dst_y,
            width: image.width,
            height: image.height,
        });

        let mut state = self.state.borrow_mut();
        match state.surfaces.get_mut(&window) {
            Some(surface) => {
                for (n, chunk) in image.data.chunks_exact(4).enumerate() {
                    let i = (n % image.width as usize) as i32;
                    let j = (n / image.width as usize) as i32;
                    let pixel = [chunk[0], chunk[1], chunk[2], chunk[3]];
                    surface.set(dst_x as i32 + i, dst_y as i32 + j, pixel);
                }
            }
            None => state.error("Drawable", "PutImage", window),
        }
        Ok(())
    }

    fn has_render(&self) -> bool {
        self.state.borrow().render
    }

    fn visual_format(&self, visual: Visualid) -> Result<Option<Pictformat>, DisplayError> {
        let state = self.state.borrow();
        Ok((state.visual_formats && visual == VISUAL).then_some(WINDOW_FORMAT))
    }

    fn rgb24_format(&self) -> Result<Option<Pictformat>, DisplayError> {
        Ok(Some(RGB24_FORMAT))
    }

    fn create_pixmap(
        &self,
        drawable: Window,
        _depth: u8,
        width: u16,
        height: u16,
    ) -> Result<Pixmap, DisplayError> {
        self.record(Call::CreatePixmap { drawable });
        let mut state = self.state.borrow_mut();
        let pixmap = state.allocate();
        state.pixmaps.insert(pixmap);
        state.surfaces.insert(pixmap, Surface::new(width, height));
        Ok(pixmap)
    }

    fn free_pixmap(&self, pixmap: Pixmap) -> Result<(), DisplayError> {
        self.record(Call::FreePixmap(pixmap));
        let mut state = self.state.borrow_mut();
        state.pixmaps.remove(&pixmap);
        state.surfaces.remove(&pixmap);
        Ok(())
    }

    fn create_picture(
        &self,
        drawable: u32,
        _format: Pictformat,
        options: PictureOptions,
    ) -> Result<Picture, DisplayError> {
        self.record(Call::CreatePicture { drawable });
        let mut state = self.state.borrow_mut();
        let picture = state.allocate();

        if std::mem::take(&mut state.reject_next_picture) {
            state.error("Match", "RenderCreatePicture", drawable);
        } else {
            state.pictures.insert(
                picture,
                FakePicture {
                    drawable,
                    repeat: options.repeat,
                },
            );
        }
        Ok(picture)
    }

    fn free_picture(&self, picture: Picture) -> Result<(), DisplayError> {
        self.record(Call::FreePicture(picture));
        let mut state = self.state.borrow_mut();
        if state.pictures.remove(&picture).is_none() {
            state.error("Picture", "RenderFreePicture", picture);
        }
        Ok(())
    }

    fn fill_rectangle(
        &self,
        _op: PictOp,
        picture: Picture,
        color: Color,
        area: Rect,
    ) -> Result<(), DisplayError> {
        self.record(Call::FillRectangle { picture, area });
        let mut state = self.state.borrow_mut();
        let Some(drawable) = state.pictures.get(&picture).map(|p| p.drawable) else {
            state.error("Picture", "RenderFillRectangles", picture);
            return Ok(());
        };

        if let Some(surface) = state.surfaces.get_mut(&drawable) {
            let bytes = to_bytes(color);
            for j in 0..area.height as i32 {
                for i in 0..area.width as i32 {
                    surface.set(area.x as i32 + i, area.y as i32 + j, bytes);
                }
            }
        }
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
        self.record(Call::Composite { op, source, target });
        let mut state = self.state.borrow_mut();

        let lookup = |p: Picture| state.pictures.get(&p).map(|p| (p.drawable, p.repeat));
        let (src, dst, mask) = (lookup(source), lookup(target), mask.and_then(lookup));
        let (Some((src_drawable, _)), Some((dst_drawable, _))) = (src, dst) else {
            state.error("Picture", "RenderComposite", source);
            return Ok(());
        };

        let mut result = Vec::with_capacity(width as usize * height as usize);
        {
            let Some(src) = state.surfaces.get(&src_drawable) else {
                return Ok(());
            };
            let Some(dst) = state.surfaces.get(&dst_drawable) else {
                return Ok(());
            };
            let mask_surface =
                mask.and_then(|(d, repeat)| state.surfaces.get(&d).map(|s| (s, repeat)));

            for j in 0..height as i32 {
                for i in 0..width as i32 {
                    let s = src.get(src_x as i32 + i, src_y as i32 + j);
                    let d = dst.get(dst_x as i32 + i, dst_y as i32 + j);

                    let pixel = match op {
                        PictOp::Src => match mask_surface {
                            Some((m, repeat)) => {
                                let m = if repeat {
                                    m.get(i % m.width as i32, j % m.height as i32)
                                } else {
                                    m.get(i, j)
                                };
                                std::array::from_fn(|k| mul_div255(s[k], m[k]))
                            }
                            None => s,
                        },
                        PictOp::Add => std::array::from_fn(|k| d[k].saturating_add(s[k])),
                    };
                    result.push((i, j, pixel));
                }
            }
        }

        if let Some(dst) = state.surfaces.get_mut(&dst_drawable) {
            for (i, j, pixel) in result {
                dst.set(dst_x as i32 + i, dst_y as i32 + j, pixel);
            }
        }
        Ok(())
    }

    fn image_byte_order(&self) -> ByteOrder {
        self.state.borrow().byte_order
    }

    fn sync(&self) -> Result<Option<ProtocolError>, DisplayError> {
        self.record(Call::Sync);
        let mut state = self.state.borrow_mut();
        let errors = std::mem::take(&mut state.pending_errors);
        let latest = errors.last().cloned();
        state.queued.extend(errors.into_iter().map(Notification::Error));
        Ok(latest)
    }

    fn poll_notification(&self) -> Result<Option<Notification>, DisplayError> {
        Ok(self.state.borrow_mut().queued.pop_front())
    }
}

/// A compatible source/target pair installed on a fake display
pub struct ProjectionFixture {
    pub state: ProjectionState,
}

impl ProjectionFixture {
    pub const SOURCE: Window = 0x0020_0001;
    pub const TARGET: Window = 0x0030_0001;

    pub fn install(display: &FakeDisplay) -> Self {
        let info = FakeDisplay::window_info(0, 0, 32, 16);
        display.add_window(Self::SOURCE, info);
        display.add_window(Self::TARGET, info);

        Self {
            state: ProjectionState::new(Self::SOURCE, Self::TARGET, &info, &info),
        }
    }
}

pub const CONTROL_WINDOW: Window = 0x0010_0001;

pub fn atoms() -> ProtocolAtoms {
    ProtocolAtoms::from_interned([0x101, 0x102, 0x103, 0x104])
}

/// An engine over a fresh fake display, using the composition backend
pub fn projector() -> Projector<FakeDisplay> {
    projector_with(TransferKind::Render)
}

pub fn projector_with(kind: TransferKind) -> Projector<FakeDisplay> {
    let display = FakeDisplay::new();
    display.add_window(CONTROL_WINDOW, FakeDisplay::window_info(-1, -1, 1, 1));
    Projector::new(display, atoms(), CONTROL_WINDOW, kind, TransferSettings::default())
}
