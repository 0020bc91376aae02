//! Client-side image backend
//!
//! Works with nothing but the core protocol: read the source pixels, transform
//! them here, write them to the target. Rectangles are moved in row batches
//! so client-side buffering stays bounded.

use tracing::{debug, trace};

use crate::display::{ByteOrder, Display, DisplayError, Gcontext, Image, Rect};
use crate::projection::ProjectionState;
use crate::projection::brightness::Effect;
use crate::transfer::{Transfer, TransferError, TransferSettings};

pub const NAME: &str = "image";

/// Room left for the PutImage request header
const REQUEST_HEADER_BYTES: usize = 64;

const BYTES_PER_PIXEL: usize = 4;

pub struct ImageTransfer {
    gc: Gcontext,
    batch_bytes: usize,
    byte_order: ByteOrder,
    /// Target extents writes are clipped to
    target_width: u16,
    target_height: u16,
}

impl ImageTransfer {
    pub fn new(
        display: &dyn Display,
        state: &ProjectionState,
        settings: &TransferSettings,
    ) -> Result<Self, TransferError> {
        // Only 8 bits per channel in 32-bit pixels is supported
        let bits_per_pixel = display.bits_per_pixel(state.depth);
        if bits_per_pixel != Some(32) || state.depth < 24 {
            return Err(TransferError::UnsupportedDepth {
                depth: state.depth,
                bits_per_pixel,
            });
        }

        let batch_bytes = settings
            .row_batch_bytes
            .min(display.max_request_bytes().saturating_sub(REQUEST_HEADER_BYTES))
            .max(BYTES_PER_PIXEL);

        let gc = display.create_copy_context(state.target)?;
        debug!(
            "0x{:08x}: image transfer with {} byte batches",
            state.target, batch_bytes
        );

        Ok(Self {
            gc,
            batch_bytes,
            byte_order: display.image_byte_order(),
            target_width: state.target_width,
            target_height: state.target_height,
        })
    }

    /// Rows per batch for a given width, at least one
    pub fn rows_per_batch(&self, width: u16) -> u16 {
        let row_bytes = (width as usize * BYTES_PER_PIXEL).max(1);
        (self.batch_bytes / row_bytes).clamp(1, u16::MAX as usize) as u16
    }

    /// The part of a rectangle that can be read from the source and lands
    /// inside the target
    fn clip(&self, state: &ProjectionState, rect: Rect) -> Option<Rect> {
        let (dst_x, dst_y) = state.target_origin(rect);
        let to_target_x = dst_x as i32 - rect.x as i32;
        let to_target_y = dst_y as i32 - rect.y as i32;

        // Source-local bounds, with the target's extents mapped back
        let left = (rect.x as i32).max(0).max(-to_target_x);
        let top = (rect.y as i32).max(0).max(-to_target_y);
        let right = (rect.x as i32 + rect.width as i32)
            .min(state.source_geometry.width as i32)
            .min(self.target_width as i32 - to_target_x);
        let bottom = (rect.y as i32 + rect.height as i32)
            .min(state.source_geometry.height as i32)
            .min(self.target_height as i32 - to_target_y);

        if right <= left || bottom <= top {
            return None;
        }

        Some(Rect::new(
            left as i16,
            top as i16,
            (right - left) as u16,
            (bottom - top) as u16,
        ))
    }
}

/// Transform every colour sample of 32-bit pixels, leaving the pad byte
pub fn apply_effect(effect: Effect, byte_order: ByteOrder, data: &mut [u8]) {
    if effect.is_identity() {
        return;
    }

    let colour = match byte_order {
        ByteOrder::LsbFirst => 0..3,
        ByteOrder::MsbFirst => 1..4,
    };
    for pixel in data.chunks_exact_mut(BYTES_PER_PIXEL) {
        for sample in &mut pixel[colour.clone()] {
            *sample = effect.apply(*sample);
        }
    }
}

impl Transfer for ImageTransfer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn transfer_rectangle(
        &mut self,
        display: &dyn Display,
        state: &ProjectionState,
        rect: Rect,
    ) -> Result<(), DisplayError> {
        let Some(rect) = self.clip(state, rect) else {
            return Ok(());
        };

        let effect = Effect::for_brightness(state.brightness);
        let max_rows = self.rows_per_batch(rect.width);

        let mut row = 0u16;
        while row < rect.height {
            let rows = max_rows.min(rect.height - row);
            let batch = Rect::new(rect.x, rect.y + row as i16, rect.width, rows);

            trace!("0x{:08x}: copying {} rows at {},{}", state.source, rows, batch.x, batch.y);

            let Image { width, height, depth, mut data } = display.get_image(state.source, batch)?;
            apply_effect(effect, self.byte_order, &mut data);

            let (dst_x, dst_y) = state.target_origin(batch);
            let image = Image { width, height, depth, data };
            display.put_image(self.gc, state.target, dst_x, dst_y, &image)?;

            row += rows;
        }

        Ok(())
    }

    fn target_resized(
        &mut self,
        _display: &dyn Display,
        state: &ProjectionState,
    ) -> Result<(), DisplayError> {
        self.target_width = state.target_width;
        self.target_height = state.target_height;
        Ok(())
    }

    fn destroy(self: Box<Self>, display: &dyn Display) {
        let _ = display.free_copy_context(self.gc);
    }
}
