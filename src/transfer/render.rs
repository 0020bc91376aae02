//! RENDER composition backend
//!
//! Darkening composites the source through a 1x1 repeating component-alpha
//! mask filled with the scale factor. Brightening fills the target with the
//! bias and adds the source on top.

use tracing::{debug, warn};

use crate::display::{
    Color, Display, DisplayError, PictOp, Pictformat, Picture, PictureOptions, Pixmap, Rect,
};
use crate::projection::ProjectionState;
use crate::projection::brightness::Effect;
use crate::transfer::{Transfer, TransferError};

pub const NAME: &str = "render";

pub struct RenderTransfer {
    source_picture: Picture,
    target_picture: Picture,
    mask_pixmap: Pixmap,
    mask_picture: Picture,
}

/// Resources created so far, released if setup fails halfway
#[derive(Default)]
struct Partial {
    source_picture: Option<Picture>,
    target_picture: Option<Picture>,
    mask_pixmap: Option<Pixmap>,
    mask_picture: Option<Picture>,
}

impl Partial {
    fn release(self, display: &dyn Display) {
        let pictures = [self.mask_picture, self.target_picture, self.source_picture];
        for picture in pictures.into_iter().flatten() {
            let _ = display.free_picture(picture);
        }
        if let Some(pixmap) = self.mask_pixmap {
            let _ = display.free_pixmap(pixmap);
        }
    }
}

impl RenderTransfer {
    pub fn new(display: &dyn Display, state: &ProjectionState) -> Result<Self, TransferError> {
        let window_format = display
            .visual_format(state.visual)?
            .ok_or(TransferError::MissingFormat("window visual"))?;

        // Use standard format of 8-bit RGB for the mask, must exist
        let mask_format = display
            .rgb24_format()?
            .ok_or(TransferError::MissingFormat("standard RGB24"))?;

        let mut partial = Partial::default();
        match Self::create_resources(display, state, window_format, mask_format, &mut partial) {
            Ok(transfer) => Ok(transfer),
            Err(e) => {
                partial.release(display);
                Err(e)
            }
        }
    }

    fn create_resources(
        display: &dyn Display,
        state: &ProjectionState,
        window_format: Pictformat,
        mask_format: Pictformat,
        partial: &mut Partial,
    ) -> Result<Self, TransferError> {
        // Catch picture/pixmap creation errors from here onwards. Earlier
        // errors stay queued for the dispatcher.
        if let Some(earlier) = display.sync()? {
            debug!("Error from before render setup: {}", earlier);
        }

        let window_options = PictureOptions {
            include_inferiors: true,
            ..Default::default()
        };

        let source_picture = *partial
            .source_picture
            .insert(display.create_picture(state.source, window_format, window_options)?);
        let target_picture = *partial
            .target_picture
            .insert(display.create_picture(state.target, window_format, window_options)?);

        let root_depth = display.window_info(state.root)?.depth;
        let mask_pixmap = *partial
            .mask_pixmap
            .insert(display.create_pixmap(state.root, root_depth, 1, 1)?);

        // Separate alphas per colour component
        let mask_options = PictureOptions {
            repeat: true,
            component_alpha: true,
            ..Default::default()
        };
        let mask_picture = *partial
            .mask_picture
            .insert(display.create_picture(mask_pixmap, mask_format, mask_options)?);

        if let Some(error) = display.sync()? {
            warn!("Error while setting up render projection: {}", error);
            return Err(TransferError::Rejected(error));
        }

        Ok(Self {
            source_picture,
            target_picture,
            mask_pixmap,
            mask_picture,
        })
    }
}

impl Transfer for RenderTransfer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn transfer_rectangle(
        &mut self,
        display: &dyn Display,
        state: &ProjectionState,
        rect: Rect,
    ) -> Result<(), DisplayError> {
        let (dst_x, dst_y) = state.target_origin(rect);

        match Effect::for_brightness(state.brightness) {
            Effect::Scale(factor) => {
                let pixel = Rect::new(0, 0, 1, 1);
                display.fill_rectangle(PictOp::Src, self.mask_picture, Color::grey(factor), pixel)?;

                display.composite(
                    PictOp::Src,
                    self.source_picture,
                    Some(self.mask_picture),
                    self.target_picture,
                    rect.x,
                    rect.y,
                    dst_x,
                    dst_y,
                    rect.width,
                    rect.height,
                )
            }
            Effect::Bias(bias) => {
                let target_area = Rect::new(dst_x, dst_y, rect.width, rect.height);
                let grey = Color::grey(bias);
                display.fill_rectangle(PictOp::Src, self.target_picture, grey, target_area)?;

                display.composite(
                    PictOp::Add,
                    self.source_picture,
                    None,
                    self.target_picture,
                    rect.x,
                    rect.y,
                    dst_x,
                    dst_y,
                    rect.width,
                    rect.height,
                )
            }
        }
    }

    fn destroy(self: Box<Self>, display: &dyn Display) {
        Partial {
            source_picture: Some(self.source_picture),
            target_picture: Some(self.target_picture),
            mask_pixmap: Some(self.mask_pixmap),
            mask_picture: Some(self.mask_picture),
        }
        .release(display);
    }
}
