//! Redraw pipeline: damage and exposure to pixel transfers.

use tracing::{debug, trace};

use crate::display::{Display, DisplayError, Rect};
use crate::projection::Projection;

/// Draw a source-local rectangle onto the target.
///
/// With no effect active the pixels are copied directly, otherwise the
/// transfer backend applies the brightness while copying.
pub fn redraw_rectangle(
    display: &dyn Display,
    proj: &mut Projection,
    rect: Rect,
) -> Result<(), DisplayError> {
    if rect.is_empty() {
        return Ok(());
    }

    trace!(
        "0x{:08x}: drawing {},{} {}x{}",
        proj.state.source, rect.x, rect.y, rect.width, rect.height
    );

    if proj.state.brightness == 0 {
        let (dst_x, dst_y) = proj.state.target_origin(rect);
        display.copy_area(proj.gc, proj.state.source, proj.state.target, rect, dst_x, dst_y)
    } else {
        proj.transfer.transfer_rectangle(display, &proj.state, rect)
    }
}

/// Drain the accumulated damage and redraw every rectangle in it
pub fn redraw_region(display: &dyn Display, proj: &mut Projection) -> Result<(), DisplayError> {
    display.subtract_damage(proj.damage, proj.damage_region)?;

    let rects = display.fetch_region(proj.damage_region)?;
    debug!("0x{:08x}: redrawing {} damaged rectangles", proj.state.source, rects.len());

    for rect in rects {
        redraw_rectangle(display, proj, rect)?;
    }

    Ok(())
}

/// Redraw the whole source
pub fn redraw_all(display: &dyn Display, proj: &mut Projection) -> Result<(), DisplayError> {
    let area = proj.state.full_area();
    redraw_rectangle(display, proj, area)
}

/// Record the new target size and let the backend react. Does not redraw:
/// the server follows up with exposures.
pub fn target_resized(
    display: &dyn Display,
    proj: &mut Projection,
    width: u16,
    height: u16,
) -> Result<(), DisplayError> {
    proj.state.target_width = width;
    proj.state.target_height = height;

    proj.transfer.target_resized(display, &proj.state)
}
