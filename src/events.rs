//! Event dispatcher
//!
//! Classifies each notification and routes it to the lifecycle or the redraw
//! pipeline. Handlers run to completion before the next notification.

use area_projector_proto::ControlMessage;
use tracing::{debug, info, warn};

use crate::display::{Display, DisplayError, Rect, Window, NO_WINDOW};
use crate::projection::redraw::{redraw_all, redraw_rectangle, redraw_region, target_resized};
use crate::projection::{brightness, ProjectionState, Side};
use crate::projector::Projector;

/// Keep going on request failures, stop when the connection is gone
fn tolerate(
    result: Result<(), DisplayError>,
    window: Window,
    what: &str,
) -> Result<(), DisplayError> {
    match result {
        Err(e @ DisplayError::Connection(_)) => Err(e),
        Err(e) => {
            warn!("0x{:08x}: {} failed: {}", window, what, e);
            Ok(())
        }
        Ok(()) => Ok(()),
    }
}

impl<D: Display> Projector<D> {
    /// Dispatch every notification that can be read without blocking
    pub fn dispatch_pending(&mut self) -> Result<usize, DisplayError> {
        let mut handled = 0;
        while let Some(notification) = self.display.poll_notification()? {
            self.dispatch(notification)?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Handle one notification.
    ///
    /// Only a lost connection is returned as an error; everything else is
    /// logged and the notification dropped.
    pub fn dispatch(
        &mut self,
        notification: crate::display::Notification,
    ) -> Result<(), DisplayError> {
        use crate::display::Notification::*;

        match notification {
            ClientMessage {
                window,
                message_type,
                format,
                data,
            } => {
                self.handle_message(window, message_type, format, data);
                Ok(())
            }
            Expose { window, area } => self.handle_expose(window, area),
            Configure {
                window,
                x,
                y,
                width,
                height,
                border_width,
            } => self.handle_configure(window, x, y, width, height, border_width),
            Destroy { window } => {
                self.handle_destroy(window);
                Ok(())
            }
            Map { window } => {
                self.set_shown(window, true);
                Ok(())
            }
            Unmap { window } => {
                self.set_shown(window, false);
                Ok(())
            }
            Property { window, atom } => self.handle_property(window, atom),
            Visibility { window, fully_obscured } => {
                if let Some(proj) = self.registry.find_by_target_mut(window) {
                    proj.state.target_is_visible = !fully_obscured;
                    debug!("0x{:08x}: is visible: {}", window, proj.state.target_is_visible);
                }
                Ok(())
            }
            Damage { drawable } => self.handle_damage(drawable),
            Error(error) => {
                warn!("X error: {}", error);
                self.last_error = Some(error);
                Ok(())
            }
            Other => Ok(()),
        }
    }

    fn handle_message(&mut self, window: Window, message_type: u32, format: u8, data: [u32; 5]) {
        if window != self.control_window {
            info!("Received message for unexpected window 0x{:08x}", window);
            return;
        }

        match ControlMessage::decode(&self.atoms, message_type, format, data) {
            ControlMessage::Enable { source, target } => {
                info!("Received ENABLE for 0x{:08x} -> 0x{:08x}", source, target);
                if let Err(e) = self.create(source, target) {
                    warn!("Projection not enabled: {}", e);
                }
            }
            ControlMessage::Disable { source, target } => {
                info!("Received DISABLE for 0x{:08x} -> 0x{:08x}", source, target);
                let id = self
                    .registry
                    .find_by_source(source)
                    .filter(|proj| proj.state.target == target)
                    .map(|proj| proj.id);
                match id {
                    Some(id) => self.destroy(id),
                    None => info!("DISABLE for unknown projection, ignoring"),
                }
            }
            ControlMessage::Unknown { message_type, format } => {
                info!("Unknown message: {} (format {})", message_type, format);
            }
        }
    }

    fn handle_expose(&mut self, window: Window, area: Rect) -> Result<(), DisplayError> {
        let Some(proj) = self.registry.find_by_target_mut(window) else {
            return Ok(());
        };

        let rect = proj.state.source_area(area);
        tolerate(redraw_rectangle(&self.display, proj, rect), window, "expose redraw")
    }

    fn handle_configure(
        &mut self,
        window: Window,
        x: i16,
        y: i16,
        width: u16,
        height: u16,
        border_width: u16,
    ) -> Result<(), DisplayError> {
        let Some(proj) = self.registry.find_by_either_mut(window) else {
            return Ok(());
        };

        // Redraws wait for the exposures and damage that follow
        match proj.state.side_of(window) {
            Some(Side::Target) => tolerate(
                target_resized(&self.display, proj, width, height),
                window,
                "target resize",
            ),
            Some(Side::Source) => {
                proj.state.source_geometry =
                    ProjectionState::inner_geometry(x, y, width, height, border_width);
                debug!("0x{:08x}: source geometry now {:?}", window, proj.state.source_geometry);
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn handle_destroy(&mut self, window: Window) {
        let Some(proj) = self.registry.find_by_either_mut(window) else {
            return;
        };

        info!("0x{:08x}: destroyed, taking down projection", window);

        // The window is gone, teardown must not touch it
        match proj.state.side_of(window) {
            Some(Side::Target) => proj.state.target = NO_WINDOW,
            Some(Side::Source) => proj.state.source = NO_WINDOW,
            None => {}
        }

        let id = proj.id;
        self.destroy(id);
    }

    fn set_shown(&mut self, window: Window, shown: bool) {
        let Some(proj) = self.registry.find_by_either_mut(window) else {
            return;
        };

        info!("0x{:08x}: {}", window, if shown { "mapped" } else { "unmapped" });

        match proj.state.side_of(window) {
            Some(Side::Target) => proj.state.target_is_visible = shown,
            Some(Side::Source) => proj.state.source_is_mapped = shown,
            None => {}
        }
    }

    fn handle_property(&mut self, window: Window, atom: u32) -> Result<(), DisplayError> {
        if atom != self.atoms.brightness {
            return Ok(());
        }
        let Some(proj) = self.registry.find_by_target_mut(window) else {
            return Ok(());
        };

        if brightness::refresh(&self.display, &mut proj.state) {
            tolerate(redraw_all(&self.display, proj), window, "brightness redraw")?;
        }
        Ok(())
    }

    fn handle_damage(&mut self, drawable: Window) -> Result<(), DisplayError> {
        let Some(proj) = self.registry.find_by_source_mut(drawable) else {
            return Ok(());
        };

        tolerate(redraw_region(&self.display, proj), drawable, "damage redraw")
    }
}
