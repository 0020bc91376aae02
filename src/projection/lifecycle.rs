//! Projection lifecycle: creation, validation and teardown.
//!
//! The lifecycle is the only writer to the registry. Creation either
//! registers a fully set up projection or releases everything it acquired.

use tracing::{debug, info, warn};

use crate::display::{Damage, Display, EventInterest, Gcontext, Region, Window, NO_WINDOW};
use crate::projection::redraw::redraw_all;
use crate::projection::{brightness, Projection, ProjectionError, ProjectionId, ProjectionState};
use crate::projector::Projector;

/// Resources acquired while a projection is being set up
#[derive(Default)]
struct Acquired {
    subscribed: bool,
    gc: Option<Gcontext>,
    damage: Option<Damage>,
    damage_region: Option<Region>,
}

impl Acquired {
    fn release(self, display: &dyn Display, state: &ProjectionState) {
        if self.subscribed {
            unsubscribe(display, state);
        }
        if let Some(damage) = self.damage {
            let _ = display.destroy_damage(damage);
        }
        if let Some(region) = self.damage_region {
            let _ = display.destroy_region(region);
        }
        if let Some(gc) = self.gc {
            let _ = display.free_copy_context(gc);
        }
    }
}

/// Stop listening on both windows, skipping any side already gone
fn unsubscribe(display: &dyn Display, state: &ProjectionState) {
    for window in [state.target, state.source] {
        if window != NO_WINDOW {
            let _ = display.select_input(window, EventInterest::empty());
        }
    }
}

/// Release every resource a projection owns
fn release(display: &dyn Display, projection: Projection) {
    let Projection {
        state,
        gc,
        damage,
        damage_region,
        transfer,
        ..
    } = projection;

    unsubscribe(display, &state);
    let _ = display.destroy_damage(damage);
    let _ = display.destroy_region(damage_region);
    let _ = display.free_copy_context(gc);
    transfer.destroy(display);
}

impl<D: Display> Projector<D> {
    /// Start projecting `source` onto `target`
    pub fn create(
        &mut self,
        source: Window,
        target: Window,
    ) -> Result<ProjectionId, ProjectionError> {
        if source == target {
            return Err(ProjectionError::SameWindow(source));
        }

        if let Some(existing) = self.registry.collision(source, target) {
            return Err(ProjectionError::AlreadyProjected {
                source_window: source,
                target_window: target,
                existing_source: existing.state.source,
                existing_target: existing.state.target,
            });
        }

        let display: &dyn Display = &self.display;

        let source_info = display
            .window_info(source)
            .map_err(|error| ProjectionError::AttributeQueryFailed {
                role: "source",
                window: source,
                error,
            })?;
        let target_info = display
            .window_info(target)
            .map_err(|error| ProjectionError::AttributeQueryFailed {
                role: "target",
                window: target,
                error,
            })?;

        if source_info.root != target_info.root {
            return Err(ProjectionError::IncompatibleWindows("screens"));
        }
        if source_info.depth != target_info.depth {
            return Err(ProjectionError::IncompatibleWindows("depths"));
        }
        if source_info.visual != target_info.visual {
            return Err(ProjectionError::IncompatibleWindows("visuals"));
        }

        let mut state = ProjectionState::new(source, target, &source_info, &target_info);
        let mut acquired = Acquired::default();

        let (gc, damage, damage_region) = match self.acquire(&mut state, &mut acquired) {
            Ok(resources) => resources,
            Err(e) => {
                acquired.release(&self.display, &state);
                return Err(e);
            }
        };

        // Backend last, it gets the seeded brightness
        let transfer = match self
            .transfer_kind
            .create(&self.display, &state, &self.transfer_settings)
        {
            Ok(transfer) => transfer,
            Err(e) => {
                acquired.release(&self.display, &state);
                return Err(ProjectionError::BackendCreationFailed(e));
            }
        };

        let mut projection = Projection {
            id: self.allocate_id(),
            state,
            gc,
            damage,
            damage_region,
            transfer,
        };

        if let Err(e) = redraw_all(&self.display, &mut projection) {
            warn!("0x{:08x}: initial redraw failed: {}", source, e);
            release(&self.display, projection);
            return Err(ProjectionError::Resource(e));
        }

        info!(
            "Projecting 0x{:08x} onto 0x{:08x} ({} backend, brightness {})",
            source,
            target,
            projection.transfer.name(),
            projection.state.brightness
        );

        let id = projection.id;
        self.registry.insert(projection);
        Ok(id)
    }

    /// Subscriptions, copy context, brightness and damage tracking
    fn acquire(
        &self,
        state: &mut ProjectionState,
        acquired: &mut Acquired,
    ) -> Result<(Gcontext, Damage, Region), ProjectionError> {
        let display: &dyn Display = &self.display;

        acquired.subscribed = true;
        display.select_input(state.target, EventInterest::target())?;
        display.select_input(state.source, EventInterest::source())?;

        let gc = *acquired.gc.insert(display.create_copy_context(state.target)?);

        brightness::refresh(display, state);

        let damage = *acquired.damage.insert(display.create_damage(state.source)?);
        let damage_region = *acquired.damage_region.insert(display.create_region()?);

        Ok((gc, damage, damage_region))
    }

    /// Tear a projection down and drop it from the registry.
    ///
    /// A side whose window id was cleared to `NO_WINDOW` is left alone.
    pub fn destroy(&mut self, id: ProjectionId) {
        let projection = self.registry.remove(id);

        debug!(
            "Tearing down projection 0x{:08x} -> 0x{:08x}",
            projection.state.source, projection.state.target
        );
        info!("Projection {:?} destroyed", id);

        release(&self.display, projection);
    }
}
