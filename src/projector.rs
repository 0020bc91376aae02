//! Engine context
//!
//! Everything the dispatcher and the lifecycle share: the display, the
//! interned protocol atoms, the control window, the projection registry and
//! the backend kind chosen at startup.

use area_projector_proto::ProtocolAtoms;
use tracing::info;

use crate::display::{Display, ProtocolError, Window};
use crate::projection::registry::Registry;
use crate::projection::ProjectionId;
use crate::transfer::{TransferKind, TransferSettings};

pub struct Projector<D: Display> {
    pub(crate) display: D,
    pub(crate) atoms: ProtocolAtoms,
    pub(crate) control_window: Window,
    pub(crate) registry: Registry,
    pub(crate) transfer_kind: TransferKind,
    pub(crate) transfer_settings: TransferSettings,
    /// Most recent asynchronous protocol error
    pub(crate) last_error: Option<ProtocolError>,
    next_id: u64,
}

impl<D: Display> Projector<D> {
    pub fn new(
        display: D,
        atoms: ProtocolAtoms,
        control_window: Window,
        transfer_kind: TransferKind,
        transfer_settings: TransferSettings,
    ) -> Self {
        Self {
            display,
            atoms,
            control_window,
            registry: Registry::new(),
            transfer_kind,
            transfer_settings,
            last_error: None,
            next_id: 1,
        }
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn atoms(&self) -> &ProtocolAtoms {
        &self.atoms
    }

    pub fn control_window(&self) -> Window {
        self.control_window
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn transfer_kind(&self) -> TransferKind {
        self.transfer_kind
    }

    pub fn last_error(&self) -> Option<&ProtocolError> {
        self.last_error.as_ref()
    }

    pub(crate) fn allocate_id(&mut self) -> ProjectionId {
        let id = ProjectionId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Tear down every live projection
    pub fn shutdown(&mut self) -> usize {
        let ids = self.registry.ids();
        for &id in &ids {
            self.destroy(id);
        }

        if !ids.is_empty() {
            info!("Destroyed {} projections on shutdown", ids.len());
        }
        ids.len()
    }

    pub fn into_display(self) -> D {
        self.display
    }
}
