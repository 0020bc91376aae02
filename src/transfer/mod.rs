//! Transfer Module
//!
//! Pixel transfer backends. A backend copies source pixels to the target
//! while applying the projection's brightness. One backend kind is chosen at
//! startup and every projection gets its own instance of it.

pub mod image;
pub mod render;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::display::{Display, DisplayError, ProtocolError, Rect};
use crate::projection::ProjectionState;

/// A per-projection pixel transfer backend
pub trait Transfer {
    fn name(&self) -> &'static str;

    /// Copy a source-local rectangle to the target, applying the brightness
    fn transfer_rectangle(
        &mut self,
        display: &dyn Display,
        state: &ProjectionState,
        rect: Rect,
    ) -> Result<(), DisplayError>;

    /// React to a target size change
    fn target_resized(
        &mut self,
        _display: &dyn Display,
        _state: &ProjectionState,
    ) -> Result<(), DisplayError> {
        Ok(())
    }

    /// Release every resource the backend holds
    fn destroy(self: Box<Self>, display: &dyn Display);
}

/// Backend creation errors
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("no usable transfer backend: {0}")]
    NoBackend(&'static str),

    #[error("could not find picture format for {0}")]
    MissingFormat(&'static str),

    #[error("unsupported image format for depth {depth} ({bits_per_pixel:?} bits per pixel)")]
    UnsupportedDepth { depth: u8, bits_per_pixel: Option<u8> },

    #[error("error while setting up backend resources: {0}")]
    Rejected(ProtocolError),

    #[error(transparent)]
    Display(#[from] DisplayError),
}

/// Which backend the user asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// Most capable backend available
    #[default]
    Auto,
    /// RENDER composition
    Render,
    /// Client-side image copy
    Image,
}

/// Backend kinds, most capable first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Render,
    Image,
}

/// Settings shared by all backend instances
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    /// Upper bound on client-side buffering per image batch
    pub row_batch_bytes: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            row_batch_bytes: 0x80000,
        }
    }
}

impl TransferKind {
    /// Pick the backend kind for this process
    pub fn select(
        preference: BackendPreference,
        display: &dyn Display,
    ) -> Result<Self, TransferError> {
        let kind = match preference {
            BackendPreference::Auto if display.has_render() => Self::Render,
            BackendPreference::Auto => Self::Image,
            BackendPreference::Render if display.has_render() => Self::Render,
            BackendPreference::Render => {
                return Err(TransferError::NoBackend("RENDER extension not available"))
            }
            BackendPreference::Image => Self::Image,
        };

        info!("Using {} transfer backend", kind.name());
        Ok(kind)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Render => render::NAME,
            Self::Image => image::NAME,
        }
    }

    /// Create a backend instance for a projection
    pub fn create(
        &self,
        display: &dyn Display,
        state: &ProjectionState,
        settings: &TransferSettings,
    ) -> Result<Box<dyn Transfer>, TransferError> {
        Ok(match self {
            Self::Render => Box::new(render::RenderTransfer::new(display, state)?),
            Self::Image => Box::new(image::ImageTransfer::new(display, state, settings)?),
        })
    }
}
