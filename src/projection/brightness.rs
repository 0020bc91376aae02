//! Brightness state and the per-sample transform shared by all transfer paths.
//!
//! Negative brightness darkens multiplicatively toward black, positive
//! brightness brightens additively toward white. Colour channels are treated
//! uniformly and alpha is never touched.

use area_projector_proto::brightness_from_property;
use tracing::{debug, warn};

use crate::display::Display;
use crate::projection::ProjectionState;

/// How a single 8-bit colour sample is transformed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// `sample * factor / 255`
    Scale(u8),
    /// `min(255, sample + bias)`
    Bias(u8),
}

impl Effect {
    pub fn for_brightness(brightness: i32) -> Self {
        let b = brightness.clamp(-255, 255);
        if b < 0 {
            Self::Scale((255 + b) as u8)
        } else {
            Self::Bias(b as u8)
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Scale(255) | Self::Bias(0))
    }

    #[inline]
    pub fn apply(&self, sample: u8) -> u8 {
        match *self {
            Self::Scale(factor) => mul_div255(sample, factor),
            Self::Bias(bias) => sample.saturating_add(bias),
        }
    }
}

/// `a * b / 255`, rounded to nearest
#[inline]
pub fn mul_div255(a: u8, b: u8) -> u8 {
    let t = a as u32 * b as u32 + 128;
    ((t + (t >> 8)) >> 8) as u8
}

/// Re-read the target's brightness property.
///
/// An absent or malformed property means 0. Returns whether the stored value
/// changed, which callers use to decide on a full redraw.
pub fn refresh(display: &dyn Display, state: &mut ProjectionState) -> bool {
    let old = state.brightness;

    state.brightness = match display.read_brightness(state.target) {
        Ok(Some(raw)) => {
            let value = brightness_from_property(raw);
            debug!("0x{:08x}: brightness = {}", state.target, value);
            value
        }
        Ok(None) => {
            debug!("0x{:08x}: brightness = 0 (no property)", state.target);
            0
        }
        Err(e) => {
            warn!("0x{:08x}: failed to read brightness: {}", state.target, e);
            0
        }
    };

    old != state.brightness
}
