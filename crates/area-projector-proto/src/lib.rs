//! Area Projector Protocol
//!
//! Shared definitions for the control protocol between a window manager and
//! `area-projector`. The window manager finds the projector's control window
//! through a root window property, sends it ENABLE/DISABLE client messages and
//! controls the effect through a property on the target window.

use thiserror::Error;

// ============================================================================
// Atom names
// ============================================================================

/// Root window property holding the id of the projector's control window.
/// Type: WINDOW, format 32, one item.
pub const CONTROL_WINDOW: &str = "_PLCM_CONTROL_WINDOW";

/// ClientMessage type requesting a new projection.
/// Data (format 32): source window, target window.
///
/// The source window must already be redirected in manual update mode by
/// the sender.
pub const ENABLE: &str = "_PLCM_ENABLE";

/// ClientMessage type requesting teardown of a projection.
/// Data (format 32): source window, target window.
pub const DISABLE: &str = "_PLCM_DISABLE";

/// Property on the target window controlling the brightness.
/// Type: INTEGER, format 32, one item. -255 is black, +255 is white.
pub const BRIGHTNESS: &str = "_PLCM_BRIGHTNESS";

pub const BRIGHTNESS_MIN: i32 = -255;
pub const BRIGHTNESS_MAX: i32 = 255;

/// Protocol errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtoError {
    #[error("brightness {0} out of range (-255..=255)")]
    BrightnessOutOfRange(i64),

    #[error("unknown control messages cannot be encoded")]
    NotEncodable,
}

/// Interned values of the protocol atoms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolAtoms {
    pub control_window: u32,
    pub enable: u32,
    pub disable: u32,
    pub brightness: u32,
}

impl ProtocolAtoms {
    /// Atom names in the order `from_interned` expects them
    pub const NAMES: [&'static str; 4] = [CONTROL_WINDOW, ENABLE, DISABLE, BRIGHTNESS];

    pub fn from_interned(values: [u32; 4]) -> Self {
        let [control_window, enable, disable, brightness] = values;
        Self {
            control_window,
            enable,
            disable,
            brightness,
        }
    }
}

// ============================================================================
// WM → Projector messages
// ============================================================================

/// A decoded control message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Start projecting `source` onto `target`
    Enable { source: u32, target: u32 },

    /// Stop projecting `source` onto `target`
    Disable { source: u32, target: u32 },

    /// Some other message type, or the right type in the wrong format
    Unknown { message_type: u32, format: u8 },
}

impl ControlMessage {
    /// Classify a ClientMessage by its type atom and data format
    pub fn decode(atoms: &ProtocolAtoms, message_type: u32, format: u8, data: [u32; 5]) -> Self {
        if format != 32 {
            return Self::Unknown { message_type, format };
        }

        let [source, target, ..] = data;

        if message_type == atoms.enable {
            Self::Enable { source, target }
        } else if message_type == atoms.disable {
            Self::Disable { source, target }
        } else {
            Self::Unknown { message_type, format }
        }
    }

    /// Message type atom and 32-bit data for sending this message
    pub fn encode(&self, atoms: &ProtocolAtoms) -> Result<(u32, [u32; 5]), ProtoError> {
        match *self {
            Self::Enable { source, target } => Ok((atoms.enable, [source, target, 0, 0, 0])),
            Self::Disable { source, target } => Ok((atoms.disable, [source, target, 0, 0, 0])),
            Self::Unknown { .. } => Err(ProtoError::NotEncodable),
        }
    }
}

// ============================================================================
// Brightness property
// ============================================================================

/// Clamp any brightness value into the supported range
pub fn clamp_brightness(value: i64) -> i32 {
    value.clamp(BRIGHTNESS_MIN as i64, BRIGHTNESS_MAX as i64) as i32
}

/// Reject brightness values outside the supported range
pub fn validate_brightness(value: i64) -> Result<i32, ProtoError> {
    if (BRIGHTNESS_MIN as i64..=BRIGHTNESS_MAX as i64).contains(&value) {
        Ok(value as i32)
    } else {
        Err(ProtoError::BrightnessOutOfRange(value))
    }
}

/// Apply a relative change, saturating at the range limits
pub fn change_brightness(current: i32, delta: i32) -> i32 {
    clamp_brightness(current as i64 + delta as i64)
}

/// The 32-bit item stored in the property for a signed value
pub fn brightness_to_property(value: i32) -> u32 {
    value as u32
}

/// Interpret a raw 32-bit property item, clamping out-of-range values
pub fn brightness_from_property(raw: u32) -> i32 {
    clamp_brightness(raw as i32 as i64)
}
