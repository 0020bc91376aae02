//! Control client
//!
//! The window manager side of the protocol: find the running helper and ask
//! it to start or stop projections, or set a target's brightness.

use anyhow::{Context, Result};
use area_projector_proto::{
    brightness_to_property, validate_brightness, ControlMessage, ProtocolAtoms,
};
use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    AtomEnum, ClientMessageEvent, ConnectionExt as _, EventMask, PropMode, Window,
};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;

use crate::x11::intern_atoms;

pub struct ControlClient {
    conn: RustConnection,
    root: Window,
    atoms: ProtocolAtoms,
}

impl ControlClient {
    pub fn connect(display: Option<&str>) -> Result<Self> {
        let (conn, _) = RustConnection::connect(display).context("Failed to connect to X server")?;
        let root = conn.setup().roots[0].root;
        let atoms = intern_atoms(&conn)?;

        Ok(Self { conn, root, atoms })
    }

    /// The helper's control window, if one is published
    pub fn discover(&self) -> Result<Option<Window>> {
        let reply = self
            .conn
            .get_property(false, self.root, self.atoms.control_window, AtomEnum::WINDOW, 0, 1)?
            .reply()
            .context("Failed to read control window property")?;

        if reply.type_ != u32::from(AtomEnum::WINDOW)
            || reply.format != 32
            || reply.value_len != 1
        {
            return Ok(None);
        }

        Ok(reply
            .value32()
            .and_then(|mut values| values.next())
            .filter(|&window| window != x11rb::NONE))
    }

    pub fn enable(&self, source: Window, target: Window) -> Result<()> {
        self.send(ControlMessage::Enable { source, target })
    }

    pub fn disable(&self, source: Window, target: Window) -> Result<()> {
        self.send(ControlMessage::Disable { source, target })
    }

    fn send(&self, message: ControlMessage) -> Result<()> {
        let window = self
            .discover()?
            .context("No projection helper is running (control window not published)")?;

        let (message_type, data) = message.encode(&self.atoms)?;
        let event = ClientMessageEvent::new(32, window, message_type, data);
        self.conn.send_event(false, window, EventMask::NO_EVENT, event)?;
        self.conn.flush()?;

        debug!("Sent {:?} to 0x{:08x}", message, window);
        Ok(())
    }

    /// Set the brightness of a projection target. Zero removes the property.
    pub fn set_brightness(&self, target: Window, value: i64) -> Result<()> {
        let value = validate_brightness(value)?;

        if value == 0 {
            self.conn.delete_property(target, self.atoms.brightness)?;
        } else {
            self.conn.change_property32(
                PropMode::REPLACE,
                target,
                self.atoms.brightness,
                AtomEnum::INTEGER,
                &[brightness_to_property(value)],
            )?;
        }
        self.conn.flush()?;

        info!("Brightness of 0x{:08x} set to {}", target, value);
        Ok(())
    }
}

/// Parse a window id given in decimal or `0x` hexadecimal
pub fn parse_window_id(text: &str) -> Result<Window, String> {
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse(),
    };
    parsed.map_err(|e| format!("invalid window id {:?}: {}", text, e))
}
