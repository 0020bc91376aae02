//! Area Projector
//!
//! Mirrors the contents of a source window onto a target window with a
//! brightness effect, driven by a window manager through client messages and
//! a property on the target.

pub mod config;
pub mod control;
pub mod display;
mod events;
pub mod projection;
pub mod projector;
pub mod transfer;
pub mod x11;
pub mod x11_async;

#[cfg(test)]
pub mod testing;

pub use display::Display;
pub use projector::Projector;
