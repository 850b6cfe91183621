//! Report module - machine-readable progress and result events

pub mod events;

pub use events::*;
