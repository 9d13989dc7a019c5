//! Session state owned by the interactive layer
//!
//! Holds at most one live pipeline per direction and maps user intents onto
//! pipeline starts and stops.

mod commands;
mod controller;

pub use commands::{AppState, Toggle};
