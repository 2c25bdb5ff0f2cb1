//! Core context and lifecycle

pub mod state;

pub use state::AppState;
