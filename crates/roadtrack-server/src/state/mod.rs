//! Shared application state.

pub mod store;

pub use store::AppState;
