pub mod annotation;
pub mod commands;
pub mod controller;
pub mod state;
pub mod timeline;

pub use controller::{release_stale_locks, EditorController, EditorSnapshot};
