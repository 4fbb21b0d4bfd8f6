//! Shared types for the stagecraft engine: actor ids, transforms, render settings.
//!
//! # Invariants
//! - Settings handed to the renderer have passed through [`RenderSettings::sanitized`].
//! - `Transform::matrix` is always scale, then rotation, then translation.

pub mod settings;
pub mod types;

pub use settings::{Antialiasing, RenderQuality, RenderSettings, SettingsError};
pub use types::{ActorId, Transform};

pub fn crate_info() -> &'static str {
    "stagecraft-common v0.1.0"
}
