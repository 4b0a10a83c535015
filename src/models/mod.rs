//! Domain models and wire DTOs.

pub mod event;
pub mod incident;
