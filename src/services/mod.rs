//! Business logic services.

pub mod backup;
pub mod correlation;
pub mod health;
pub mod reverse_sync;

#[cfg(test)]
pub mod testing;
