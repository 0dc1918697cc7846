//! Domain layer - Pure business logic.

pub mod plan;
pub mod progress;
pub mod timing;
