//! Ports - Trait definitions for the outside world.

pub mod runner;
