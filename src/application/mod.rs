//! Application layer - Services that drive the ports.

pub mod splitter;
