// Latency module - Output delay estimation and adaptive compensation

pub mod compensator;
pub mod heuristics;

pub use compensator::{CompensationState, LatencyCompensator, LatencySample, SharedCompensator};
