//! Per-intersection signal control.
//!
//! A [`TrafficLightController`] owns one intersection's phase state machine,
//! enforcing the regulatory minimum display time per phase kind, aggregating
//! detector telemetry into a feature vector, and recording every committed
//! phase change in an append-only audit log.

pub mod controller;
pub mod observation;
pub mod phase;

pub use controller::{PhaseChange, TrafficLightController};
pub use observation::{Observation, PhaseFeature};
pub use phase::{Phase, PhaseKind};
