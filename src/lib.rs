//! crossflow - per-intersection traffic-signal control simulation and
//! multi-agent reinforcement learning over an external microscopic traffic
//! simulator (SUMO).
//!
//! The crate owns the control side only: the regulatory phase state machine,
//! detector aggregation, the intersection interaction graph, stochastic
//! incident injection, and the off-policy training loop. Network building,
//! route/detector file generation and visualization are upstream concerns
//! consumed as opaque inputs (a compiled network file plus additional files
//! referenced from the simulator configuration).
//!
//! Neural-network value functions and the training coordinator require the
//! `rl-nn` feature flag (which brings in `tch`).

pub mod config;
pub mod controller;
pub mod env;
pub mod graph;
pub mod simulator;
pub mod sumo;
pub mod training;

pub use config::Config;
pub use controller::TrafficLightController;
pub use env::TrafficSignalControlEnv;
pub use graph::NetworkGraph;
pub use simulator::SumoTrafficSimulator;
pub use sumo::{SumoError, SumoInterface};

/// Identifier type used for traffic lights, lanes, edges, detectors and
/// vehicles. All identifiers originate in the simulator.
pub type Id = String;
