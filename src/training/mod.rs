//! Centralized training for the multi-agent environment.
//!
//! The replay buffer is always available; the value-factorization networks
//! and the coordinator additionally require the `rl-nn` feature flag.

pub mod buffer;
#[cfg(feature = "rl-nn")]
pub mod coordinator;
#[cfg(feature = "rl-nn")]
pub mod network;

pub use buffer::{Experience, ReplayBuffer};
#[cfg(feature = "rl-nn")]
pub use coordinator::{AgentSpec, MarlCoordinator, TrainError};
#[cfg(feature = "rl-nn")]
pub use network::{MixingNetwork, QNetwork};
