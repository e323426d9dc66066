//! Simulator interface seam.
//!
//! Every call into the external simulator goes through the
//! [`SumoInterface`] trait and returns an explicit [`SumoError`] on failure,
//! so call sites handle failure explicitly while the overall policy stays
//! fail-fast: a failed call terminates the run, never retries.

pub mod command;
pub mod interface;

#[cfg(test)]
pub(crate) mod mock;

pub use command::SumoCommand;
pub use interface::{LaneLink, PhaseDef, SumoError, SumoInterface};
