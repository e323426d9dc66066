//! The control-interface trait and its error type.

use thiserror::Error;

use crate::Id;
use super::command::SumoCommand;

/// Errors raised by calls into the external simulator.
///
/// Any of these terminates the current run: simulator state after a failed
/// call cannot be trusted, so there is no retry path.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SumoError {
    #[error("failed to start simulator session: {0}")]
    Start(String),

    #[error("no simulator session is running")]
    NotRunning,

    #[error("unknown {kind} id `{id}`")]
    UnknownId { kind: &'static str, id: Id },

    #[error("simulator call failed ({context}): {message}")]
    Call { context: String, message: String },
}

impl SumoError {
    /// Convenience constructor for unknown-identifier errors.
    pub fn unknown(kind: &'static str, id: impl Into<Id>) -> Self {
        SumoError::UnknownId {
            kind,
            id: id.into(),
        }
    }
}

/// One entry of a traffic-light phase program as stored by the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseDef {
    /// Programmed duration in seconds.
    pub duration: f64,
    /// Raw signal-state string, one character per controlled link.
    pub state: String,
}

/// A controlled connection from an incoming lane to an outgoing lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneLink {
    pub incoming: Id,
    pub outgoing: Id,
}

/// Uniform control surface over the external microscopic simulator.
///
/// Mirrors the subset of the simulator control protocol this crate consumes:
/// traffic-light introspection and mutation, detector telemetry, vehicle
/// parameter overrides for incident injection, and stepping/termination
/// queries. Implementations may bind in-process or speak an RPC protocol;
/// either way calls block until the simulator answers.
pub trait SumoInterface {
    // --- Session lifecycle ---

    /// Starts a simulation session with the composed invocation.
    fn start(&mut self, command: &SumoCommand) -> Result<(), SumoError>;

    /// Closes the session. Idempotent.
    fn close(&mut self) -> Result<(), SumoError>;

    // --- Simulation ---

    /// Current simulation time in seconds.
    fn time(&self) -> Result<f64, SumoError>;

    /// Configured simulation end time in seconds.
    fn end_time(&self) -> Result<f64, SumoError>;

    /// Number of vehicles still in or yet to enter the network.
    fn min_expected_vehicles(&self) -> Result<u64, SumoError>;

    /// Advances the simulation by exactly one discrete timestep.
    fn simulation_step(&mut self) -> Result<(), SumoError>;

    // --- Traffic lights ---

    /// Ids of all signalized intersections, in discovery order.
    fn traffic_light_ids(&self) -> Result<Vec<Id>, SumoError>;

    /// The phase program of a traffic light.
    fn program_phases(&self, tls: &str) -> Result<Vec<PhaseDef>, SumoError>;

    /// Switches a traffic light to the given phase index.
    fn set_phase(&mut self, tls: &str, phase: usize) -> Result<(), SumoError>;

    /// Sets the remaining duration of the current phase.
    fn set_phase_duration(&mut self, tls: &str, duration: f64) -> Result<(), SumoError>;

    /// Lanes controlled by a traffic light, in signal order.
    fn controlled_lanes(&self, tls: &str) -> Result<Vec<Id>, SumoError>;

    /// Controlled incoming→outgoing lane connections of a traffic light.
    fn controlled_links(&self, tls: &str) -> Result<Vec<LaneLink>, SumoError>;

    // --- Lanes and edges ---

    /// All lane ids.
    fn lane_ids(&self) -> Result<Vec<Id>, SumoError>;

    /// Vehicles currently on a lane, leading vehicle first.
    fn vehicles_on_lane(&self, lane: &str) -> Result<Vec<Id>, SumoError>;

    /// Outgoing lanes reachable from a lane.
    fn lane_links(&self, lane: &str) -> Result<Vec<Id>, SumoError>;

    /// The edge a lane belongs to.
    fn edge_of_lane(&self, lane: &str) -> Result<Id, SumoError>;

    /// The destination junction of an edge.
    fn edge_to_junction(&self, edge: &str) -> Result<Id, SumoError>;

    // --- Vehicles (incident injection) ---

    /// Current speed of a vehicle in m/s.
    fn vehicle_speed(&self, vehicle: &str) -> Result<f64, SumoError>;

    /// Overrides a vehicle's speed.
    fn set_vehicle_speed(&mut self, vehicle: &str, speed: f64) -> Result<(), SumoError>;

    /// Overrides a vehicle's deceleration capability.
    fn set_vehicle_decel(&mut self, vehicle: &str, decel: f64) -> Result<(), SumoError>;

    /// Sets a vehicle's speed-safety bitmask (0 disables all checks).
    fn set_vehicle_speed_mode(&mut self, vehicle: &str, mode: u32) -> Result<(), SumoError>;

    // --- Detector telemetry ---

    /// Vehicles that passed an induction loop during the last step.
    fn loop_vehicle_count(&self, detector: &str) -> Result<f64, SumoError>;

    /// Mean speed at an induction loop during the last step; negative when
    /// no vehicle was measured.
    fn loop_mean_speed(&self, detector: &str) -> Result<f64, SumoError>;

    /// Occupancy of an induction loop during the last step.
    fn loop_occupancy(&self, detector: &str) -> Result<f64, SumoError>;

    /// Jam length in vehicles on a lane-area detector.
    fn area_jam_length_vehicles(&self, detector: &str) -> Result<f64, SumoError>;

    /// Jam length in meters on a lane-area detector.
    fn area_jam_length_meters(&self, detector: &str) -> Result<f64, SumoError>;

    /// Halting vehicles on a lane-area detector.
    fn area_halting_count(&self, detector: &str) -> Result<f64, SumoError>;
}
