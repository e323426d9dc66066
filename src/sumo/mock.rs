//! Scripted in-memory simulator used by unit tests.
//!
//! Implements [`SumoInterface`] over a hand-built topology with one-second
//! timesteps. Tests mutate the public fields directly to script detector
//! readings and vehicle placement.

use std::collections::HashMap;

use crate::Id;
use super::command::SumoCommand;
use super::interface::{LaneLink, PhaseDef, SumoError, SumoInterface};

#[derive(Debug, Clone, Default)]
pub struct MockTrafficLight {
    pub phases: Vec<PhaseDef>,
    pub links: Vec<LaneLink>,
    pub controlled_lanes: Vec<Id>,
    pub current_phase: usize,
    /// Last `set_phase_duration` value, for extension assertions.
    pub last_extension: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct MockLane {
    /// Vehicles on the lane, leading vehicle first.
    pub vehicles: Vec<Id>,
    /// Outgoing lanes.
    pub links: Vec<Id>,
    /// Owning edge.
    pub edge: Id,
}

#[derive(Debug, Clone)]
pub struct MockVehicle {
    pub speed: f64,
    pub decel: f64,
    pub speed_mode: u32,
}

impl Default for MockVehicle {
    fn default() -> Self {
        Self {
            speed: 10.0,
            decel: 4.5,
            speed_mode: 31,
        }
    }
}

/// Detector readings reported for one detector id. Defaults are all zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockReadings {
    pub vehicle_count: f64,
    pub mean_speed: f64,
    pub occupancy: f64,
    pub jam_vehicles: f64,
    pub jam_meters: f64,
    pub halting: f64,
}

/// In-memory [`SumoInterface`] implementation.
///
/// A fresh mock starts with an open session at time zero; `start` resets the
/// clock and counts reconnects, `close` ends the session.
#[derive(Debug, Default)]
pub struct MockSumo {
    pub running: bool,
    pub time: f64,
    pub end_time: f64,
    pub min_expected: u64,
    pub tls_order: Vec<Id>,
    pub tls: HashMap<Id, MockTrafficLight>,
    pub lane_order: Vec<Id>,
    pub lanes: HashMap<Id, MockLane>,
    /// Edge id → destination junction id.
    pub edges: HashMap<Id, Id>,
    pub vehicles: HashMap<Id, MockVehicle>,
    pub readings: HashMap<Id, MockReadings>,
    pub start_count: usize,
}

impl MockSumo {
    pub fn new() -> Self {
        Self {
            running: true,
            end_time: 3600.0,
            min_expected: 1,
            ..Self::default()
        }
    }

    /// Adds a traffic light with phases given as `(duration, state)` pairs
    /// and controlled links as `(incoming, outgoing)` lane pairs.
    pub fn add_traffic_light(
        &mut self,
        id: &str,
        phases: &[(f64, &str)],
        links: &[(&str, &str)],
    ) {
        let light = MockTrafficLight {
            phases: phases
                .iter()
                .map(|(duration, state)| PhaseDef {
                    duration: *duration,
                    state: state.to_string(),
                })
                .collect(),
            links: links
                .iter()
                .map(|(incoming, outgoing)| LaneLink {
                    incoming: incoming.to_string(),
                    outgoing: outgoing.to_string(),
                })
                .collect(),
            controlled_lanes: links.iter().map(|(incoming, _)| incoming.to_string()).collect(),
            ..MockTrafficLight::default()
        };
        self.tls_order.push(id.to_string());
        self.tls.insert(id.to_string(), light);
    }

    /// Adds a lane belonging to `edge` with the given outgoing lanes.
    pub fn add_lane(&mut self, id: &str, edge: &str, links: &[&str]) {
        self.lane_order.push(id.to_string());
        self.lanes.insert(
            id.to_string(),
            MockLane {
                vehicles: Vec::new(),
                links: links.iter().map(|l| l.to_string()).collect(),
                edge: edge.to_string(),
            },
        );
        self.edges.entry(edge.to_string()).or_default();
    }

    /// Declares the destination junction of an edge.
    pub fn set_edge_junction(&mut self, edge: &str, junction: &str) {
        self.edges.insert(edge.to_string(), junction.to_string());
    }

    /// Places a vehicle at the back of a lane's queue.
    pub fn add_vehicle(&mut self, id: &str, lane: &str, speed: f64) {
        self.vehicles.insert(
            id.to_string(),
            MockVehicle {
                speed,
                ..MockVehicle::default()
            },
        );
        self.lanes
            .get_mut(lane)
            .expect("lane exists")
            .vehicles
            .push(id.to_string());
    }

    pub fn set_readings(&mut self, detector: &str, readings: MockReadings) {
        self.readings.insert(detector.to_string(), readings);
    }

    fn ensure_running(&self) -> Result<(), SumoError> {
        if self.running {
            Ok(())
        } else {
            Err(SumoError::NotRunning)
        }
    }

    fn light(&self, tls: &str) -> Result<&MockTrafficLight, SumoError> {
        self.tls
            .get(tls)
            .ok_or_else(|| SumoError::unknown("traffic light", tls))
    }

    fn lane(&self, lane: &str) -> Result<&MockLane, SumoError> {
        self.lanes
            .get(lane)
            .ok_or_else(|| SumoError::unknown("lane", lane))
    }

    fn reading(&self, detector: &str) -> MockReadings {
        self.readings.get(detector).copied().unwrap_or_default()
    }
}

impl SumoInterface for MockSumo {
    fn start(&mut self, _command: &SumoCommand) -> Result<(), SumoError> {
        self.running = true;
        self.time = 0.0;
        self.start_count += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SumoError> {
        self.running = false;
        Ok(())
    }

    fn time(&self) -> Result<f64, SumoError> {
        self.ensure_running()?;
        Ok(self.time)
    }

    fn end_time(&self) -> Result<f64, SumoError> {
        self.ensure_running()?;
        Ok(self.end_time)
    }

    fn min_expected_vehicles(&self) -> Result<u64, SumoError> {
        self.ensure_running()?;
        Ok(self.min_expected)
    }

    fn simulation_step(&mut self) -> Result<(), SumoError> {
        self.ensure_running()?;
        self.time += 1.0;
        Ok(())
    }

    fn traffic_light_ids(&self) -> Result<Vec<Id>, SumoError> {
        self.ensure_running()?;
        Ok(self.tls_order.clone())
    }

    fn program_phases(&self, tls: &str) -> Result<Vec<PhaseDef>, SumoError> {
        self.ensure_running()?;
        Ok(self.light(tls)?.phases.clone())
    }

    fn set_phase(&mut self, tls: &str, phase: usize) -> Result<(), SumoError> {
        self.ensure_running()?;
        let light = self
            .tls
            .get_mut(tls)
            .ok_or_else(|| SumoError::unknown("traffic light", tls))?;
        if phase >= light.phases.len() {
            return Err(SumoError::Call {
                context: format!("setPhase({tls})"),
                message: format!("phase index {phase} out of range"),
            });
        }
        light.current_phase = phase;
        Ok(())
    }

    fn set_phase_duration(&mut self, tls: &str, duration: f64) -> Result<(), SumoError> {
        self.ensure_running()?;
        let light = self
            .tls
            .get_mut(tls)
            .ok_or_else(|| SumoError::unknown("traffic light", tls))?;
        light.last_extension = Some(duration);
        Ok(())
    }

    fn controlled_lanes(&self, tls: &str) -> Result<Vec<Id>, SumoError> {
        self.ensure_running()?;
        Ok(self.light(tls)?.controlled_lanes.clone())
    }

    fn controlled_links(&self, tls: &str) -> Result<Vec<LaneLink>, SumoError> {
        self.ensure_running()?;
        Ok(self.light(tls)?.links.clone())
    }

    fn lane_ids(&self) -> Result<Vec<Id>, SumoError> {
        self.ensure_running()?;
        Ok(self.lane_order.clone())
    }

    fn vehicles_on_lane(&self, lane: &str) -> Result<Vec<Id>, SumoError> {
        self.ensure_running()?;
        Ok(self.lane(lane)?.vehicles.clone())
    }

    fn lane_links(&self, lane: &str) -> Result<Vec<Id>, SumoError> {
        self.ensure_running()?;
        Ok(self.lane(lane)?.links.clone())
    }

    fn edge_of_lane(&self, lane: &str) -> Result<Id, SumoError> {
        self.ensure_running()?;
        Ok(self.lane(lane)?.edge.clone())
    }

    fn edge_to_junction(&self, edge: &str) -> Result<Id, SumoError> {
        self.ensure_running()?;
        self.edges
            .get(edge)
            .cloned()
            .ok_or_else(|| SumoError::unknown("edge", edge))
    }

    fn vehicle_speed(&self, vehicle: &str) -> Result<f64, SumoError> {
        self.ensure_running()?;
        self.vehicles
            .get(vehicle)
            .map(|v| v.speed)
            .ok_or_else(|| SumoError::unknown("vehicle", vehicle))
    }

    fn set_vehicle_speed(&mut self, vehicle: &str, speed: f64) -> Result<(), SumoError> {
        self.ensure_running()?;
        self.vehicles
            .get_mut(vehicle)
            .map(|v| v.speed = speed)
            .ok_or_else(|| SumoError::unknown("vehicle", vehicle))
    }

    fn set_vehicle_decel(&mut self, vehicle: &str, decel: f64) -> Result<(), SumoError> {
        self.ensure_running()?;
        self.vehicles
            .get_mut(vehicle)
            .map(|v| v.decel = decel)
            .ok_or_else(|| SumoError::unknown("vehicle", vehicle))
    }

    fn set_vehicle_speed_mode(&mut self, vehicle: &str, mode: u32) -> Result<(), SumoError> {
        self.ensure_running()?;
        self.vehicles
            .get_mut(vehicle)
            .map(|v| v.speed_mode = mode)
            .ok_or_else(|| SumoError::unknown("vehicle", vehicle))
    }

    fn loop_vehicle_count(&self, detector: &str) -> Result<f64, SumoError> {
        self.ensure_running()?;
        Ok(self.reading(detector).vehicle_count)
    }

    fn loop_mean_speed(&self, detector: &str) -> Result<f64, SumoError> {
        self.ensure_running()?;
        Ok(self.reading(detector).mean_speed)
    }

    fn loop_occupancy(&self, detector: &str) -> Result<f64, SumoError> {
        self.ensure_running()?;
        Ok(self.reading(detector).occupancy)
    }

    fn area_jam_length_vehicles(&self, detector: &str) -> Result<f64, SumoError> {
        self.ensure_running()?;
        Ok(self.reading(detector).jam_vehicles)
    }

    fn area_jam_length_meters(&self, detector: &str) -> Result<f64, SumoError> {
        self.ensure_running()?;
        Ok(self.reading(detector).jam_meters)
    }

    fn area_halting_count(&self, detector: &str) -> Result<f64, SumoError> {
        self.ensure_running()?;
        Ok(self.reading(detector).halting)
    }
}
