//! The per-intersection controller and its phase state machine.

use std::collections::BTreeSet;

use log::error;
use rand::Rng;

use crate::config::{ActionType, Config, DetectorKind, Metric, MetricsConfig};
use crate::sumo::{SumoError, SumoInterface};
use crate::Id;

use super::observation::{Observation, PhaseFeature};
use super::phase::Phase;

/// Seconds added to the current phase by binary action 0.
const PHASE_EXTENSION_SECS: f64 = 5.0;

/// A virtual detector attached to one incoming lane of a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detector {
    pub id: Id,
    pub kind: DetectorKind,
}

/// One committed phase transition. The log is append-only; every entry was
/// committed only after the regulatory minimum of the outgoing phase had
/// elapsed.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseChange {
    /// Simulation time of the commit.
    pub time: f64,
    /// Phase index before the change.
    pub from: usize,
    /// Phase index after the change.
    pub to: usize,
}

/// Controls one signalized intersection.
///
/// Owns the classified phase program, the derived detector set and the phase
/// state machine. The controller never advances simulation time itself; it
/// only mutates the signal through the interface and keeps its timer in sync
/// with the simulator clock.
#[derive(Debug)]
pub struct TrafficLightController {
    id: Id,
    phases: Vec<Phase>,
    detectors: Vec<Detector>,
    metrics: MetricsConfig,
    current_phase: usize,
    current_phase_start: f64,
    phase_changes: Vec<PhaseChange>,
}

impl TrafficLightController {
    /// Configures a controller for a discovered traffic light: reads and
    /// classifies its phase program, derives detector ids from its incoming
    /// lanes, and resets it to a random initial phase.
    pub fn new<R: Rng>(
        id: Id,
        config: &Config,
        sumo: &mut dyn SumoInterface,
        rng: &mut R,
    ) -> Result<Self, SumoError> {
        let defs = sumo.program_phases(&id).map_err(|e| {
            error!("reading phase program for traffic light {id}: {e}");
            e
        })?;
        if defs.is_empty() {
            let e = SumoError::Call {
                context: format!("program_phases({id})"),
                message: "empty phase program".to_string(),
            };
            error!("configuring traffic light {id}: {e}");
            return Err(e);
        }
        let phases = defs
            .iter()
            .enumerate()
            .map(|(index, def)| Phase::from_def(index, def))
            .collect();

        // Incoming lanes, deduplicated and sorted so detector order is
        // stable across sessions.
        let links = sumo.controlled_links(&id).map_err(|e| {
            error!("reading controlled links for traffic light {id}: {e}");
            e
        })?;
        let in_lanes: BTreeSet<Id> = links.into_iter().map(|link| link.incoming).collect();

        let mut detectors = Vec::new();
        for kind in &config.detectors.enabled {
            let prefix = config.detectors.prefix_for(*kind);
            for lane in &in_lanes {
                detectors.push(Detector {
                    id: format!("{prefix}_{lane}"),
                    kind: *kind,
                });
            }
        }

        let mut controller = Self {
            id,
            phases,
            detectors,
            metrics: config.metrics.clone(),
            current_phase: 0,
            current_phase_start: 0.0,
            phase_changes: Vec::new(),
        };
        controller.reset_tl(sumo, rng)?;
        Ok(controller)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn phases(&self) -> &[Phase] {
        &self.phases
    }

    pub fn num_phases(&self) -> usize {
        self.phases.len()
    }

    pub fn current_phase(&self) -> usize {
        self.current_phase
    }

    /// Simulation time at which the current phase was entered.
    pub fn current_phase_start(&self) -> f64 {
        self.current_phase_start
    }

    pub fn detectors(&self) -> &[Detector] {
        &self.detectors
    }

    /// Append-only log of committed phase changes since the last reset.
    pub fn phase_changes(&self) -> &[PhaseChange] {
        &self.phase_changes
    }

    /// Size of this agent's discrete action space.
    pub fn action_dim(&self) -> usize {
        match self.metrics.action_type {
            ActionType::Binary => 2,
            ActionType::Multiphase => self.phases.len(),
        }
    }

    /// Length of this agent's observation vector: one entry per configured
    /// state metric, plus `num_phases - 1` extra when the phase is one-hot.
    pub fn observation_dim(&self) -> usize {
        let mut dim = self.metrics.state_metrics.len();
        if self.metrics.state_metrics.contains(&Metric::CurrentPhase)
            && self.metrics.use_phase_one_hot
        {
            dim += self.phases.len() - 1;
        }
        dim
    }

    /// Summarizes the intersection into a feature vector.
    ///
    /// Detector readings reporting a negative value are invalid and are
    /// excluded from the aggregate rather than counted as zero.
    pub fn collect_data(&self, sumo: &dyn SumoInterface) -> Result<Observation, SumoError> {
        let phase = if self.metrics.state_metrics.contains(&Metric::CurrentPhase) {
            Some(if self.metrics.use_phase_one_hot {
                let mut one_hot = vec![0.0; self.phases.len()];
                one_hot[self.current_phase] = 1.0;
                PhaseFeature::OneHot(one_hot)
            } else {
                PhaseFeature::Index(self.current_phase as f64)
            })
        } else {
            None
        };

        let mut metrics = Vec::new();
        for metric in &self.metrics.state_metrics {
            if *metric == Metric::CurrentPhase {
                continue;
            }
            let value = self.aggregate(sumo, *metric).map_err(|e| {
                error!("collecting {metric} for traffic light {}: {e}", self.id);
                e
            })?;
            metrics.push((*metric, value));
        }

        Ok(Observation { phase, metrics })
    }

    /// Aggregates one metric over this controller's detectors: sums for
    /// counts and lengths, averages for mean speed and occupancy.
    fn aggregate(&self, sumo: &dyn SumoInterface, metric: Metric) -> Result<f64, SumoError> {
        let kind = match metric.detector_kind() {
            Some(kind) => kind,
            None => return Ok(0.0),
        };
        let averaged = matches!(metric, Metric::MeanSpeed | Metric::Occupancy);

        let mut sum = 0.0;
        let mut valid = 0usize;
        for detector in self.detectors.iter().filter(|d| d.kind == kind) {
            let reading = match metric {
                Metric::Throughput => sumo.loop_vehicle_count(&detector.id)?,
                Metric::MeanSpeed => sumo.loop_mean_speed(&detector.id)?,
                Metric::Occupancy => sumo.loop_occupancy(&detector.id)?,
                Metric::QueueLength => sumo.area_jam_length_vehicles(&detector.id)?,
                Metric::QueueLengthMeters => sumo.area_jam_length_meters(&detector.id)?,
                Metric::HaltCount => sumo.area_halting_count(&detector.id)?,
                Metric::CurrentPhase => unreachable!("handled above"),
            };
            if reading < 0.0 {
                // Invalid sample; recover locally by exclusion.
                continue;
            }
            sum += reading;
            valid += 1;
        }

        if averaged {
            if valid > 0 {
                Ok(sum / valid as f64)
            } else {
                Ok(0.0)
            }
        } else {
            Ok(sum)
        }
    }

    /// Applies one action to the phase state machine.
    ///
    /// No transition is committed before the regulatory minimum of the
    /// *current* phase has elapsed. Binary action 0 extends the current
    /// phase by a fixed increment; binary action 1 advances cyclically.
    /// Multiphase actions name the target phase, which must differ from the
    /// current one and lie within the program.
    pub fn pseudo_step(
        &mut self,
        sumo: &mut dyn SumoInterface,
        action: usize,
    ) -> Result<(), SumoError> {
        let now = sumo.time().map_err(|e| {
            error!("stepping traffic light {}: {e}", self.id);
            e
        })?;
        let elapsed = now - self.current_phase_start;
        if elapsed < self.phases[self.current_phase].regulatory_min_duration() {
            return Ok(());
        }

        match self.metrics.action_type {
            ActionType::Multiphase => {
                let target = action;
                if target != self.current_phase && target < self.phases.len() {
                    self.commit(sumo, target, now)?;
                }
            }
            ActionType::Binary => {
                if action == 0 {
                    sumo.set_phase_duration(&self.id, PHASE_EXTENSION_SECS)
                        .map_err(|e| {
                            error!("extending phase on traffic light {}: {e}", self.id);
                            e
                        })?;
                } else {
                    let next = (self.current_phase + 1) % self.phases.len();
                    self.commit(sumo, next, now)?;
                }
            }
        }
        Ok(())
    }

    fn commit(
        &mut self,
        sumo: &mut dyn SumoInterface,
        target: usize,
        now: f64,
    ) -> Result<(), SumoError> {
        sumo.set_phase(&self.id, target).map_err(|e| {
            error!(
                "committing phase {target} on traffic light {}: {e}",
                self.id
            );
            e
        })?;
        self.phase_changes.push(PhaseChange {
            time: now,
            from: self.current_phase,
            to: target,
        });
        self.current_phase = target;
        self.current_phase_start = now;
        Ok(())
    }

    /// Resets the controller to a uniformly random initial phase, resets the
    /// timer to the current simulation time and clears the audit log.
    pub fn reset_tl<R: Rng>(
        &mut self,
        sumo: &mut dyn SumoInterface,
        rng: &mut R,
    ) -> Result<(), SumoError> {
        let initial = rng.gen_range(0..self.phases.len());
        sumo.set_phase(&self.id, initial).map_err(|e| {
            error!("resetting traffic light {}: {e}", self.id);
            e
        })?;
        self.current_phase = initial;
        self.current_phase_start = sumo.time().map_err(|e| {
            error!("resetting traffic light {}: {e}", self.id);
            e
        })?;
        self.phase_changes.clear();
        Ok(())
    }
}
