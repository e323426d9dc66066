//! Configuration for the simulation session, telemetry collection,
//! incident injection and training.
//!
//! Everything resolved once at startup lives here: enabled state and reward
//! metrics, detector kinds and id prefixes, the action
//! space type, accident-injection parameters and training hyperparameters.
//! Configuration problems are fatal at startup; [`Config::validate`] returns
//! a [`ConfigError`] and nothing downstream attempts recovery.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// A telemetry metric collected per intersection.
///
/// `CurrentPhase` is encoded either as a raw index or one-hot
/// (see [`MetricsConfig::use_phase_one_hot`]); the remaining metrics are
/// aggregated over the controller's detectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Metric {
    CurrentPhase,
    /// Vehicles that passed an induction loop last step (summed).
    Throughput,
    /// Mean speed over induction loops (averaged, invalid readings excluded).
    MeanSpeed,
    /// Occupancy over induction loops (averaged, invalid readings excluded).
    Occupancy,
    /// Jam length in vehicles over lane-area detectors (summed).
    QueueLength,
    /// Jam length in meters over lane-area detectors (summed).
    QueueLengthMeters,
    /// Halting vehicles over lane-area detectors (summed).
    HaltCount,
}

impl Metric {
    /// The detector kind this metric is read from, if any.
    pub fn detector_kind(&self) -> Option<DetectorKind> {
        match self {
            Metric::CurrentPhase => None,
            Metric::Throughput | Metric::MeanSpeed | Metric::Occupancy => {
                Some(DetectorKind::InductionLoop)
            }
            Metric::QueueLength | Metric::QueueLengthMeters | Metric::HaltCount => {
                Some(DetectorKind::LaneArea)
            }
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::CurrentPhase => "current_phase",
            Metric::Throughput => "throughput",
            Metric::MeanSpeed => "mean_speed",
            Metric::Occupancy => "occupancy",
            Metric::QueueLength => "queue_length",
            Metric::QueueLengthMeters => "queue_length_in_meters",
            Metric::HaltCount => "halt_count",
        };
        write!(f, "{}", name)
    }
}

/// Action-space semantics, resolved once at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ActionType {
    /// Action 0 extends the current phase, action 1 advances to the next.
    Binary,
    /// The action is the desired target phase index.
    Multiphase,
}

/// Team reward policy for the multi-agent environment.
///
/// Only `Global` has defined semantics; `Difference` and `Shaped` are
/// declared but unimplemented and selecting them is an explicit error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RewardPolicy {
    Global,
    Difference,
    Shaped,
}

/// Virtual detector families supported by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DetectorKind {
    /// E1 induction loop.
    InductionLoop,
    /// E2 lane-area detector.
    LaneArea,
}

/// Metric and action-space configuration shared by all controllers.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsConfig {
    /// Metrics making up each agent's observation, in feature order.
    /// `CurrentPhase` is always emitted first regardless of its position.
    pub state_metrics: Vec<Metric>,
    /// Encode the current phase as a one-hot vector instead of a raw index.
    pub use_phase_one_hot: bool,
    /// Action-space semantics for every controller.
    pub action_type: ActionType,
    /// Metric whose negation is the per-agent reward in `sumo_step`.
    pub reward_metric: Metric,
    /// Metric summed over agents to form the global state.
    pub global_metric: Metric,
    /// Team reward policy used by the environment.
    pub reward_policy: RewardPolicy,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            state_metrics: vec![
                Metric::CurrentPhase,
                Metric::QueueLength,
                Metric::MeanSpeed,
            ],
            use_phase_one_hot: false,
            action_type: ActionType::Binary,
            reward_metric: Metric::QueueLength,
            global_metric: Metric::QueueLength,
            reward_policy: RewardPolicy::Global,
        }
    }
}

/// Detector enablement and id-prefix configuration.
///
/// Detector ids are derived as `{prefix}_{lane}` for each incoming lane of a
/// controller, matching the detector additional file generated upstream.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectorConfig {
    /// Detector kinds to instantiate per controller.
    pub enabled: Vec<DetectorKind>,
    /// Id prefix for induction loops.
    pub induction_loop_prefix: String,
    /// Id prefix for lane-area detectors.
    pub lane_area_prefix: String,
}

impl DetectorConfig {
    /// The configured id prefix for a detector kind.
    pub fn prefix_for(&self, kind: DetectorKind) -> &str {
        match kind {
            DetectorKind::InductionLoop => &self.induction_loop_prefix,
            DetectorKind::LaneArea => &self.lane_area_prefix,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            enabled: vec![DetectorKind::InductionLoop, DetectorKind::LaneArea],
            induction_loop_prefix: "e1det".to_string(),
            lane_area_prefix: "e2det".to_string(),
        }
    }
}

/// Stochastic incident-injection parameters.
///
/// The interval and probability triggers are independent; both may fire in
/// the same step.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AccidentConfig {
    /// Inject every `interval` steps, if set.
    pub interval: Option<u64>,
    /// Per-step Bernoulli injection probability.
    pub probability: f64,
    /// Nominal incident duration in seconds.
    pub duration: f64,
}

impl Default for AccidentConfig {
    fn default() -> Self {
        Self {
            interval: None,
            probability: 0.0,
            duration: 30.0,
        }
    }
}

/// Simulation session configuration.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationConfig {
    /// Seed for every stochastic element (incidents, phase resets, sampling).
    pub seed: u64,
    /// Launch the GUI binary instead of the headless one.
    pub gui: bool,
    /// Pass `--no-warnings` to the simulator.
    pub no_warnings: bool,
    /// Name of the compiled network, used to locate its `.sumocfg`.
    pub network_name: String,
    /// Directory holding one subdirectory per compiled network.
    pub networks_path: PathBuf,
    /// Incident injection parameters.
    pub accident: AccidentConfig,
}

impl SimulationConfig {
    /// Path of the simulator configuration file for the selected network:
    /// `{networks_path}/{network}/{network}_sumo_config.sumocfg`.
    pub fn sumocfg_path(&self) -> PathBuf {
        self.networks_path
            .join(&self.network_name)
            .join(format!("{}_sumo_config.sumocfg", self.network_name))
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            gui: false,
            no_warnings: true,
            network_name: String::new(),
            networks_path: PathBuf::from("networks"),
            accident: AccidentConfig::default(),
        }
    }
}

/// Training hyperparameters for the coordinator.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrainingConfig {
    /// Batch size sampled from the replay buffer.
    pub batch_size: usize,
    /// Adam learning rate.
    pub learning_rate: f64,
    /// Discount factor.
    pub gamma: f64,
    /// Replay buffer capacity.
    pub buffer_capacity: usize,
    /// Environment steps before the first gradient update.
    pub warmup_steps: u64,
    /// Steps between target-network synchronizations.
    pub target_update_interval: u64,
    /// Maximum gradient norm.
    pub grad_norm_clip: f64,
    /// Hidden width of the per-agent value networks.
    pub hidden_dim: usize,
    /// Embedding width of the mixing hypernetwork.
    pub hypernet_embed_dim: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            learning_rate: 5e-4,
            gamma: 0.99,
            buffer_capacity: 10_000,
            warmup_steps: 100,
            target_update_interval: 200,
            grad_norm_clip: 10.0,
            hidden_dim: 64,
            hypernet_embed_dim: 32,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Config {
    pub metrics: MetricsConfig,
    pub detectors: DetectorConfig,
    pub simulation: SimulationConfig,
    pub training: TrainingConfig,
}

/// Errors raised by startup validation. All fatal, no recovery.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("state_metrics must not be empty")]
    EmptyStateMetrics,

    #[error("network_name must be set to locate the simulator configuration")]
    MissingNetworkName,

    #[error("accident probability {0} is outside [0, 1]")]
    InvalidAccidentProbability(f64),

    #[error("metric {metric} requires a {kind:?} detector which is not enabled")]
    MetricRequiresDetector {
        metric: Metric,
        kind: DetectorKind,
    },

    #[error("{role} metric {metric} is not among the collected state metrics")]
    MetricNotCollected { role: &'static str, metric: Metric },

    #[error("current_phase cannot serve as the {0} metric")]
    PhaseMetricMisuse(&'static str),

    #[error("batch_size {batch} exceeds buffer_capacity {capacity}")]
    BatchExceedsCapacity { batch: usize, capacity: usize },
}

impl Config {
    /// Validates the configuration before any simulator contact.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.metrics.state_metrics.is_empty() {
            return Err(ConfigError::EmptyStateMetrics);
        }
        if self.simulation.network_name.is_empty() {
            return Err(ConfigError::MissingNetworkName);
        }
        let p = self.simulation.accident.probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(ConfigError::InvalidAccidentProbability(p));
        }

        for metric in &self.metrics.state_metrics {
            if let Some(kind) = metric.detector_kind() {
                if !self.detectors.enabled.contains(&kind) {
                    return Err(ConfigError::MetricRequiresDetector {
                        metric: *metric,
                        kind,
                    });
                }
            }
        }

        for (role, metric) in [
            ("reward", self.metrics.reward_metric),
            ("global", self.metrics.global_metric),
        ] {
            if metric == Metric::CurrentPhase {
                return Err(ConfigError::PhaseMetricMisuse(role));
            }
            if !self.metrics.state_metrics.contains(&metric) {
                return Err(ConfigError::MetricNotCollected { role, metric });
            }
        }

        if self.training.batch_size > self.training.buffer_capacity {
            return Err(ConfigError::BatchExceedsCapacity {
                batch: self.training.batch_size,
                capacity: self.training.buffer_capacity,
            });
        }

        Ok(())
    }
}
