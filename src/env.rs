//! Multi-agent environment facade over the simulator.
//!
//! [`TrafficSignalControlEnv`] presents the session as a cooperative
//! multi-agent environment: per-agent discrete action spaces, flattened
//! observation vectors, a scalar global state shared by the whole team and a
//! team reward derived from the configured reward policy. Every agent acts
//! once per environment step; the simulator advances exactly one timestep.

use std::collections::BTreeMap;

use log::info;
use thiserror::Error;

use crate::config::RewardPolicy;
use crate::simulator::{SessionStep, SumoTrafficSimulator};
use crate::sumo::{SumoError, SumoInterface};
use crate::Id;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error(transparent)]
    Sumo(#[from] SumoError),
    /// The configured reward policy is declared but has no defined semantics.
    #[error("reward policy {policy:?} is not implemented")]
    RewardPolicyUnimplemented { policy: RewardPolicy },
    #[error("no controller for agent `{0}`")]
    UnknownAgent(Id),
}

/// What a `reset` hands back to the learner.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvReset {
    /// Flattened per-agent observation vectors.
    pub observations: BTreeMap<Id, Vec<f64>>,
    /// Sum of the configured global metric over all agents.
    pub global_state: f64,
}

/// What one environment step hands back to the learner.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvStep {
    pub observations: BTreeMap<Id, Vec<f64>>,
    pub global_state: f64,
    /// Team reward under the configured policy, shared by every agent.
    pub reward: f64,
    /// The episode is over; the simulator decides, never the environment.
    pub done: bool,
}

/// Cooperative multi-agent view of a simulation session.
pub struct TrafficSignalControlEnv<I: SumoInterface> {
    simulator: SumoTrafficSimulator<I>,
}

impl<I: SumoInterface> TrafficSignalControlEnv<I> {
    /// Wraps an already initialized simulator.
    pub fn new(simulator: SumoTrafficSimulator<I>) -> Self {
        Self { simulator }
    }

    /// Agent ids in discovery order.
    pub fn agent_ids(&self) -> &[Id] {
        self.simulator.agent_ids()
    }

    /// Size of one agent's discrete action space.
    pub fn action_dim(&self, agent_id: &str) -> Result<usize, EnvError> {
        self.controller_dim(agent_id, |c| c.action_dim())
    }

    /// Length of one agent's observation vector.
    pub fn observation_dim(&self, agent_id: &str) -> Result<usize, EnvError> {
        self.controller_dim(agent_id, |c| c.observation_dim())
    }

    fn controller_dim(
        &self,
        agent_id: &str,
        dim: impl Fn(&crate::controller::TrafficLightController) -> usize,
    ) -> Result<usize, EnvError> {
        self.simulator
            .controller(agent_id)
            .map(dim)
            .ok_or_else(|| EnvError::UnknownAgent(agent_id.to_string()))
    }

    /// Dense `[sources, targets]` arrays of the intersection graph, for
    /// learners that consume the team topology.
    pub fn edge_index(&self) -> Option<[Vec<usize>; 2]> {
        self.simulator.graph().map(|g| g.edge_index())
    }

    /// Restarts the session and returns the initial team view.
    pub fn reset(&mut self) -> Result<EnvReset, EnvError> {
        self.simulator.reset_session()?;
        let observations = self.flatten(self.simulator.observe_all()?);
        let global_state = self.global_state()?;
        info!(
            "environment reset: {} agents, global state {global_state}",
            observations.len()
        );
        Ok(EnvReset {
            observations,
            global_state,
        })
    }

    /// Applies every agent's action within one simulator timestep.
    ///
    /// When the session has already ended, the previous observations are
    /// unavailable and the step reports `done` with empty observations.
    pub fn step(&mut self, actions: &BTreeMap<Id, usize>) -> Result<EnvStep, EnvError> {
        match self.simulator.step_all(actions)? {
            SessionStep::Finished => Ok(EnvStep {
                observations: BTreeMap::new(),
                global_state: 0.0,
                reward: 0.0,
                done: true,
            }),
            SessionStep::Running { observations } => {
                let observations = self.flatten(observations);
                let global_state = self.global_state()?;
                let reward = self.team_reward(global_state)?;
                Ok(EnvStep {
                    observations,
                    global_state,
                    reward,
                    done: false,
                })
            }
        }
    }

    /// Per-agent rewards: the negation of the configured reward metric in
    /// each agent's current observation.
    pub fn agent_rewards(&self) -> Result<BTreeMap<Id, f64>, EnvError> {
        let metric = self.simulator.config().metrics.reward_metric;
        let mut rewards = BTreeMap::new();
        for (id, observation) in self.simulator.observe_all()? {
            rewards.insert(id, -observation.metric(metric).unwrap_or(0.0));
        }
        Ok(rewards)
    }

    /// Sum of the configured global metric over every agent. Validation
    /// guarantees the metric is a collected detector metric.
    pub fn global_state(&self) -> Result<f64, EnvError> {
        let metric = self.simulator.config().metrics.global_metric;
        let mut total = 0.0;
        for (_, observation) in self.simulator.observe_all()? {
            total += observation.metric(metric).unwrap_or(0.0);
        }
        Ok(total)
    }

    fn team_reward(&self, global_state: f64) -> Result<f64, EnvError> {
        match self.simulator.config().metrics.reward_policy {
            RewardPolicy::Global => Ok(global_state),
            policy @ (RewardPolicy::Difference | RewardPolicy::Shaped) => {
                Err(EnvError::RewardPolicyUnimplemented { policy })
            }
        }
    }

    fn flatten(
        &self,
        observations: BTreeMap<Id, crate::controller::Observation>,
    ) -> BTreeMap<Id, Vec<f64>> {
        observations
            .into_iter()
            .map(|(id, obs)| (id, obs.to_vec()))
            .collect()
    }

    pub fn simulator(&self) -> &SumoTrafficSimulator<I> {
        &self.simulator
    }

    pub fn is_done(&self) -> bool {
        self.simulator.is_truncated() || self.simulator.is_terminated()
    }
}
