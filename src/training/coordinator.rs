//! Centralized trainer with decentralized execution.
//!
//! One Q-network per agent selects actions from local observations; a
//! state-conditioned hypernetwork mixes their Q-values into a team value for
//! the TD update. All online parameters live in a single variable store so
//! one Adam optimizer covers the whole model; the frozen target mixing
//! network lives in a second store synchronized on a fixed cadence. Only
//! available with the `rl-nn` feature.

use std::collections::BTreeMap;
use std::path::Path;

use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tch::{nn, nn::OptimizerConfig, Device, Kind, Tensor};
use thiserror::Error;

use crate::config::TrainingConfig;
use crate::env::{EnvError, TrafficSignalControlEnv};
use crate::sumo::SumoInterface;
use crate::training::buffer::{Experience, ReplayBuffer};
use crate::training::network::{MixingNetwork, QNetwork};
use crate::Id;

#[derive(Debug, Error)]
pub enum TrainError {
    #[error(transparent)]
    Env(#[from] EnvError),
    #[error(transparent)]
    Torch(#[from] tch::TchError),
    #[error("no value network for agent `{0}`")]
    UnknownAgent(Id),
}

/// Network dimensions of one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    pub id: Id,
    pub obs_dim: usize,
    pub action_dim: usize,
}

impl AgentSpec {
    /// Reads the specs of every agent from an initialized environment.
    pub fn from_env<I: SumoInterface>(
        env: &TrafficSignalControlEnv<I>,
    ) -> Result<Vec<Self>, EnvError> {
        env.agent_ids()
            .iter()
            .map(|id| {
                Ok(Self {
                    id: id.clone(),
                    obs_dim: env.observation_dim(id)?,
                    action_dim: env.action_dim(id)?,
                })
            })
            .collect()
    }
}

/// Coordinates value-factorization training over the whole agent set.
pub struct MarlCoordinator {
    config: TrainingConfig,
    agent_ids: Vec<Id>,
    nets: BTreeMap<Id, QNetwork>,
    mixer: MixingNetwork,
    target_mixer: MixingNetwork,
    vs: nn::VarStore,
    target_vs: nn::VarStore,
    optimizer: nn::Optimizer,
    buffer: ReplayBuffer,
    rng: StdRng,
    device: Device,
}

impl MarlCoordinator {
    /// Builds per-agent networks and both mixing networks. The target store
    /// starts as an exact copy of the online mixing parameters.
    pub fn new(
        config: TrainingConfig,
        agents: &[AgentSpec],
        seed: u64,
        device: Device,
    ) -> Result<Self, TrainError> {
        let vs = nn::VarStore::new(device);
        let root = vs.root();

        let mut agent_ids = Vec::with_capacity(agents.len());
        let mut nets = BTreeMap::new();
        for spec in agents {
            let net = QNetwork::new(
                &(&root / "agent" / spec.id.as_str()),
                spec.obs_dim,
                config.hidden_dim,
                spec.action_dim,
            );
            agent_ids.push(spec.id.clone());
            nets.insert(spec.id.clone(), net);
        }

        // Global state is the scalar metric sum, so state_dim = 1.
        let mixer = MixingNetwork::new(&(&root / "mixing"), agents.len(), 1, config.hypernet_embed_dim);
        let target_vs = nn::VarStore::new(device);
        let target_mixer = MixingNetwork::new(
            &(&target_vs.root() / "mixing"),
            agents.len(),
            1,
            config.hypernet_embed_dim,
        );

        let optimizer = nn::Adam::default().build(&vs, config.learning_rate)?;
        let buffer = ReplayBuffer::new(config.buffer_capacity);
        let rng = StdRng::seed_from_u64(seed);

        let mut coordinator = Self {
            config,
            agent_ids,
            nets,
            mixer,
            target_mixer,
            vs,
            target_vs,
            optimizer,
            buffer,
            rng,
            device,
        };
        coordinator.sync_target();
        info!(
            "initialized coordinator with {} agents",
            coordinator.agent_ids.len()
        );
        Ok(coordinator)
    }

    pub fn agent_ids(&self) -> &[Id] {
        &self.agent_ids
    }

    pub fn buffer(&self) -> &ReplayBuffer {
        &self.buffer
    }

    pub fn push_experience(&mut self, experience: Experience) {
        self.buffer.push(experience);
    }

    /// Greedy argmax action per agent from its local observation.
    pub fn select_actions(
        &self,
        observations: &BTreeMap<Id, Vec<f64>>,
    ) -> Result<BTreeMap<Id, usize>, TrainError> {
        let mut actions = BTreeMap::new();
        for (id, obs) in observations {
            let net = self
                .nets
                .get(id)
                .ok_or_else(|| TrainError::UnknownAgent(id.clone()))?;
            let action = tch::no_grad(|| {
                let obs = self.float_tensor(obs).unsqueeze(0);
                net.forward(&obs).argmax(-1, false).int64_value(&[0])
            });
            actions.insert(id.clone(), action as usize);
        }
        Ok(actions)
    }

    /// One gradient update from a uniform replay batch. Returns `None` when
    /// the buffer cannot fill a batch yet.
    pub fn train_step(&mut self) -> Result<Option<f64>, TrainError> {
        if self.buffer.len() < self.config.batch_size {
            return Ok(None);
        }
        let batch: Vec<Experience> = self
            .buffer
            .sample(&mut self.rng, self.config.batch_size)
            .into_iter()
            .cloned()
            .collect();
        let batch_len = batch.len() as i64;

        // Both sides of the TD error mix each agent's maximal predicted
        // Q-value; the stored actions drive rollouts, not the update.
        let max_qs = self.stacked_max_qs(&batch, |e| &e.observations);
        let next_max_qs = self.stacked_max_qs(&batch, |e| &e.next_observations);

        let state = self.scalar_column(&batch, |e| e.global_state);
        let next_state = self.scalar_column(&batch, |e| e.next_global_state);
        let team_rewards = self.scalar_column(&batch, |e| e.rewards.values().sum::<f64>());
        let dones = self.scalar_column(&batch, |e| if e.done { 1.0 } else { 0.0 });

        let q_total = self.mixer.forward(&max_qs, &state);
        let target = tch::no_grad(|| {
            let next_total = self.target_mixer.forward(&next_max_qs, &next_state);
            team_rewards.view([batch_len])
                + self.config.gamma * (1.0 - dones.view([batch_len])) * next_total
        });

        let loss = q_total.mse_loss(&target, tch::Reduction::Mean);
        self.optimizer.zero_grad();
        loss.backward();
        self.optimizer.clip_grad_norm(self.config.grad_norm_clip);
        self.optimizer.step();

        Ok(Some(loss.double_value(&[])))
    }

    /// Copies the online mixing parameters into the frozen target copy.
    pub fn sync_target(&mut self) {
        let online = self.vs.variables();
        tch::no_grad(|| {
            for (name, mut target) in self.target_vs.variables() {
                if let Some(source) = online.get(&name) {
                    target.copy_(source);
                }
            }
        });
        info!("synchronized target mixing network");
    }

    /// Runs the full training loop: greedy rollouts into the replay buffer,
    /// gradient updates after warmup, target sync on a fixed cadence.
    pub fn train<I: SumoInterface>(
        &mut self,
        env: &mut TrafficSignalControlEnv<I>,
        episodes: u32,
    ) -> Result<(), TrainError> {
        for episode in 0..episodes {
            let reset = env.reset()?;
            let mut observations = reset.observations;
            let mut global_state = reset.global_state;
            let mut episode_reward = 0.0;
            let mut episode_loss = 0.0;
            let mut step: u64 = 0;

            loop {
                let actions = self.select_actions(&observations)?;
                let outcome = env.step(&actions)?;
                if outcome.done {
                    break;
                }
                let rewards = env.agent_rewards()?;
                episode_reward += rewards.values().sum::<f64>();

                self.buffer.push(Experience {
                    observations,
                    global_state,
                    actions,
                    rewards,
                    next_observations: outcome.observations.clone(),
                    next_global_state: outcome.global_state,
                    done: outcome.done,
                });
                observations = outcome.observations;
                global_state = outcome.global_state;

                if step >= self.config.warmup_steps {
                    if let Some(loss) = self.train_step()? {
                        episode_loss += loss;
                    }
                }
                step += 1;
                let interval = self.config.target_update_interval;
                if interval > 0 && step % interval == 0 {
                    self.sync_target();
                }
            }

            info!(
                "episode {episode}: loss {episode_loss:.4}, reward {episode_reward:.2} over {step} steps"
            );
        }
        Ok(())
    }

    /// Dumps every online parameter to `path`. Bare tensors, no metadata.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), TrainError> {
        self.vs.save(path)?;
        Ok(())
    }

    /// Restores online parameters from `path` and re-syncs the target copy.
    pub fn load<P: AsRef<Path>>(&mut self, path: P) -> Result<(), TrainError> {
        self.vs.load(path)?;
        self.sync_target();
        Ok(())
    }

    /// Each agent's maximal predicted Q-value over the selected observation
    /// field, stacked to `[batch, num_agents]` in agent order.
    fn stacked_max_qs<'a>(
        &self,
        batch: &'a [Experience],
        select: impl Fn(&'a Experience) -> &'a BTreeMap<Id, Vec<f64>> + Copy,
    ) -> Tensor {
        let columns: Vec<Tensor> = self
            .agent_ids
            .iter()
            .map(|id| {
                let obs = self.stack_observations(batch, id, select);
                let (max_q, _) = self.nets[id].forward(&obs).max_dim(1, false);
                max_q
            })
            .collect();
        Tensor::stack(&columns, 1)
    }

    fn float_tensor(&self, values: &[f64]) -> Tensor {
        let values: Vec<f32> = values.iter().map(|v| *v as f32).collect();
        Tensor::from_slice(&values).to_device(self.device)
    }

    fn stack_observations<'a>(
        &self,
        batch: &'a [Experience],
        id: &Id,
        select: impl Fn(&'a Experience) -> &'a BTreeMap<Id, Vec<f64>>,
    ) -> Tensor {
        let rows: Vec<Tensor> = batch
            .iter()
            .map(|e| self.float_tensor(&select(e)[id]))
            .collect();
        Tensor::stack(&rows, 0)
    }

    fn scalar_column(&self, batch: &[Experience], value: impl Fn(&Experience) -> f64) -> Tensor {
        let values: Vec<f32> = batch.iter().map(|e| value(e) as f32).collect();
        Tensor::from_slice(&values)
            .view([batch.len() as i64, 1])
            .to_kind(Kind::Float)
            .to_device(self.device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn specs() -> Vec<AgentSpec> {
        vec![
            AgentSpec {
                id: "A".to_string(),
                obs_dim: 3,
                action_dim: 2,
            },
            AgentSpec {
                id: "B".to_string(),
                obs_dim: 3,
                action_dim: 2,
            },
        ]
    }

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            batch_size: 4,
            buffer_capacity: 64,
            warmup_steps: 0,
            target_update_interval: 10,
            ..TrainingConfig::default()
        }
    }

    fn random_experience(rng: &mut StdRng) -> Experience {
        let obs = |rng: &mut StdRng| {
            BTreeMap::from([
                ("A".to_string(), vec![rng.gen(), rng.gen(), rng.gen()]),
                ("B".to_string(), vec![rng.gen(), rng.gen(), rng.gen()]),
            ])
        };
        Experience {
            observations: obs(rng),
            global_state: rng.gen_range(0.0..10.0),
            actions: BTreeMap::from([
                ("A".to_string(), rng.gen_range(0..2)),
                ("B".to_string(), rng.gen_range(0..2)),
            ]),
            rewards: BTreeMap::from([
                ("A".to_string(), -rng.gen_range(0.0..5.0)),
                ("B".to_string(), -rng.gen_range(0.0..5.0)),
            ]),
            next_observations: obs(rng),
            next_global_state: rng.gen_range(0.0..10.0),
            done: false,
        }
    }

    #[test]
    fn select_actions_covers_every_agent() {
        let coordinator =
            MarlCoordinator::new(small_config(), &specs(), 3, Device::Cpu).unwrap();
        let observations = BTreeMap::from([
            ("A".to_string(), vec![0.1, 0.2, 0.3]),
            ("B".to_string(), vec![1.0, 0.0, 2.0]),
        ]);

        let actions = coordinator.select_actions(&observations).unwrap();
        assert_eq!(actions.len(), 2);
        assert!(actions["A"] < 2);
        assert!(actions["B"] < 2);
    }

    #[test]
    fn select_actions_rejects_unknown_agents() {
        let coordinator =
            MarlCoordinator::new(small_config(), &specs(), 3, Device::Cpu).unwrap();
        let observations = BTreeMap::from([("Z".to_string(), vec![0.0, 0.0, 0.0])]);
        assert!(matches!(
            coordinator.select_actions(&observations),
            Err(TrainError::UnknownAgent(_))
        ));
    }

    #[test]
    fn train_step_waits_for_a_full_batch() {
        let mut coordinator =
            MarlCoordinator::new(small_config(), &specs(), 3, Device::Cpu).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..3 {
            coordinator.push_experience(random_experience(&mut rng));
        }
        assert!(coordinator.train_step().unwrap().is_none());

        coordinator.push_experience(random_experience(&mut rng));
        let loss = coordinator.train_step().unwrap().unwrap();
        assert!(loss.is_finite());
    }

    #[test]
    fn team_value_mixes_maximal_q_values() {
        let coordinator =
            MarlCoordinator::new(small_config(), &specs(), 3, Device::Cpu).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let batch: Vec<Experience> = (0..4).map(|_| random_experience(&mut rng)).collect();

        let stacked = coordinator.stacked_max_qs(&batch, |e| &e.observations);
        assert_eq!(stacked.size(), &[4, 2]);

        // Column per agent is the per-row maximum over that agent's
        // Q-values, regardless of the action stored in the experience.
        for (column, id) in ["A", "B"].iter().enumerate() {
            let id = id.to_string();
            let obs = coordinator.stack_observations(&batch, &id, |e| &e.observations);
            let (expected, _) = coordinator.nets[&id].forward(&obs).max_dim(1, false);
            let actual = stacked.narrow(1, column as i64, 1).squeeze_dim(1);
            assert!(actual.allclose(&expected, 1e-6, 1e-6, false));
        }
    }

    #[test]
    fn terminal_experiences_train_without_bootstrap() {
        let mut coordinator =
            MarlCoordinator::new(small_config(), &specs(), 3, Device::Cpu).unwrap();
        let mut rng = StdRng::seed_from_u64(13);
        for _ in 0..8 {
            let mut experience = random_experience(&mut rng);
            experience.done = true;
            coordinator.push_experience(experience);
        }

        let loss = coordinator.train_step().unwrap().unwrap();
        assert!(loss.is_finite());
    }

    #[test]
    fn train_runs_episodes_against_the_environment() {
        use crate::config::Config;
        use crate::simulator::SumoTrafficSimulator;
        use crate::sumo::mock::MockSumo;

        let mut sumo = MockSumo::new();
        sumo.add_traffic_light(
            "A",
            &[(30.0, "Gr"), (3.0, "yr")],
            &[("a_in", "ab_lane")],
        );
        sumo.add_traffic_light(
            "B",
            &[(30.0, "Gr"), (3.0, "yr")],
            &[("ab_lane", "ba_lane")],
        );
        sumo.add_lane("a_in", "e_a_in", &["ab_lane"]);
        sumo.add_lane("ab_lane", "e_ab", &["ba_lane"]);
        sumo.add_lane("ba_lane", "e_ba", &[]);
        sumo.set_edge_junction("e_ab", "B");
        sumo.set_edge_junction("e_ba", "A");
        sumo.end_time = 6.0;

        let mut config = Config::default();
        config.simulation.network_name = "testnet".to_string();
        let mut simulator = SumoTrafficSimulator::new(config, sumo).unwrap();
        simulator.initialize().unwrap();
        let mut env = TrafficSignalControlEnv::new(simulator);

        let specs = AgentSpec::from_env(&env).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].obs_dim, 3);
        assert_eq!(specs[0].action_dim, 2);

        let train_config = TrainingConfig {
            batch_size: 2,
            buffer_capacity: 32,
            warmup_steps: 0,
            target_update_interval: 3,
            ..TrainingConfig::default()
        };
        let mut coordinator =
            MarlCoordinator::new(train_config, &specs, 3, Device::Cpu).unwrap();

        coordinator.train(&mut env, 2).unwrap();
        assert!(!coordinator.buffer().is_empty());
    }

    #[test]
    fn target_follows_online_after_sync() {
        let mut coordinator =
            MarlCoordinator::new(small_config(), &specs(), 3, Device::Cpu).unwrap();

        // Train a few steps so online mixing weights drift from the target.
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..16 {
            coordinator.push_experience(random_experience(&mut rng));
        }
        for _ in 0..5 {
            coordinator.train_step().unwrap();
        }

        coordinator.sync_target();
        let online = coordinator.vs.variables();
        for (name, target) in coordinator.target_vs.variables() {
            let source = &online[&name];
            assert!(target.allclose(source, 1e-8, 1e-8, false), "{name} differs");
        }
    }
}
