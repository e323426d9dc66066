//! Simulation session owner.
//!
//! [`SumoTrafficSimulator`] composes the simulator invocation, manages the
//! session lifecycle, discovers one [`TrafficLightController`] per signal,
//! builds the intersection interaction graph, injects stochastic incidents
//! and advances simulation time. Errors from the interface are logged with
//! context and propagated; a failed step aborts the run.

use std::collections::{BTreeMap, HashMap};

use log::{error, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{Config, ConfigError};
use crate::controller::{Observation, TrafficLightController};
use crate::graph::NetworkGraph;
use crate::sumo::{SumoCommand, SumoError, SumoInterface};
use crate::Id;

/// Speed increment forced onto the trailing vehicle during injection.
const ACCIDENT_SPEED_BOOST: f64 = 10.0;

/// Deceleration forced onto the leading vehicle (maximum braking).
const ACCIDENT_MAX_DECEL: f64 = 9.0;

/// Outcome of a single-agent step.
#[derive(Debug, Clone, PartialEq)]
pub enum SumoStep {
    /// The session hit its step budget or ran out of vehicles.
    Finished,
    /// The simulation advanced one timestep.
    Advanced {
        observation: Observation,
        /// Negation of the configured reward metric.
        reward: f64,
    },
}

/// Outcome of stepping the whole agent set within one timestep.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStep {
    Finished,
    Running {
        observations: BTreeMap<Id, Observation>,
    },
}

/// Owns the simulation session and exposes a uniform stepping/query surface.
///
/// Exactly one session is active at a time; "reset" is a full teardown and
/// reconnect, never an in-place mutation.
pub struct SumoTrafficSimulator<I: SumoInterface> {
    config: Config,
    sumo: I,
    rng: StdRng,
    /// Controller ids in discovery order; also the graph's node order.
    agent_ids: Vec<Id>,
    controllers: HashMap<Id, TrafficLightController>,
    graph: Option<NetworkGraph>,
    running: bool,
    truncated: bool,
    terminated: bool,
    step: u64,
    max_steps: u64,
}

impl<I: SumoInterface> SumoTrafficSimulator<I> {
    /// Creates a simulator over a validated configuration. No simulator
    /// contact happens here.
    pub fn new(config: Config, sumo: I) -> Result<Self, ConfigError> {
        config.validate()?;
        let seed = config.simulation.seed;
        Ok(Self {
            config,
            sumo,
            rng: StdRng::seed_from_u64(seed),
            agent_ids: Vec::new(),
            controllers: HashMap::new(),
            graph: None,
            running: false,
            truncated: false,
            terminated: false,
            step: 0,
            max_steps: 0,
        })
    }

    /// Starts the session, discovers all signals, instantiates one
    /// controller per signal and builds the intersection graph.
    pub fn initialize(&mut self) -> Result<(), SumoError> {
        info!(
            "initializing simulation for network `{}`",
            self.config.simulation.network_name
        );
        self.connect()?;

        self.agent_ids = self.sumo.traffic_light_ids().map_err(|e| {
            error!("discovering traffic lights: {e}");
            e
        })?;
        self.controllers = HashMap::with_capacity(self.agent_ids.len());
        for tls_id in self.agent_ids.clone() {
            let controller = TrafficLightController::new(
                tls_id.clone(),
                &self.config,
                &mut self.sumo,
                &mut self.rng,
            )?;
            self.controllers.insert(tls_id, controller);
        }
        info!(
            "discovered {} signalized intersections",
            self.agent_ids.len()
        );

        self.build_graph()?;
        Ok(())
    }

    /// Opens a session and derives the step budget from the configured
    /// simulation end time.
    pub fn connect(&mut self) -> Result<(), SumoError> {
        let command = SumoCommand::compose(&self.config.simulation);
        self.sumo.start(&command).map_err(|e| {
            error!("starting simulator session: {e}");
            e
        })?;
        self.running = true;
        self.truncated = false;
        self.terminated = false;
        self.max_steps = self.sumo.end_time()? as u64;
        self.step = self.sumo.time()? as u64;
        Ok(())
    }

    /// Closes the session. Idempotent.
    pub fn close(&mut self) -> Result<(), SumoError> {
        if self.running {
            info!("closing simulator session");
            self.sumo.close()?;
            self.running = false;
            self.terminated = true;
        }
        Ok(())
    }

    /// Full session restart: teardown, reconnect and reset every controller
    /// to a random initial phase.
    pub fn reset_session(&mut self) -> Result<(), SumoError> {
        info!("resetting simulator session");
        self.close()?;
        self.connect()?;
        for tls_id in &self.agent_ids {
            let controller = self
                .controllers
                .get_mut(tls_id)
                .ok_or_else(|| SumoError::unknown("traffic light", tls_id.clone()))?;
            controller.reset_tl(&mut self.sumo, &mut self.rng)?;
        }
        Ok(())
    }

    /// Rebuilds the intersection interaction graph from current topology.
    pub fn build_graph(&mut self) -> Result<(), SumoError> {
        let graph = NetworkGraph::build(&self.sumo, &self.agent_ids).map_err(|e| {
            error!("building intersection graph: {e}");
            e
        })?;
        self.graph = Some(graph);
        Ok(())
    }

    /// Forces a rear-end collision on the first lane holding at least two
    /// vehicles: the leader brakes to a stop at maximum deceleration while
    /// the follower's speed safety is disabled and its speed boosted.
    pub fn simulate_accident(&mut self) -> Result<(), SumoError> {
        for lane in self.sumo.lane_ids()? {
            let vehicles = self.sumo.vehicles_on_lane(&lane)?;
            if vehicles.len() < 2 {
                continue;
            }
            let leader = &vehicles[0];
            let follower = &vehicles[1];

            self.sumo.set_vehicle_speed(leader, 0.0)?;
            self.sumo.set_vehicle_decel(leader, ACCIDENT_MAX_DECEL)?;

            self.sumo.set_vehicle_speed_mode(follower, 0)?;
            let speed = self.sumo.vehicle_speed(follower)?;
            self.sumo
                .set_vehicle_speed(follower, speed + ACCIDENT_SPEED_BOOST)?;

            info!("injected incident between {leader} and {follower} on lane {lane}");
            return Ok(());
        }
        info!("no lane holds two vehicles; incident injection skipped");
        Ok(())
    }

    /// Checks the two accident triggers. They are independent; both may
    /// fire within the same step.
    fn maybe_inject_accident(&mut self) -> Result<(), SumoError> {
        let accident = self.config.simulation.accident.clone();
        if let Some(interval) = accident.interval {
            if interval > 0 && self.step % interval == 0 {
                self.simulate_accident()?;
            }
        }
        if accident.probability > 0.0 && self.rng.gen_bool(accident.probability) {
            self.simulate_accident()?;
        }
        Ok(())
    }

    /// Evaluates termination conditions, updating the session flags.
    fn check_done(&mut self) -> Result<bool, SumoError> {
        if self.step >= self.max_steps {
            info!("step budget exhausted at step {}", self.step);
            self.truncated = true;
            return Ok(true);
        }
        if self.sumo.min_expected_vehicles()? == 0 {
            info!("all vehicles arrived at step {}", self.step);
            self.terminated = true;
            return Ok(true);
        }
        Ok(false)
    }

    /// Applies one agent's action and advances the simulation one timestep.
    ///
    /// Termination conditions are checked first; the reward is the negation
    /// of the configured reward metric, so minimizing that metric maximizes
    /// reward.
    pub fn sumo_step(&mut self, agent_id: &str, action: usize) -> Result<SumoStep, SumoError> {
        if self.check_done()? {
            return Ok(SumoStep::Finished);
        }
        self.maybe_inject_accident()?;

        let controller = self
            .controllers
            .get_mut(agent_id)
            .ok_or_else(|| SumoError::unknown("traffic light", agent_id))?;
        controller.pseudo_step(&mut self.sumo, action)?;

        self.sumo.simulation_step().map_err(|e| {
            error!("advancing simulation at step {}: {e}", self.step);
            e
        })?;
        self.step += 1;

        let controller = &self.controllers[agent_id];
        let observation = controller.collect_data(&self.sumo)?;
        let reward = -observation
            .metric(self.config.metrics.reward_metric)
            .unwrap_or(0.0);

        Ok(SumoStep::Advanced {
            observation,
            reward,
        })
    }

    /// Applies every agent's action within a single simulator timestep and
    /// collects post-step observations for the whole agent set.
    pub fn step_all(&mut self, actions: &BTreeMap<Id, usize>) -> Result<SessionStep, SumoError> {
        if self.check_done()? {
            return Ok(SessionStep::Finished);
        }
        self.maybe_inject_accident()?;

        for (agent_id, action) in actions {
            let controller = self
                .controllers
                .get_mut(agent_id)
                .ok_or_else(|| SumoError::unknown("traffic light", agent_id.clone()))?;
            controller.pseudo_step(&mut self.sumo, *action)?;
        }

        self.sumo.simulation_step().map_err(|e| {
            error!("advancing simulation at step {}: {e}", self.step);
            e
        })?;
        self.step += 1;

        Ok(SessionStep::Running {
            observations: self.observe_all()?,
        })
    }

    /// Collects the current observation of every agent without stepping.
    pub fn observe_all(&self) -> Result<BTreeMap<Id, Observation>, SumoError> {
        let mut observations = BTreeMap::new();
        for tls_id in &self.agent_ids {
            let observation = self.controllers[tls_id].collect_data(&self.sumo)?;
            observations.insert(tls_id.clone(), observation);
        }
        Ok(observations)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying interface.
    pub fn interface(&self) -> &I {
        &self.sumo
    }

    /// Controller ids in discovery order.
    pub fn agent_ids(&self) -> &[Id] {
        &self.agent_ids
    }

    pub fn controller(&self, tls_id: &str) -> Option<&TrafficLightController> {
        self.controllers.get(tls_id)
    }

    /// The intersection graph, once built.
    pub fn graph(&self) -> Option<&NetworkGraph> {
        self.graph.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn current_step(&self) -> u64 {
        self.step
    }

    pub fn max_steps(&self) -> u64 {
        self.max_steps
    }
}
