//! Value networks using tch-rs (PyTorch bindings).
//!
//! Per-agent Q-networks plus the hypernetwork that mixes their Q-values
//! into a team value. Only available with the `rl-nn` feature.

use tch::{nn, nn::Module, Tensor};

/// Per-agent Q-network.
///
/// Architecture: `obs_dim → hidden_dim → action_dim` with a ReLU activation.
pub struct QNetwork {
    net: nn::Sequential,
    action_dim: usize,
}

impl QNetwork {
    /// Builds the network under the given variable-store path, so several
    /// networks can share one store and one optimizer.
    pub fn new(path: &nn::Path, obs_dim: usize, hidden_dim: usize, action_dim: usize) -> Self {
        let net = nn::seq()
            .add(nn::linear(
                path / "fc1",
                obs_dim as i64,
                hidden_dim as i64,
                Default::default(),
            ))
            .add_fn(|x| x.relu())
            .add(nn::linear(
                path / "fc2",
                hidden_dim as i64,
                action_dim as i64,
                Default::default(),
            ));
        Self { net, action_dim }
    }

    /// Forward pass: Q-values over actions, shape `[batch, action_dim]`.
    pub fn forward(&self, obs: &Tensor) -> Tensor {
        self.net.forward(obs)
    }

    pub fn action_dim(&self) -> usize {
        self.action_dim
    }
}

/// Weight tensors one state batch induces on the mixing computation.
struct MixingWeights {
    /// `[batch, num_agents, embed_dim]`, non-negative.
    w1: Tensor,
    /// `[batch, 1, embed_dim]`.
    b1: Tensor,
    /// `[batch, embed_dim, 1]`, non-negative.
    w2: Tensor,
    /// `[batch, 1, 1]`.
    b2: Tensor,
}

/// Hypernetwork mixing per-agent Q-values into a team value.
///
/// The layer weights are generated from the global state and passed through
/// `abs`, keeping the team value monotone in every agent's Q-value.
pub struct MixingNetwork {
    hyper_w1: nn::Sequential,
    hyper_w2: nn::Sequential,
    hyper_b1: nn::Linear,
    hyper_b2: nn::Sequential,
    num_agents: usize,
    embed_dim: usize,
}

impl MixingNetwork {
    pub fn new(
        path: &nn::Path,
        num_agents: usize,
        state_dim: usize,
        embed_dim: usize,
    ) -> Self {
        let (s, e, n) = (state_dim as i64, embed_dim as i64, num_agents as i64);
        let hyper_w1 = nn::seq()
            .add(nn::linear(path / "hyper_w1_0", s, e, Default::default()))
            .add_fn(|x| x.relu())
            .add(nn::linear(path / "hyper_w1_2", e, n * e, Default::default()));
        let hyper_w2 = nn::seq()
            .add(nn::linear(path / "hyper_w2_0", s, e, Default::default()))
            .add_fn(|x| x.relu())
            .add(nn::linear(path / "hyper_w2_2", e, e, Default::default()));
        let hyper_b1 = nn::linear(path / "hyper_b1", s, e, Default::default());
        let hyper_b2 = nn::seq()
            .add(nn::linear(path / "hyper_b2_0", s, e, Default::default()))
            .add_fn(|x| x.relu())
            .add(nn::linear(path / "hyper_b2_2", e, 1, Default::default()));

        Self {
            hyper_w1,
            hyper_w2,
            hyper_b1,
            hyper_b2,
            num_agents,
            embed_dim,
        }
    }

    fn weights(&self, state: &Tensor) -> MixingWeights {
        let batch = state.size()[0];
        let (n, e) = (self.num_agents as i64, self.embed_dim as i64);
        MixingWeights {
            w1: self.hyper_w1.forward(state).abs().view([batch, n, e]),
            b1: self.hyper_b1.forward(state).view([batch, 1, e]),
            w2: self.hyper_w2.forward(state).abs().view([batch, e, 1]),
            b2: self.hyper_b2.forward(state).view([batch, 1, 1]),
        }
    }

    fn mix(agent_qs: &Tensor, weights: &MixingWeights) -> Tensor {
        let batch = agent_qs.size()[0];
        let qs = agent_qs.view([batch, 1, -1]);
        let hidden = (qs.bmm(&weights.w1) + &weights.b1).elu();
        (hidden.bmm(&weights.w2) + &weights.b2).view([batch])
    }

    /// Mixes `[batch, num_agents]` Q-values under a `[batch, state_dim]`
    /// global state into a `[batch]` team value.
    pub fn forward(&self, agent_qs: &Tensor, state: &Tensor) -> Tensor {
        Self::mix(agent_qs, &self.weights(state))
    }

    pub fn num_agents(&self) -> usize {
        self.num_agents
    }
}
