//! Bounded experience replay.

use std::collections::{BTreeMap, VecDeque};

use rand::Rng;

use crate::Id;

/// One stored team transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Experience {
    /// Per-agent flattened observations before the step.
    pub observations: BTreeMap<Id, Vec<f64>>,
    /// Global state before the step.
    pub global_state: f64,
    /// Per-agent actions taken.
    pub actions: BTreeMap<Id, usize>,
    /// Per-agent rewards observed after the step.
    pub rewards: BTreeMap<Id, f64>,
    /// Per-agent flattened observations after the step.
    pub next_observations: BTreeMap<Id, Vec<f64>>,
    /// Global state after the step.
    pub next_global_state: f64,
    /// The episode ended on this step.
    pub done: bool,
}

/// Fixed-capacity replay buffer with strict FIFO eviction.
#[derive(Debug)]
pub struct ReplayBuffer {
    experiences: VecDeque<Experience>,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            experiences: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an experience, evicting the oldest one at capacity.
    pub fn push(&mut self, experience: Experience) {
        if self.experiences.len() == self.capacity {
            self.experiences.pop_front();
        }
        self.experiences.push_back(experience);
    }

    pub fn len(&self) -> usize {
        self.experiences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.experiences.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Draws `n` experiences uniformly, without replacement within the call.
    /// At most `len()` experiences are returned.
    pub fn sample<R: Rng>(&self, rng: &mut R, n: usize) -> Vec<&Experience> {
        let n = n.min(self.experiences.len());
        rand::seq::index::sample(rng, self.experiences.len(), n)
            .into_iter()
            .map(|i| &self.experiences[i])
            .collect()
    }

    /// Stored experiences, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Experience> {
        self.experiences.iter()
    }
}
