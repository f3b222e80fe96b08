//! Experience storage: on-policy rollouts and off-policy replay

use rand::Rng;
use rand::seq::index;

use crate::schema::{Action, Observation};

/// Rollout storage for PPO, laid out `[timestep][env]`
#[derive(Debug, Clone, Default)]
pub struct RolloutBuffer {
    pub observations: Vec<Vec<Observation>>,
    /// Unclipped actions as sampled from the policy
    pub actions: Vec<Vec<Action>>,
    pub log_probs: Vec<Vec<f32>>,
    pub rewards: Vec<Vec<f32>>,
    /// Episode ended after this step
    pub dones: Vec<Vec<bool>>,
    pub values: Vec<Vec<f32>>,
}

impl RolloutBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        observations: Vec<Observation>,
        actions: Vec<Action>,
        log_probs: Vec<f32>,
        rewards: Vec<f32>,
        dones: Vec<bool>,
        values: Vec<f32>,
    ) {
        self.observations.push(observations);
        self.actions.push(actions);
        self.log_probs.push(log_probs);
        self.rewards.push(rewards);
        self.dones.push(dones);
        self.values.push(values);
    }

    /// Timesteps stored
    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn num_envs(&self) -> usize {
        self.rewards.first().map_or(0, Vec::len)
    }

    pub fn clear(&mut self) {
        self.observations.clear();
        self.actions.clear();
        self.log_probs.clear();
        self.rewards.clear();
        self.dones.clear();
        self.values.clear();
    }

    /// Compute returns and advantages using GAE, independently per env.
    ///
    /// `last_values` are the value estimates of the observations following
    /// the final stored step. Both outputs are flattened `[timestep][env]`.
    pub fn compute_returns_and_advantages(
        &self,
        last_values: &[f32],
        gamma: f32,
        gae_lambda: f32,
    ) -> (Vec<f32>, Vec<f32>) {
        let n = self.len();
        let n_envs = self.num_envs();
        let mut returns = vec![0.0; n * n_envs];
        let mut advantages = vec![0.0; n * n_envs];

        for env in 0..n_envs {
            let mut gae = 0.0;
            let mut next_value = last_values.get(env).copied().unwrap_or(0.0);

            for t in (0..n).rev() {
                let not_done = if self.dones[t][env] { 0.0 } else { 1.0 };
                let value = self.values[t][env];
                let delta = self.rewards[t][env] + gamma * next_value * not_done - value;
                gae = delta + gamma * gae_lambda * not_done * gae;
                advantages[t * n_envs + env] = gae;
                returns[t * n_envs + env] = gae + value;
                next_value = value;
            }
        }

        (returns, advantages)
    }

    /// Flattened observations in `[timestep][env]` order
    pub fn flat_observations(&self) -> Vec<Observation> {
        self.observations.iter().flatten().copied().collect()
    }

    pub fn flat_actions(&self) -> Vec<Action> {
        self.actions.iter().flatten().copied().collect()
    }

    pub fn flat_log_probs(&self) -> Vec<f32> {
        self.log_probs.iter().flatten().copied().collect()
    }
}

/// One stored transition. Actions are kept in `[-1, 1]` space.
#[derive(Debug, Clone, Copy)]
pub struct Transition {
    pub observation: Observation,
    pub action: Action,
    pub reward: f32,
    pub next_observation: Observation,
    pub done: bool,
}

/// Fixed-capacity ring buffer for off-policy learners
#[derive(Debug, Clone)]
pub struct ReplayBuffer {
    transitions: Vec<Transition>,
    capacity: usize,
    next: usize,
}

/// Column-major batch drawn from a [`ReplayBuffer`]
#[derive(Debug, Clone, Default)]
pub struct ReplayBatch {
    pub observations: Vec<Observation>,
    pub actions: Vec<Action>,
    pub rewards: Vec<f32>,
    pub next_observations: Vec<Observation>,
    pub dones: Vec<f32>,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            transitions: Vec::with_capacity(capacity.min(4096)),
            capacity,
            next: 0,
        }
    }

    /// Store a transition, overwriting the oldest one when full
    pub fn push(&mut self, transition: Transition) {
        if self.transitions.len() < self.capacity {
            self.transitions.push(transition);
        } else {
            self.transitions[self.next] = transition;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Uniform sample without replacement of up to `batch_size` transitions
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, batch_size: usize) -> ReplayBatch {
        let amount = batch_size.min(self.len());
        let mut batch = ReplayBatch::default();
        for i in index::sample(rng, self.len(), amount).iter() {
            let t = &self.transitions[i];
            batch.observations.push(t.observation);
            batch.actions.push(t.action);
            batch.rewards.push(t.reward);
            batch.next_observations.push(t.next_observation);
            batch.dones.push(if t.done { 1.0 } else { 0.0 });
        }
        batch
    }
}
