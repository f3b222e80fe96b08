//! RL Environment - gym-like interface over the observation/action schema
//!
//! The dynamics are a stand-in: every observation is an independent uniform
//! draw within the observation bounds, so the training and export pipeline can
//! run without a live game. Replace `sample_observation` with a real game
//! bridge for actual training.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::schema::{self, ACTION_SIZE, Action, BoxSpace, OBS_SIZE, Observation};

/// Environment configuration
#[derive(Debug, Clone)]
pub struct EnvConfig {
    /// Episode ends when the step counter reaches this value
    pub max_episode_steps: usize,
    /// Constant reward for each step
    pub step_penalty: f32,
    /// Seed for the observation generator; `None` draws from OS entropy
    pub seed: Option<u64>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            max_episode_steps: 5000,
            step_penalty: -0.01,
            seed: None,
        }
    }
}

/// Step result from the environment
#[derive(Debug, Clone)]
pub struct StepResult {
    /// Next observation
    pub observation: Observation,
    pub reward: f32,
    /// Episode reached `max_episode_steps`
    pub terminated: bool,
    /// Always false for the stand-in dynamics
    pub truncated: bool,
    pub info: StepInfo,
}

impl StepResult {
    pub fn done(&self) -> bool {
        self.terminated || self.truncated
    }
}

/// Additional information from a step
#[derive(Debug, Clone, Default)]
pub struct StepInfo {
    /// Steps taken this episode
    pub steps: usize,
    /// Set by [`VecEnv`] when the episode ended and the env was reset;
    /// `StepResult::observation` then holds the first observation of the
    /// next episode.
    pub terminal_observation: Option<Observation>,
}

/// Vehicle-and-ball environment with schema-aligned spaces
pub struct RocketLeagueEnv {
    config: EnvConfig,
    observation_space: BoxSpace<OBS_SIZE>,
    action_space: BoxSpace<ACTION_SIZE>,
    steps: usize,
    rng: StdRng,
}

impl RocketLeagueEnv {
    pub fn new(config: EnvConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Self {
            config,
            observation_space: *schema::observation_space(),
            action_space: *schema::action_space(),
            steps: 0,
            rng,
        }
    }

    /// Reset the step counter and draw a first observation
    pub fn reset(&mut self) -> Observation {
        self.steps = 0;
        self.sample_observation()
    }

    /// Reset and reseed the observation generator
    pub fn reset_with_seed(&mut self, seed: u64) -> Observation {
        self.rng = StdRng::seed_from_u64(seed);
        self.reset()
    }

    /// Take a step. The action is accepted as-is; bounds are not enforced.
    pub fn step(&mut self, _action: &Action) -> StepResult {
        self.steps += 1;

        let observation = self.sample_observation();
        let terminated = self.steps >= self.config.max_episode_steps;

        StepResult {
            observation,
            reward: self.config.step_penalty,
            terminated,
            truncated: false,
            info: StepInfo {
                steps: self.steps,
                terminal_observation: None,
            },
        }
    }

    fn sample_observation(&mut self) -> Observation {
        self.observation_space.sample(&mut self.rng)
    }

    pub fn observation_space(&self) -> &BoxSpace<OBS_SIZE> {
        &self.observation_space
    }

    pub fn action_space(&self) -> &BoxSpace<ACTION_SIZE> {
        &self.action_space
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn max_episode_steps(&self) -> usize {
        self.config.max_episode_steps
    }
}

/// Batch environment for parallel rollout collection. Finished episodes are
/// reset automatically.
pub struct VecEnv {
    envs: Vec<RocketLeagueEnv>,
    parallel: bool,
}

impl VecEnv {
    pub fn new(envs: Vec<RocketLeagueEnv>) -> Self {
        Self {
            envs,
            parallel: false,
        }
    }

    /// `n` environments seeded `seed, seed + 1, ...`, wrapping at `u64::MAX`
    pub fn seeded(n: usize, seed: u64, config: &EnvConfig) -> Self {
        let envs = (0..n.max(1))
            .map(|i| {
                RocketLeagueEnv::new(EnvConfig {
                    seed: Some(seed.wrapping_add(i as u64)),
                    ..config.clone()
                })
            })
            .collect();
        Self::new(envs)
    }

    /// Step the environments on scoped worker threads
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Reset all environments
    pub fn reset_all(&mut self) -> Vec<Observation> {
        self.envs.iter_mut().map(|e| e.reset()).collect()
    }

    /// Step all environments, one action each
    pub fn step_all(&mut self, actions: &[Action]) -> Vec<StepResult> {
        debug_assert_eq!(actions.len(), self.envs.len());

        if self.parallel && self.envs.len() > 1 {
            std::thread::scope(|scope| {
                let handles: Vec<_> = self
                    .envs
                    .iter_mut()
                    .zip(actions.iter())
                    .map(|(env, action)| scope.spawn(move || Self::step_and_reset(env, action)))
                    .collect();
                handles
                    .into_iter()
                    .map(|h| match h.join() {
                        Ok(result) => result,
                        Err(panic) => std::panic::resume_unwind(panic),
                    })
                    .collect()
            })
        } else {
            self.envs
                .iter_mut()
                .zip(actions.iter())
                .map(|(env, action)| Self::step_and_reset(env, action))
                .collect()
        }
    }

    fn step_and_reset(env: &mut RocketLeagueEnv, action: &Action) -> StepResult {
        let mut result = env.step(action);
        if result.done() {
            let terminal = result.observation;
            result.observation = env.reset();
            result.info.terminal_observation = Some(terminal);
        }
        result
    }

    /// Get batch size
    pub fn num_envs(&self) -> usize {
        self.envs.len()
    }
}
