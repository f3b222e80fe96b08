//! Metrics and CSV scalar logging for RL training

use std::collections::{BTreeMap, VecDeque};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::env::StepResult;

/// Mean over the last `window_size` values
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: VecDeque<f32>,
    window_size: usize,
    sum: f32,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.values.len() >= self.window_size {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
    }

    pub fn average(&self) -> f32 {
        if self.values.is_empty() {
            0.0
        } else {
            self.sum / self.values.len() as f32
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Rolling statistics collected while a learner runs
#[derive(Debug)]
pub struct TrainingMetrics {
    pub episode_rewards: MovingAverage,
    pub episode_lengths: MovingAverage,
    /// Named losses reported by the learner (`policy`, `critic`, `alpha`, ...)
    pub losses: BTreeMap<&'static str, MovingAverage>,
    /// Learner updates performed
    pub iteration: usize,
    /// Total environment steps across all envs
    pub total_timesteps: usize,
    /// Running reward per env for the current episode
    running_rewards: Vec<f32>,
    window_size: usize,
    start_time: Instant,
}

impl TrainingMetrics {
    pub fn new(window_size: usize) -> Self {
        Self {
            episode_rewards: MovingAverage::new(window_size),
            episode_lengths: MovingAverage::new(window_size),
            losses: BTreeMap::new(),
            iteration: 0,
            total_timesteps: 0,
            running_rewards: Vec::new(),
            window_size,
            start_time: Instant::now(),
        }
    }

    pub fn record_episode(&mut self, reward: f32, length: usize) {
        self.episode_rewards.push(reward);
        self.episode_lengths.push(length as f32);
    }

    /// Account one vectorized step. `results[i]` belongs to env `i`.
    pub fn track_steps(&mut self, results: &[StepResult]) {
        if self.running_rewards.len() < results.len() {
            self.running_rewards.resize(results.len(), 0.0);
        }

        self.total_timesteps += results.len();
        for (i, result) in results.iter().enumerate() {
            self.running_rewards[i] += result.reward;
            if result.done() {
                let reward = std::mem::take(&mut self.running_rewards[i]);
                self.record_episode(reward, result.info.steps);
            }
        }
    }

    /// Record a training loss under `name`
    pub fn record_loss(&mut self, name: &'static str, value: f32) {
        let window = self.window_size;
        self.losses
            .entry(name)
            .or_insert_with(|| MovingAverage::new(window))
            .push(value);
    }

    pub fn loss(&self, name: &str) -> Option<f32> {
        self.losses.get(name).map(MovingAverage::average)
    }

    /// Environment steps per wall-clock second since construction
    pub fn timesteps_per_second(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.total_timesteps as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn log_to_console(&self) {
        tracing::info!(
            "[{} updates] {} env steps at {:.1} steps/s",
            self.iteration,
            self.total_timesteps,
            self.timesteps_per_second()
        );
        if !self.episode_rewards.is_empty() {
            tracing::info!(
                "  last {} episodes: reward {:.2}, length {:.1}",
                self.episode_rewards.len(),
                self.episode_rewards.average(),
                self.episode_lengths.average(),
            );
        }
        let losses: Vec<String> = self
            .losses
            .iter()
            .map(|(name, avg)| format!("{}={:.4}", name, avg.average()))
            .collect();
        if !losses.is_empty() {
            tracing::info!("  Losses: {}", losses.join(", "));
        }
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Appends `step,value` rows to one CSV file per tag under `log_dir`
pub struct ScalarLogger {
    log_dir: PathBuf,
}

impl ScalarLogger {
    pub fn new(log_dir: impl AsRef<Path>) -> io::Result<Self> {
        std::fs::create_dir_all(log_dir.as_ref())?;
        Ok(Self {
            log_dir: log_dir.as_ref().to_path_buf(),
        })
    }

    /// Append one row to `<tag with '/' as '_'>.csv`, writing the header first
    pub fn log_scalar(&mut self, tag: &str, value: f32, step: usize) -> io::Result<()> {
        let path = self.log_dir.join(format!("{}.csv", tag.replace('/', "_")));
        let fresh = !path.exists();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if fresh {
            writeln!(file, "step,value")?;
        }
        writeln!(file, "{},{}", step, value)
    }

    /// Episode averages, every tracked loss and throughput at the current step
    pub fn log_metrics(&mut self, metrics: &TrainingMetrics) -> io::Result<()> {
        let step = metrics.total_timesteps;

        self.log_scalar("episode/reward", metrics.episode_rewards.average(), step)?;
        self.log_scalar("episode/length", metrics.episode_lengths.average(), step)?;

        for (name, avg) in &metrics.losses {
            self.log_scalar(&format!("losses/{}", name), avg.average(), step)?;
        }

        self.log_scalar("performance/sps", metrics.timesteps_per_second() as f32, step)
    }
}

/// Per-episode outcomes of a deterministic evaluation run
#[derive(Debug, Clone, Default)]
pub struct EvaluationMetrics {
    episodes: Vec<(f32, usize)>,
}

impl EvaluationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_episode(&mut self, reward: f32, steps: usize) {
        self.episodes.push((reward, steps));
    }

    pub fn num_episodes(&self) -> usize {
        self.episodes.len()
    }

    fn mean(&self, f: impl Fn(&(f32, usize)) -> f32) -> f32 {
        if self.episodes.is_empty() {
            return 0.0;
        }
        self.episodes.iter().map(f).sum::<f32>() / self.episodes.len() as f32
    }

    /// Mean episode reward, the quantity compared when tracking the best model
    pub fn avg_reward(&self) -> f32 {
        self.mean(|(reward, _)| *reward)
    }

    /// Population standard deviation of episode rewards
    pub fn std_reward(&self) -> f32 {
        let mean = self.avg_reward();
        self.mean(|(reward, _)| (reward - mean).powi(2)).sqrt()
    }

    pub fn avg_steps(&self) -> f32 {
        self.mean(|(_, steps)| *steps as f32)
    }

    pub fn print_summary(&self) {
        tracing::info!(
            "Evaluation over {} episode(s): reward {:.2} +/- {:.2}, length {:.1}",
            self.num_episodes(),
            self.avg_reward(),
            self.std_reward(),
            self.avg_steps()
        );
    }
}
