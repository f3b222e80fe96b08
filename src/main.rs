use std::path::PathBuf;

use boostrap_bot::export::{self, DEFAULT_OPSET};
use boostrap_bot::rl::{
    AlgorithmKind, EnvConfig, TrainConfig, Trainer, TrainingBackend, default_device,
};
use clap::Parser;
use dotenv::dotenv;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Train a driving policy against the stand-in environment
#[derive(Parser)]
#[command(name = "boostrap-bot")]
#[command(about = "Train a PPO, SAC or DDPG driving policy", long_about = None)]
struct Cli {
    /// Algorithm (PPO, SAC, DDPG)
    #[arg(long, env = "BOOSTRAP_ALGO", default_value = "PPO")]
    algo: AlgorithmKind,

    /// Total environment steps
    #[arg(long, env = "BOOSTRAP_STEPS", default_value_t = 100_000)]
    steps: usize,

    /// Directory for checkpoints, best model, progress logs and the final model
    #[arg(long, env = "BOOSTRAP_SAVE_DIR", default_value = "runs")]
    save_dir: PathBuf,

    /// Random seed
    #[arg(long, env = "BOOSTRAP_SEED", default_value_t = 0)]
    seed: u64,

    /// Parallel environments (PPO only)
    #[arg(long, env = "BOOSTRAP_N_ENVS", default_value_t = 4)]
    n_envs: usize,

    /// Episode length of the stand-in environment
    #[arg(long, env = "BOOSTRAP_MAX_EPISODE_STEPS", default_value_t = 5000)]
    max_episode_steps: usize,

    /// Checkpoint to resume from
    #[arg(long, env = "BOOSTRAP_LOAD")]
    load: Option<PathBuf>,

    /// Export the final policy to this ONNX file
    #[arg(long, env = "BOOSTRAP_EXPORT_ONNX")]
    export_onnx: Option<PathBuf>,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("boostrap_bot=debug,info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    init_logging();
    let cli = Cli::parse();

    let config = TrainConfig {
        algorithm: cli.algo,
        total_timesteps: cli.steps,
        save_dir: cli.save_dir,
        seed: cli.seed,
        n_envs: cli.n_envs,
        env_config: EnvConfig {
            max_episode_steps: cli.max_episode_steps,
            ..EnvConfig::default()
        },
        ..TrainConfig::default()
    };

    let mut trainer = Trainer::<TrainingBackend>::new(config, default_device())?;
    if let Some(path) = &cli.load {
        trainer.resume(path)?;
    }
    let final_model = trainer.train()?;
    tracing::info!("Final model saved to {}", final_model.display());

    if let Some(output) = &cli.export_onnx {
        let output = export::with_onnx_extension(output);
        let path = export::export_policy_to_onnx(&final_model, &output, DEFAULT_OPSET)?;
        println!("Exported policy to {}", path.display());
    }

    Ok(())
}
