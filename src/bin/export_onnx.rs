//! Export a trained checkpoint to ONNX
//!
//! The graph takes `obs [batch, 25]` and returns `action [batch, 7]`.

use std::path::PathBuf;
use std::process::ExitCode;

use boostrap_bot::export::{self, DEFAULT_OPSET};
use clap::Parser;
use dotenv::dotenv;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "export-onnx")]
#[command(about = "Export a trained PPO, SAC or DDPG policy to ONNX", long_about = None)]
struct Cli {
    /// Checkpoint file or stem
    model: PathBuf,

    /// Output path; `.onnx` is appended when it has no extension
    output: PathBuf,

    /// ONNX opset version
    #[arg(long, env = "BOOSTRAP_OPSET", default_value_t = DEFAULT_OPSET)]
    opset: i64,
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("boostrap_bot=info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn main() -> ExitCode {
    dotenv().ok();
    init_logging();
    let cli = Cli::parse();

    let output = export::with_onnx_extension(&cli.output);
    match export::export_policy_to_onnx(&cli.model, &output, cli.opset) {
        Ok(path) => {
            println!("Exported policy to {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
