//! oido CLI - demos and diagnostics for the oido audio device library.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "oido")]
#[command(author, version, about = "Oido audio device CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List audio devices
    Devices(commands::devices::DevicesArgs),

    /// Play a test tone
    Play(commands::play::PlayArgs),

    /// Capture audio and print input levels
    Capture(commands::capture::CaptureArgs),
}

fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();
    tracing::debug!(command = ?std::mem::discriminant(&cli.command), "dispatching command");
    match cli.command {
        Commands::Devices(args) => commands::devices::run(args),
        Commands::Play(args) => commands::play::run(args),
        Commands::Capture(args) => commands::capture::run(args),
    }
}
