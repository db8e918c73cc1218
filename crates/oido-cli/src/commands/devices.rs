//! Device enumeration command.

use super::BackendArg;
use clap::Args;
use oido_io::Direction;

#[derive(Args)]
pub struct DevicesArgs {
    /// Backend to query (default: best available)
    #[arg(long, value_enum)]
    backend: Option<BackendArg>,
}

pub fn run(args: DevicesArgs) -> anyhow::Result<()> {
    let context = super::context(args.backend)?;
    println!("Backend: {}", context.backend_kind());

    for direction in [Direction::Playback, Direction::Capture] {
        let devices = context.devices(direction)?;
        println!("\n{direction} devices:");
        if devices.is_empty() {
            println!("  (none)");
        }
        for (index, device) in devices.iter().enumerate() {
            println!("  [{index}] {}", device.name);
        }
    }
    Ok(())
}
