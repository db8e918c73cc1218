//! CLI subcommands.

pub mod capture;
pub mod devices;
pub mod play;

use clap::ValueEnum;
use oido_io::{BackendKind, Context};

/// Backend selection shared by every subcommand.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BackendArg {
    Alsa,
    Cpal,
    Null,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Alsa => BackendKind::Alsa,
            BackendArg::Cpal => BackendKind::Cpal,
            BackendArg::Null => BackendKind::Null,
        }
    }
}

/// Build a context for the requested backend, or walk the default
/// priority list.
pub fn context(backend: Option<BackendArg>) -> anyhow::Result<Context> {
    let context = match backend {
        Some(kind) => Context::with_backends(&[kind.into()])?,
        None => Context::new()?,
    };
    Ok(context)
}
