//! Command line interface.

pub mod command;

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::{config::Settings, source::SourceKind};

#[derive(Parser)]
#[command(version, about, long_about = None)]
/// Keeps a local copy of DWD open weather data up to date
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll every enabled source forever
    Run {},
    /// Run a single cycle of one source and exit
    Once {
        #[arg(value_enum)]
        source: SourceKind,
    },
}

/// Creates a progress bar over the files of one cycle.
pub fn create_progress_bar(message: String) -> ProgressBar {
    let style = ProgressStyle::with_template("[{eta_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");

    ProgressBar::new(0).with_message(message).with_style(style)
}
