use std::path::PathBuf;

use clap::{Parser, Subcommand};
use cli_support::PipelineArgs;

/// Command line interface for the screening pipeline.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "earscope",
    author,
    version,
    about = "Otoscopy screening: two-stage ear classifier with Grad-CAM overlays and referral triage"
)]
pub struct Cli {
    #[command(flatten)]
    pub pipeline: PipelineArgs,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Screen one image and print the result JSON with an inline overlay.
    Predict {
        /// Image file (JPEG, PNG, TIFF or WebP).
        image: PathBuf,
    },
    /// Screen several images, storing overlays under the overlay directory.
    Batch {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Print the effective configuration.
    Config,
}
