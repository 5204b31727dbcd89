//! EarScope: otoscopy screening with a two-stage classifier cascade, referral
//! triage and Grad-CAM explanations.

pub mod cli;

pub use cli_support;
pub use data_contracts;
pub use inference;
pub use models;
pub use vision_core;

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use data_contracts::ScreeningRecord;
use inference::{
    BatchInput, BatchItem, ClassifierFactory, PipelineConfig, ScreeningError, ScreeningPipeline,
};

use crate::cli::{Cli, Command};

/// Execute one CLI invocation, writing its JSON to `out`.
pub fn run<W: Write>(cli: &Cli, out: &mut W) -> Result<()> {
    let cfg = cli
        .pipeline
        .resolve()
        .context("failed to resolve configuration")?;
    tracing::debug!(?cfg, "configuration resolved");
    match &cli.command {
        Command::Config => {
            serde_json::to_writer_pretty(&mut *out, &cfg)?;
        }
        Command::Predict { image } => {
            let pipeline = load_pipeline(&cfg)?;
            let bytes = read_image(image)?;
            let artifact = pipeline
                .screen(&bytes, file_label(image).as_deref())
                .with_context(|| format!("failed to screen {}", image.display()))?;
            serde_json::to_writer_pretty(&mut *out, &ScreeningRecord::single(&artifact))?;
        }
        Command::Batch { images } => {
            let pipeline = load_pipeline(&cfg)?;
            // Unreadable files fail in their own slot; the rest are screened.
            let mut inputs = Vec::with_capacity(images.len());
            let mut slots = Vec::with_capacity(images.len());
            for path in images {
                let id = file_label(path).unwrap_or_else(|| path.display().to_string());
                match fs::read(path) {
                    Ok(bytes) => {
                        inputs.push(BatchInput::new(id, bytes));
                        slots.push(None);
                    }
                    Err(source) => {
                        tracing::warn!(path = %path.display(), error = %source, "batch input unreadable");
                        slots.push(Some(BatchItem {
                            id,
                            result: Err(ScreeningError::Read {
                                path: path.clone(),
                                source,
                            }),
                        }));
                    }
                }
            }
            let mut screened = pipeline.process_batch(&inputs).into_iter();
            let items: Vec<BatchItem> = slots
                .into_iter()
                .filter_map(|slot| slot.or_else(|| screened.next()))
                .collect();
            serde_json::to_writer_pretty(&mut *out, &ScreeningPipeline::batch_response(&items))?;
        }
    }
    writeln!(out)?;
    Ok(())
}

fn load_pipeline(cfg: &PipelineConfig) -> Result<ScreeningPipeline> {
    ScreeningPipeline::from_config(cfg, &ClassifierFactory::default())
        .context("failed to initialise the screening pipeline")
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn file_label(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
}
