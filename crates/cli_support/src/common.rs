use clap::Args;
use inference::config::parse_size;
use inference::{ConfigError, PipelineConfig};
use std::path::PathBuf;

/// Checkpoint overrides for the two cascade stages.
#[derive(Debug, Clone, Default, Args)]
pub struct ModelArgs {
    /// Stage-1 (Normal/Abnormal/Earwax) checkpoint, without the `.bin` extension.
    #[arg(long)]
    pub stage1_weights: Option<PathBuf>,
    /// Stage-2 (AOM/COM) checkpoint, without the `.bin` extension.
    #[arg(long)]
    pub stage2_weights: Option<PathBuf>,
}

/// Referral threshold override.
#[derive(Debug, Clone, Default, Args)]
pub struct TriageArgs {
    /// Normal/Earwax confidence at or above this needs no referral.
    #[arg(long)]
    pub threshold: Option<f32>,
}

/// Where batch overlays are written and served.
#[derive(Debug, Clone, Default, Args)]
pub struct OverlayArgs {
    #[arg(long)]
    pub overlay_dir: Option<PathBuf>,
    /// URL prefix the overlay directory is served under.
    #[arg(long)]
    pub overlay_url_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RuntimeArgs {
    /// Batch worker threads (1 = sequential).
    #[arg(long)]
    pub workers: Option<usize>,
    /// Classifier input size, `N` or `WxH`.
    #[arg(long, value_parser = parse_target_size)]
    pub target_size: Option<(u32, u32)>,
}

fn parse_target_size(raw: &str) -> Result<(u32, u32), String> {
    parse_size(raw).ok_or_else(|| format!("expected `N` or `WxH`, got `{raw}`"))
}

/// Every pipeline option a command accepts, layered over the config file and environment.
#[derive(Debug, Clone, Default, Args)]
pub struct PipelineArgs {
    /// JSON configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[command(flatten)]
    pub models: ModelArgs,
    #[command(flatten)]
    pub triage: TriageArgs,
    #[command(flatten)]
    pub overlay: OverlayArgs,
    #[command(flatten)]
    pub runtime: RuntimeArgs,
}

impl PipelineArgs {
    /// Flags take precedence over everything else.
    pub fn apply_to(&self, cfg: &mut PipelineConfig) {
        if let Some(path) = &self.models.stage1_weights {
            cfg.stage1.checkpoint = path.clone();
        }
        if let Some(path) = &self.models.stage2_weights {
            cfg.stage2.checkpoint = path.clone();
        }
        if let Some(threshold) = self.triage.threshold {
            cfg.confidence_threshold = threshold;
        }
        if let Some(dir) = &self.overlay.overlay_dir {
            cfg.overlay_dir = dir.clone();
        }
        if let Some(prefix) = &self.overlay.overlay_url_prefix {
            cfg.overlay_url_prefix = prefix.clone();
        }
        if let Some(workers) = self.runtime.workers {
            cfg.workers = workers;
        }
        if let Some((w, h)) = self.runtime.target_size {
            cfg.normalize.width = w;
            cfg.normalize.height = h;
        }
    }

    /// Defaults, config file, `EARSCOPE_*` environment, then flags; validated.
    pub fn resolve(&self) -> Result<PipelineConfig, ConfigError> {
        let mut cfg = PipelineConfig::load(self.config.as_deref())?;
        self.apply_to(&mut cfg);
        cfg.validate()?;
        Ok(cfg)
    }
}
