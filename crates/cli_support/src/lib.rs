//! Argument groups shared by the earscope command-line tools.

pub mod common;

pub use common::{ModelArgs, OverlayArgs, PipelineArgs, RuntimeArgs, TriageArgs};
