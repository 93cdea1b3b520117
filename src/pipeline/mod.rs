//! C9 — Stage Pipeline: rule-based match, LLM-assisted match, compliance
//! analysis, policy regeneration, finalization.

pub mod context;
pub mod executor;
pub mod prompts;
pub mod rules;
pub mod stages;

pub use context::PipelineContext;
pub use executor::{run, ProgressSink};
pub use stages::{Stage, StageSignal};

use crate::config::PipelineConfig;
use stages::{
    ComplianceAnalysisStage, FinalizationStage, LlmAssistedMatchStage, PolicyRegenerationStage,
    RuleBasedMatchStage,
};

/// Build the fixed five-stage registry (spec §4.9) from pipeline
/// configuration. Order is significant — the executor runs stages in the
/// order returned here.
pub fn build_stages(config: &PipelineConfig) -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(RuleBasedMatchStage { uncertainty_band: config.stage1_uncertainty_band }),
        Box::new(LlmAssistedMatchStage),
        Box::new(ComplianceAnalysisStage),
        Box::new(PolicyRegenerationStage {
            regeneration_threshold: config.compliance_regeneration_threshold,
        }),
        Box::new(FinalizationStage),
    ]
}
