//! Shared mutable state threaded through the stage pipeline. Kept as an
//! explicit struct passed by `&mut` reference rather than hidden behind
//! trait object state, so each stage's inputs and effects are visible at
//! the call site (spec Design Notes §9: no hidden coupling between stages).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::domain::{
    AnalysisResult, ComplianceReport, ImprovedPolicy, MatchVerdict, StageOutcome,
    StageOutcomeKind, SubmitInputs,
};
use crate::providers::ProviderManager;

pub struct PipelineContext {
    pub job_id: String,
    pub inputs: SubmitInputs,
    pub content_hash: String,
    pub providers: Arc<ProviderManager>,
    pub cancel: Arc<AtomicBool>,

    pub outcomes: Vec<StageOutcome>,
    pub match_verdict: MatchVerdict,
    /// Set once stage 0 or 1 has produced a confident verdict, so the other
    /// match stage is skipped.
    pub verdict_resolved: bool,
    /// Set on a confident mismatch: compliance analysis and regeneration are
    /// skipped and finalization assembles a synthetic terminal result.
    pub exit_on_mismatch: bool,

    pub compliance_report: Option<ComplianceReport>,
    pub improved_policy: Option<ImprovedPolicy>,
    pub served_from_fallback: bool,
}

impl PipelineContext {
    pub fn new(
        job_id: String,
        inputs: SubmitInputs,
        content_hash: String,
        providers: Arc<ProviderManager>,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            job_id,
            inputs,
            content_hash,
            providers,
            cancel,
            outcomes: Vec::new(),
            match_verdict: MatchVerdict::Unsure,
            verdict_resolved: false,
            exit_on_mismatch: false,
            compliance_report: None,
            improved_policy: None,
            served_from_fallback: false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn record_outcome(&mut self, stage: &'static str, outcome: StageOutcomeKind, duration_ms: u64) {
        self.outcomes.push(StageOutcome { stage: stage.to_string(), outcome, duration_ms });
    }

    pub fn completed_stage_names(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == StageOutcomeKind::Ok)
            .map(|o| o.stage.clone())
            .collect()
    }

    pub fn failed_stage_names(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|o| o.outcome == StageOutcomeKind::Failed)
            .map(|o| o.stage.clone())
            .collect()
    }

    /// Assemble the terminal result from whatever state the stages left
    /// behind. Called by the finalization stage, and directly by the
    /// executor on a cache hit that bypasses the pipeline entirely.
    pub fn into_result(self, success: bool) -> AnalysisResult {
        let failed_stages = self.failed_stage_names();
        AnalysisResult {
            success,
            compliance_report: self.compliance_report,
            improved_policy: self.improved_policy,
            match_verdict: self.match_verdict,
            served_from_fallback: self.served_from_fallback,
            failed_stages,
        }
    }
}
