//! The five pipeline stages (spec §4.9), each a `Stage` trait object rather
//! than a fixed enum match, so the executor's loop is uniform regardless of
//! which stages end up running for a given job (Design Notes §9: stages as
//! a flat registry, not an inheritance hierarchy).

use async_trait::async_trait;

use crate::domain::{ComplianceReport, ErrorKind, ErrorRecord, Finding, ImprovedPolicy, MatchVerdict};
use crate::providers::LlmRequest;

use super::context::PipelineContext;
use super::prompts;
use super::rules;

pub enum StageSignal {
    Ran,
    Skipped,
    Failed(ErrorRecord),
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;
    /// Whether a failure in this stage must fail (or fall back) the whole
    /// job, versus simply being logged and skipped past.
    fn required(&self) -> bool;
    async fn execute(&self, ctx: &mut PipelineContext) -> StageSignal;
}

fn malformed_response(stage: &str, raw: &str) -> ErrorRecord {
    ErrorRecord::new(
        ErrorKind::ServerError,
        format!("{stage}: provider returned a response that could not be parsed: {raw}"),
    )
}

// --- Stage 0: rule-based match ----------------------------------------

pub struct RuleBasedMatchStage {
    pub uncertainty_band: (f64, f64),
}

#[async_trait]
impl Stage for RuleBasedMatchStage {
    fn name(&self) -> &'static str {
        "rule_based_match"
    }

    fn required(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> StageSignal {
        let (verdict, _score) = rules::evaluate(&ctx.inputs, self.uncertainty_band);
        match verdict {
            MatchVerdict::Unsure => {
                // leave ctx.verdict_resolved false; stage 1 decides
            }
            MatchVerdict::Match => {
                ctx.match_verdict = MatchVerdict::Match;
                ctx.verdict_resolved = true;
            }
            MatchVerdict::Mismatch => {
                ctx.match_verdict = MatchVerdict::Mismatch;
                ctx.verdict_resolved = true;
                ctx.exit_on_mismatch = true;
            }
        }
        StageSignal::Ran
    }
}

// --- Stage 1: LLM-assisted match ---------------------------------------

#[derive(serde::Deserialize)]
struct MatchResponse {
    verdict: String,
    #[allow(dead_code)]
    #[serde(default)]
    confidence: f64,
}

pub struct LlmAssistedMatchStage;

#[async_trait]
impl Stage for LlmAssistedMatchStage {
    fn name(&self) -> &'static str {
        "llm_assisted_match"
    }

    fn required(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> StageSignal {
        if ctx.verdict_resolved {
            return StageSignal::Skipped;
        }

        let (system_prompt, user_prompt) = prompts::match_prompt(&ctx.inputs);
        let request = LlmRequest { system_prompt, user_prompt, estimated_tokens: 300 };

        let response = match ctx.providers.call(request).await {
            Ok(response) => response,
            Err(error) => return StageSignal::Failed(error),
        };

        let parsed: MatchResponse = match serde_json::from_str(&response.text) {
            Ok(parsed) => parsed,
            Err(_) => return StageSignal::Failed(malformed_response(self.name(), &response.text)),
        };

        match parsed.verdict.as_str() {
            "match" => {
                ctx.match_verdict = MatchVerdict::Match;
            }
            "mismatch" => {
                ctx.match_verdict = MatchVerdict::Mismatch;
                ctx.exit_on_mismatch = true;
            }
            other => {
                return StageSignal::Failed(malformed_response(
                    self.name(),
                    &format!("unrecognized verdict '{other}'"),
                ));
            }
        }
        ctx.verdict_resolved = true;
        StageSignal::Ran
    }
}

// --- Stage 2: compliance analysis --------------------------------------

#[derive(serde::Deserialize)]
struct ComplianceResponse {
    overall_compliance_ratio: f64,
    compliance_grade: String,
    summary: String,
    #[serde(default)]
    critical_issues: Vec<Finding>,
    #[serde(default)]
    weaknesses: Vec<Finding>,
    #[serde(default)]
    strengths: Vec<Finding>,
    #[serde(default)]
    ambiguities: Vec<Finding>,
    #[serde(default)]
    recommendations: Vec<Finding>,
}

pub struct ComplianceAnalysisStage;

#[async_trait]
impl Stage for ComplianceAnalysisStage {
    fn name(&self) -> &'static str {
        "compliance_analysis"
    }

    fn required(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> StageSignal {
        if ctx.exit_on_mismatch {
            return StageSignal::Skipped;
        }

        let (system_prompt, user_prompt) = prompts::compliance_prompt(&ctx.inputs);
        let request = LlmRequest { system_prompt, user_prompt, estimated_tokens: 900 };

        let response = match ctx.providers.call(request).await {
            Ok(response) => response,
            Err(error) => return StageSignal::Failed(error),
        };

        let parsed: ComplianceResponse = match serde_json::from_str(&response.text) {
            Ok(parsed) => parsed,
            Err(_) => return StageSignal::Failed(malformed_response(self.name(), &response.text)),
        };

        ctx.compliance_report = Some(ComplianceReport {
            overall_compliance_ratio: parsed.overall_compliance_ratio,
            compliance_grade: parsed.compliance_grade,
            summary: parsed.summary,
            critical_issues: parsed.critical_issues,
            weaknesses: parsed.weaknesses,
            strengths: parsed.strengths,
            ambiguities: parsed.ambiguities,
            recommendations: parsed.recommendations,
        });
        StageSignal::Ran
    }
}

// --- Stage 3: policy regeneration ---------------------------------------

#[derive(serde::Deserialize)]
struct RegenerationResponse {
    improved_policy: String,
    #[serde(default)]
    improvements_made: Vec<String>,
    estimated_new_compliance: f64,
}

pub struct PolicyRegenerationStage {
    pub regeneration_threshold: f64,
}

#[async_trait]
impl Stage for PolicyRegenerationStage {
    fn name(&self) -> &'static str {
        "policy_regeneration"
    }

    fn required(&self) -> bool {
        false
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> StageSignal {
        if ctx.exit_on_mismatch {
            return StageSignal::Skipped;
        }
        let Some(report) = ctx.compliance_report.clone() else {
            return StageSignal::Skipped;
        };
        if report.overall_compliance_ratio >= self.regeneration_threshold {
            return StageSignal::Skipped;
        }

        let (system_prompt, user_prompt) = prompts::regeneration_prompt(&ctx.inputs, &report);
        let request = LlmRequest { system_prompt, user_prompt, estimated_tokens: 1200 };

        let response = match ctx.providers.call(request).await {
            Ok(response) => response,
            Err(error) => return StageSignal::Failed(error),
        };

        let parsed: RegenerationResponse = match serde_json::from_str(&response.text) {
            Ok(parsed) => parsed,
            Err(_) => return StageSignal::Failed(malformed_response(self.name(), &response.text)),
        };

        ctx.improved_policy = Some(ImprovedPolicy {
            improved_policy: parsed.improved_policy,
            improvements_made: parsed.improvements_made,
            estimated_new_compliance: parsed.estimated_new_compliance,
        });
        StageSignal::Ran
    }
}

// --- Stage 4: finalization ----------------------------------------------

/// Always runs, regardless of how the earlier stages resolved: assembles
/// the terminal result shape. It never calls a provider, so it can't itself
/// fail with a retryable error — the only way it "fails" is if an earlier
/// stage already did, which the executor short-circuits on.
pub struct FinalizationStage;

#[async_trait]
impl Stage for FinalizationStage {
    fn name(&self) -> &'static str {
        "finalization"
    }

    fn required(&self) -> bool {
        true
    }

    async fn execute(&self, ctx: &mut PipelineContext) -> StageSignal {
        if ctx.exit_on_mismatch && ctx.compliance_report.is_none() {
            ctx.compliance_report = Some(ComplianceReport {
                overall_compliance_ratio: 0.0,
                compliance_grade: "non_compliant".to_string(),
                summary: "Policy text does not match its declared category.".to_string(),
                critical_issues: Vec::new(),
                weaknesses: Vec::new(),
                strengths: Vec::new(),
                ambiguities: Vec::new(),
                recommendations: Vec::new(),
            });
        }
        StageSignal::Ran
    }
}
