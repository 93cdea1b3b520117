//! Prompt templates for the LLM-backed stages. Kept as plain string
//! builders rather than a templating crate — these are short enough not
//! to need one.

use crate::domain::{ComplianceReport, SubmitInputs};

const MATCH_SYSTEM_PROMPT: &str = "You verify whether a shop policy document genuinely belongs \
to the category it claims. Respond with strict JSON: {\"verdict\": \"match\"|\"mismatch\", \
\"confidence\": 0.0-1.0}.";

const COMPLIANCE_SYSTEM_PROMPT: &str = "You audit shop policies against marketplace compliance \
rules for the declared category. Respond with strict JSON matching: {\"overall_compliance_ratio\": \
0-100, \"compliance_grade\": string, \"summary\": string, \"critical_issues\": [...], \
\"weaknesses\": [...], \"strengths\": [...], \"ambiguities\": [...], \"recommendations\": [...]} \
where each finding is {\"phrase\": string, \"severity\": \"low\"|\"medium\"|\"high\"|\"critical\", \
\"suggestion\": string|null, \"reference\": string|null}.";

const REGENERATION_SYSTEM_PROMPT: &str = "You rewrite a shop policy to resolve the compliance \
issues identified in its audit, preserving the shop's intent. Respond with strict JSON: \
{\"improved_policy\": string, \"improvements_made\": [string], \"estimated_new_compliance\": 0-100}.";

pub fn match_prompt(inputs: &SubmitInputs) -> (String, String) {
    let user = format!(
        "Declared category: {}\nShop: {} ({})\nPolicy text:\n{}",
        inputs.policy_type, inputs.shop_name, inputs.shop_specialization, inputs.policy_text
    );
    (MATCH_SYSTEM_PROMPT.to_string(), user)
}

pub fn compliance_prompt(inputs: &SubmitInputs) -> (String, String) {
    let user = format!(
        "Category: {}\nShop: {} ({})\nPolicy text:\n{}",
        inputs.policy_type, inputs.shop_name, inputs.shop_specialization, inputs.policy_text
    );
    (COMPLIANCE_SYSTEM_PROMPT.to_string(), user)
}

pub fn regeneration_prompt(inputs: &SubmitInputs, report: &ComplianceReport) -> (String, String) {
    let issues: Vec<&str> = report.critical_issues.iter().chain(report.weaknesses.iter())
        .map(|f| f.phrase.as_str())
        .collect();
    let user = format!(
        "Category: {}\nShop: {} ({})\nCurrent compliance ratio: {:.1}\nIssues to fix: {}\n\
         Original policy text:\n{}",
        inputs.policy_type,
        inputs.shop_name,
        inputs.shop_specialization,
        report.overall_compliance_ratio,
        issues.join("; "),
        inputs.policy_text,
    );
    (REGENERATION_SYSTEM_PROMPT.to_string(), user)
}
