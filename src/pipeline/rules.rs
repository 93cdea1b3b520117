//! Stage 0 — rule-based matching. A cheap keyword heuristic that settles
//! the obvious cases (a policy clearly about the category it claims to be)
//! without spending an LLM call, leaving only the genuinely ambiguous
//! middle band for stage 1.

use crate::domain::{MatchVerdict, SubmitInputs};

/// Recognized policy categories and the terms that mark a policy text as
/// actually belonging to them. Kept as a small fixed table rather than a
/// generic classifier: the category set a shop declares is itself open
/// (`PolicyType` is a plain string), so this only needs to handle the
/// common cases well and defer everything else to stage 1.
const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("returns", &["return", "refund", "exchange", "money back"]),
    ("shipping", &["shipping", "delivery", "dispatch", "courier", "tracking"]),
    ("privacy", &["privacy", "personal data", "gdpr", "data collection", "cookies"]),
    ("warranty", &["warranty", "guarantee", "defect", "repair"]),
    ("payment", &["payment", "billing", "invoice", "checkout", "charge"]),
    ("cancellation", &["cancel", "cancellation", "terminate", "opt out"]),
];

/// Evaluate the rule-based match score in `[0.0, 1.0]`: the fraction of
/// category keywords for the claimed `policy_type` found in the policy
/// text. Scores at or above the uncertainty band's upper bound are a
/// confident match; at or below the lower bound, a confident mismatch;
/// everything in between is handed to stage 1.
pub fn evaluate(inputs: &SubmitInputs, uncertainty_band: (f64, f64)) -> (MatchVerdict, f64) {
    let text = inputs.policy_text.to_lowercase();
    let policy_type = inputs.policy_type.to_lowercase();

    let keywords = CATEGORY_KEYWORDS
        .iter()
        .find(|(category, _)| *category == policy_type)
        .map(|(_, words)| *words);

    let Some(keywords) = keywords else {
        // Unrecognized category: rule-based matching has no opinion, so
        // defer entirely to stage 1.
        return (MatchVerdict::Unsure, 0.5);
    };

    let hits = keywords.iter().filter(|kw| text.contains(*kw)).count();
    let score = hits as f64 / keywords.len() as f64;

    let (low, high) = uncertainty_band;
    if score >= high {
        (MatchVerdict::Match, score)
    } else if score <= low {
        (MatchVerdict::Mismatch, score)
    } else {
        (MatchVerdict::Unsure, score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(policy_type: &str, policy_text: &str) -> SubmitInputs {
        SubmitInputs {
            shop_name: "Acme".into(),
            shop_specialization: "General".into(),
            policy_type: policy_type.into(),
            policy_text: policy_text.into(),
        }
    }

    #[test]
    fn confident_match_when_keywords_abundant() {
        let text = "Returns accepted within 30 days. Refund or exchange offered, money back guaranteed.";
        let (verdict, _) = evaluate(&inputs("returns", text), (0.30, 0.70));
        assert_eq!(verdict, MatchVerdict::Match);
    }

    #[test]
    fn confident_mismatch_when_keywords_absent() {
        let text = "We ship worldwide via courier with full tracking on every order.";
        let (verdict, _) = evaluate(&inputs("returns", text), (0.30, 0.70));
        assert_eq!(verdict, MatchVerdict::Mismatch);
    }

    #[test]
    fn unrecognized_category_defers_to_llm() {
        let (verdict, _) = evaluate(&inputs("loyalty_program", "Earn points on every purchase."), (0.30, 0.70));
        assert_eq!(verdict, MatchVerdict::Unsure);
    }

    #[test]
    fn partial_keyword_overlap_is_unsure() {
        let text = "Items may be returned within a short exchange window.";
        let (verdict, score) = evaluate(&inputs("returns", text), (0.30, 0.70));
        assert_eq!(score, 0.5);
        assert_eq!(verdict, MatchVerdict::Unsure);
    }
}
