//! Layer A: pull identifier candidates out of extractable PDF text.
//!
//! Every maximal run of ASCII digits whose length is within tolerance of
//! the sender's expected digit count is a candidate. Candidates are
//! deduplicated by value and ranked by length fit, label proximity on the
//! same line, and repetition.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use super::region::text_snippet;
use super::types::{ExtractionCandidate, InputScope};
use super::confidence::digits_within_tolerance;
use crate::config::ConfidenceCaps;
use crate::models::enums::ExtractionMethod;

pub(super) static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").unwrap());

/// Labels that usually sit next to a work-order number.
static ID_LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(work\s*order|w/?o|order|job|ticket|ref(erence)?|no\.?|num(ber)?)\b|#")
        .unwrap()
});

const BASE_SCORE: f32 = 0.5;
const EXACT_LENGTH_BONUS: f32 = 0.2;
const LABEL_BONUS: f32 = 0.2;
const REPEAT_BONUS: f32 = 0.05;
const MAX_REPEAT_BONUS: f32 = 0.1;

/// What Layer A found and over which text.
#[derive(Debug, Clone, PartialEq)]
pub struct StructuralOutcome {
    pub scope: InputScope,
    /// Ranked best-first, one entry per distinct value.
    pub candidates: Vec<ExtractionCandidate>,
    /// Set when there is at least one candidate.
    pub confidence: Option<f32>,
}

impl StructuralOutcome {
    pub fn best(&self) -> Option<&ExtractionCandidate> {
        self.candidates.first()
    }

    pub fn is_ambiguous(&self) -> bool {
        self.candidates.len() > 1
    }
}

/// Run Layer A. Region text is preferred; full page text is the fallback
/// when the region has no text layer or yields no candidates.
pub fn parse(
    region_text: Option<&str>,
    page_text: &str,
    expected_digits: u8,
    tolerance: u8,
    caps: &ConfidenceCaps,
) -> StructuralOutcome {
    let (scope, candidates) = match region_text.filter(|t| !t.trim().is_empty()) {
        Some(text) => {
            let found = find_candidates(text, expected_digits, tolerance);
            if found.is_empty() {
                (
                    InputScope::FullText,
                    find_candidates(page_text, expected_digits, tolerance),
                )
            } else {
                (InputScope::CroppedRegion, found)
            }
        }
        None => (
            InputScope::FullText,
            find_candidates(page_text, expected_digits, tolerance),
        ),
    };

    let confidence = match candidates.len() {
        0 => None,
        1 => Some(caps.structural_unique),
        _ => Some(caps.structural_ambiguous),
    };

    StructuralOutcome {
        scope,
        candidates,
        confidence,
    }
}

/// Distinct in-tolerance digit tokens in `text`, ranked best-first.
pub fn find_candidates(text: &str, expected_digits: u8, tolerance: u8) -> Vec<ExtractionCandidate> {
    struct Seen {
        first_pos: usize,
        occurrences: usize,
        best_line_score: f32,
        line: String,
    }

    let mut seen: HashMap<&str, Seen> = HashMap::new();
    let mut position = 0usize;

    for line in text.lines() {
        let labelled = ID_LABEL.is_match(line);
        for token in DIGIT_RUN.find_iter(line) {
            let value = token.as_str();
            if !digits_within_tolerance(value, expected_digits, tolerance) {
                continue;
            }
            let mut line_score = BASE_SCORE;
            if value.len() == expected_digits as usize {
                line_score += EXACT_LENGTH_BONUS;
            }
            if labelled {
                line_score += LABEL_BONUS;
            }
            position += 1;

            let entry = seen.entry(value).or_insert_with(|| Seen {
                first_pos: position,
                occurrences: 0,
                best_line_score: line_score,
                line: line.to_string(),
            });
            entry.occurrences += 1;
            if line_score > entry.best_line_score {
                entry.best_line_score = line_score;
                entry.line = line.to_string();
            }
        }
    }

    let mut ranked: Vec<(usize, ExtractionCandidate)> = seen
        .into_iter()
        .map(|(value, s)| {
            let repeat = (REPEAT_BONUS * (s.occurrences - 1) as f32).min(MAX_REPEAT_BONUS);
            let score = (s.best_line_score + repeat).min(1.0);
            (
                s.first_pos,
                ExtractionCandidate {
                    value: value.to_string(),
                    score,
                    source_layer: ExtractionMethod::StructuralText,
                    snippet: Some(text_snippet(&s.line)),
                },
            )
        })
        .collect();

    ranked.sort_by(|(pos_a, a), (pos_b, b)| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(pos_a.cmp(pos_b))
    });
    ranked.into_iter().map(|(_, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> ConfidenceCaps {
        ConfidenceCaps::default()
    }

    #[test]
    fn single_match_scores_unique() {
        let page = "ACME Field Services\nWork Order: 4521983\nCustomer signature ________";
        let outcome = parse(None, page, 7, 1, &caps());
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.best().unwrap().value, "4521983");
        assert_eq!(outcome.confidence, Some(0.98));
        assert_eq!(outcome.scope, InputScope::FullText);
    }

    #[test]
    fn repeated_identifier_is_still_unique() {
        let page = "WO 4521983\nRef 4521983 page 1 of 2";
        let outcome = parse(None, page, 7, 1, &caps());
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.confidence, Some(0.98));
    }

    #[test]
    fn multiple_matches_are_ambiguous_and_ranked() {
        let page = "Phone 5550123\nJob No. 4521983\nDate 2024";
        let outcome = parse(None, page, 7, 1, &caps());
        assert!(outcome.is_ambiguous());
        assert_eq!(outcome.confidence, Some(0.85));
        assert_eq!(outcome.best().unwrap().value, "4521983");
        assert_eq!(outcome.candidates[1].value, "5550123");
    }

    #[test]
    fn out_of_tolerance_tokens_are_ignored() {
        let outcome = parse(Some("invoice 881"), "invoice 881", 6, 1, &caps());
        assert!(outcome.candidates.is_empty());
        assert_eq!(outcome.confidence, None);
    }

    #[test]
    fn digit_runs_are_not_split() {
        // 12 digits never yields a 7-digit substring candidate.
        let outcome = parse(None, "Account 123456789012", 7, 1, &caps());
        assert!(outcome.candidates.is_empty());
    }

    #[test]
    fn region_text_preferred_over_page_text() {
        let page = "Order 1111111\nOrder 2222222";
        let outcome = parse(Some("WO# 2222222"), page, 7, 1, &caps());
        assert_eq!(outcome.scope, InputScope::CroppedRegion);
        assert_eq!(outcome.candidates.len(), 1);
        assert_eq!(outcome.best().unwrap().value, "2222222");
    }

    #[test]
    fn empty_region_falls_back_to_full_text() {
        let outcome = parse(Some("   "), "Job 4521983", 7, 1, &caps());
        assert_eq!(outcome.scope, InputScope::FullText);
        assert_eq!(outcome.best().unwrap().value, "4521983");
    }

    #[test]
    fn region_without_candidates_falls_back_to_full_text() {
        let outcome = parse(Some("Signature"), "Job 4521983", 7, 1, &caps());
        assert_eq!(outcome.scope, InputScope::FullText);
        assert_eq!(outcome.candidates.len(), 1);
    }

    #[test]
    fn exact_length_outranks_near_length() {
        let found = find_candidates("452198\n4521983", 7, 1);
        assert_eq!(found[0].value, "4521983");
        assert!(found[0].score > found[1].score);
    }

    #[test]
    fn snippet_carries_source_line() {
        let found = find_candidates("header\n  Ticket   #4521983 \nfooter", 7, 1);
        assert_eq!(found[0].snippet.as_deref(), Some("Ticket #4521983"));
        assert_eq!(found[0].source_layer, ExtractionMethod::StructuralText);
    }
}
