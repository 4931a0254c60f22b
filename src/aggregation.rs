//! Aggregate-query intent detection.
//!
//! The checks form a priority cascade: a message can carry several weak cues
//! at once (a year comparison that also mentions fund sources, say), and the
//! first, most specific rule that fires decides the route.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::AggregationIntent;
use crate::text::{compile, normalize_whitespace};

const DEFAULT_TOP_LIMIT: u32 = 10;
const MAX_TOP_LIMIT: u32 = 50;

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?:\bfy|\b)(20\d{2})\b"));
static COMPARE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(?:compare|comparison|difference|vs|versus)\b"));
static TOP_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(?:top|largest|biggest|highest|most funded)\b"));
static PROJECTS_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"\b(?:projects?|programs?)\b"));
static TOP_N_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"\btop\s+(\d+)\b"));
static SECTOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b(?:by sector|per sector|sector totals?|totals? by sector|sectoral totals?)\b")
});
static FUND_TOPIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b(?:fund sources?|funding sources?|sources? of funds?|fund types?)\b")
});
static FUND_LISTING_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(?:exists?|available|list|show|what are)\b"));
static AGGREGATE_CUE_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b(?:totals?|breakdown|distribution|summary|vs|versus|compare|comparison)\b")
});
static LOAN_VS_GENERAL_FUND_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\bloans?\b.*\bgeneral fund\b|\bgeneral fund\b.*\bloans?\b")
});

/// Lowercase, punctuation replaced by spaces, whitespace collapsed.
fn normalize_for_intent(message: &str) -> String {
    let replaced: String = message
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    normalize_whitespace(&replaced)
}

/// Distinct `20xx` years in order of first appearance.
pub fn extract_years(normalized: &str) -> Vec<i32> {
    let mut years = Vec::new();
    for caps in YEAR_RE.captures_iter(normalized) {
        let Some(year) = caps.get(1).and_then(|m| m.as_str().parse::<i32>().ok()) else {
            continue;
        };
        if !years.contains(&year) {
            years.push(year);
        }
    }
    years
}

fn parse_top_limit(normalized: &str) -> u32 {
    TOP_N_RE
        .captures(normalized)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u64>().ok())
        .map(|n| n.clamp(1, MAX_TOP_LIMIT as u64) as u32)
        .unwrap_or(DEFAULT_TOP_LIMIT)
}

pub fn detect_aggregation_intent(message: &str) -> AggregationIntent {
    let normalized = normalize_for_intent(message);
    if normalized.is_empty() {
        return AggregationIntent::None;
    }
    let years = extract_years(&normalized);

    if COMPARE_RE.is_match(&normalized) && years.len() >= 2 {
        return AggregationIntent::CompareYears {
            year_a: years[0],
            year_b: years[1],
        };
    }

    if TOP_RE.is_match(&normalized) && PROJECTS_RE.is_match(&normalized) {
        return AggregationIntent::TopProjects {
            limit: parse_top_limit(&normalized),
        };
    }

    if SECTOR_RE.is_match(&normalized) {
        return AggregationIntent::TotalsBySector;
    }

    let fund_topic = FUND_TOPIC_RE.is_match(&normalized);
    if fund_topic && FUND_LISTING_RE.is_match(&normalized) {
        return AggregationIntent::TotalsByFundSource;
    }

    if (fund_topic && AGGREGATE_CUE_RE.is_match(&normalized))
        || LOAN_VS_GENERAL_FUND_RE.is_match(&normalized)
    {
        return AggregationIntent::TotalsByFundSource;
    }

    AggregationIntent::None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compare_uses_first_two_years_in_order() {
        assert_eq!(
            detect_aggregation_intent("Compare 2025 vs 2026 totals"),
            AggregationIntent::CompareYears {
                year_a: 2025,
                year_b: 2026
            }
        );
        assert_eq!(
            detect_aggregation_intent("What's the difference between FY 2026, 2024 and 2025?"),
            AggregationIntent::CompareYears {
                year_a: 2026,
                year_b: 2024
            }
        );
    }

    #[test]
    fn compact_fiscal_year_labels_count_as_years() {
        assert_eq!(extract_years("compare fy2025 vs fy2026"), vec![2025, 2026]);
        assert_eq!(
            detect_aggregation_intent("Compare FY2025 vs FY2026 totals"),
            detect_aggregation_intent("Compare FY 2025 vs FY 2026 totals")
        );
        assert_eq!(
            detect_aggregation_intent("Compare FY2025 vs FY2026 totals"),
            AggregationIntent::CompareYears {
                year_a: 2025,
                year_b: 2026
            }
        );
        assert!(extract_years("ref 12026 and x2025").is_empty());
    }

    #[test]
    fn compare_needs_two_distinct_years() {
        assert_eq!(
            detect_aggregation_intent("Compare 2026 vs 2026"),
            AggregationIntent::None
        );
    }

    #[test]
    fn top_projects_limit_is_parsed_and_clamped() {
        assert_eq!(
            detect_aggregation_intent("top 5 largest projects"),
            AggregationIntent::TopProjects { limit: 5 }
        );
        assert_eq!(
            detect_aggregation_intent("Top 3 projects in FY 2026"),
            AggregationIntent::TopProjects { limit: 3 }
        );
        assert_eq!(
            detect_aggregation_intent("What are the most funded programs?"),
            AggregationIntent::TopProjects { limit: 10 }
        );
        assert_eq!(
            detect_aggregation_intent("top 500 projects"),
            AggregationIntent::TopProjects { limit: 50 }
        );
        assert_eq!(
            detect_aggregation_intent("top 0 projects"),
            AggregationIntent::TopProjects { limit: 1 }
        );
    }

    #[test]
    fn top_without_projects_cue_is_not_top_projects() {
        assert_eq!(
            detect_aggregation_intent("What is the highest allocation for honoraria?"),
            AggregationIntent::None
        );
    }

    #[test]
    fn sector_totals() {
        assert_eq!(
            detect_aggregation_intent("Totals by sector FY 2026"),
            AggregationIntent::TotalsBySector
        );
        assert_eq!(
            detect_aggregation_intent("budget per sector"),
            AggregationIntent::TotalsBySector
        );
    }

    #[test]
    fn fund_source_listing_and_totals() {
        assert_eq!(
            detect_aggregation_intent("What are the fund sources available?"),
            AggregationIntent::TotalsByFundSource
        );
        assert_eq!(
            detect_aggregation_intent("Budget totals by fund source for FY 2026"),
            AggregationIntent::TotalsByFundSource
        );
        assert_eq!(
            detect_aggregation_intent("How much is from loans versus the general fund?"),
            AggregationIntent::TotalsByFundSource
        );
    }

    #[test]
    fn comparison_outranks_fund_source_cues() {
        assert_eq!(
            detect_aggregation_intent("Compare fund source totals 2025 vs 2026"),
            AggregationIntent::CompareYears {
                year_a: 2025,
                year_b: 2026
            }
        );
    }

    #[test]
    fn single_line_item_question_is_none() {
        assert_eq!(
            detect_aggregation_intent(
                "In FY 2026, what is the fund source for Road Concreting in Barangay Mamatid?"
            ),
            AggregationIntent::None
        );
        assert_eq!(detect_aggregation_intent(""), AggregationIntent::None);
        assert_eq!(detect_aggregation_intent("?!"), AggregationIntent::None);
    }
}
