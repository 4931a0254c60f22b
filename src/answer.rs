use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{FactField, LineItemRow, LineItemScope};
use crate::scope::display_barangay_name;
use crate::text::non_empty;

/// Source reference attached to a line-item answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItemCitation {
    pub line_item_id: String,
    pub aip_id: String,
    pub fiscal_year: i32,
    pub scope_name: String,
    pub snippet: String,
    pub page_no: Option<i64>,
    pub row_no: Option<i64>,
    pub table_no: Option<i64>,
}

/// "PHP 1,234.50" with two decimals and comma grouping, or "N/A" when the
/// amount is missing or not finite.
pub fn format_php_amount(value: Option<f64>) -> String {
    let Some(value) = value.filter(|v| v.is_finite()) else {
        return "N/A".to_string();
    };

    let fixed = format!("{:.2}", value.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (idx, digit) in whole.chars().enumerate() {
        if idx > 0 && (whole.len() - idx) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let negative = value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
    let sign = if negative { "-" } else { "" };
    format!("PHP {sign}{grouped}.{cents}")
}

/// Trims an ISO date-time ("2026-01-01T00:00:00Z") to its date. Other
/// values are shown as given.
fn display_date(raw: &str) -> String {
    if raw.len() > 10 && raw.is_char_boundary(10) {
        let (date, rest) = raw.split_at(10);
        if rest.starts_with('T') || rest.starts_with(' ') {
            if let Ok(parsed) = NaiveDate::parse_from_str(date, "%Y-%m-%d") {
                return parsed.format("%Y-%m-%d").to_string();
            }
        }
    }
    raw.to_string()
}

pub fn format_schedule(start_date: Option<&str>, end_date: Option<&str>) -> String {
    let start = non_empty(start_date).map(display_date);
    let end = non_empty(end_date).map(display_date);
    match (start, end) {
        (Some(start), Some(end)) => format!("{start} to {end}"),
        (Some(start), None) => format!("{start} to N/A"),
        (None, Some(end)) => format!("N/A to {end}"),
        (None, None) => "N/A".to_string(),
    }
}

fn text_or_na(value: Option<&str>) -> &str {
    non_empty(value).unwrap_or("N/A")
}

fn field_clause(row: &LineItemRow, field: FactField) -> String {
    match field {
        FactField::Total => format!("total allocation: {}", format_php_amount(row.total)),
        FactField::Schedule => format!(
            "schedule: {}",
            format_schedule(row.start_date.as_deref(), row.end_date.as_deref())
        ),
        FactField::FundSource => format!("fund source: {}", text_or_na(row.fund_source.as_deref())),
        FactField::ImplementingAgency => format!(
            "implementing agency: {}",
            text_or_na(row.implementing_agency.as_deref())
        ),
        FactField::ExpectedOutput => format!(
            "expected output: {}",
            text_or_na(row.expected_output.as_deref())
        ),
    }
}

/// Answers the requested fields from one line-item row, one clause per field
/// in request order. Scope attribution is never part of the answer; callers
/// surface it separately.
pub fn build_line_item_answer(row: &LineItemRow, fields: &[FactField]) -> String {
    let title =
        non_empty(Some(row.program_project_title.as_str())).unwrap_or("the selected line item");
    let ref_text = non_empty(row.aip_ref_code.as_deref())
        .map(|code| format!(" (Ref {code})"))
        .unwrap_or_default();

    let mut seen = HashSet::new();
    let clauses: Vec<String> = fields
        .iter()
        .filter(|field| seen.insert(**field))
        .map(|field| field_clause(row, *field))
        .collect();

    if clauses.is_empty() {
        return format!(
            "I found {title}, but I need a specific field (amount, schedule, fund source, implementing agency, or expected output)."
        );
    }

    format!("For {title}{ref_text}, {}.", clauses.join("; "))
}

pub fn build_line_item_citation_snippet(row: &LineItemRow) -> String {
    let title =
        non_empty(Some(row.program_project_title.as_str())).unwrap_or("Untitled line item");
    let schedule = format_schedule(row.start_date.as_deref(), row.end_date.as_deref())
        .replacen(" to ", "..", 1);
    format!(
        "{title} - Fund: {} - Schedule: {schedule} - Total: {}",
        text_or_na(row.fund_source.as_deref()),
        format_php_amount(row.total)
    )
}

/// "Barangay Mamatid | FY 2026 | Road Concreting"; global or unnamed scopes
/// read "All barangays".
pub fn build_line_item_citation_scope_name(
    title: &str,
    fiscal_year: Option<i32>,
    scope: &LineItemScope,
) -> String {
    let title = non_empty(Some(title)).unwrap_or("Untitled line item");
    let year = fiscal_year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "Any".to_string());
    let place = match scope {
        LineItemScope::Global => None,
        LineItemScope::Barangay(resolution) => {
            display_barangay_name(resolution.barangay_name.as_deref())
        }
    }
    .unwrap_or_else(|| "All barangays".to_string());

    format!("{place} | FY {year} | {title}")
}

pub fn build_line_item_citation(row: &LineItemRow, scope: &LineItemScope) -> LineItemCitation {
    LineItemCitation {
        line_item_id: row.id.clone(),
        aip_id: row.aip_id.clone(),
        fiscal_year: row.fiscal_year,
        scope_name: build_line_item_citation_scope_name(
            &row.program_project_title,
            Some(row.fiscal_year),
            scope,
        ),
        snippet: build_line_item_citation_snippet(row),
        page_no: row.page_no,
        row_no: row.row_no,
        table_no: row.table_no,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScopeReason, ScopeResolution};

    fn road_row() -> LineItemRow {
        LineItemRow {
            id: "li-1".to_string(),
            aip_id: "aip-1".to_string(),
            fiscal_year: 2026,
            barangay_id: Some("brgy-1".to_string()),
            aip_ref_code: Some("8000-003-002-006".to_string()),
            program_project_title: "Road Concreting".to_string(),
            implementing_agency: Some("Barangay Engineering Office".to_string()),
            start_date: Some("2026-01-01".to_string()),
            end_date: Some("2026-12-31T00:00:00Z".to_string()),
            fund_source: Some("General Fund".to_string()),
            ps: None,
            mooe: None,
            co: Some(1200.0),
            fe: None,
            total: Some(1200.0),
            expected_output: None,
            page_no: Some(3),
            row_no: Some(12),
            table_no: Some(1),
        }
    }

    #[test]
    fn php_amounts_group_and_round() {
        assert_eq!(format_php_amount(Some(1200.0)), "PHP 1,200.00");
        assert_eq!(format_php_amount(Some(1_234_567.891)), "PHP 1,234,567.89");
        assert_eq!(format_php_amount(Some(999.999)), "PHP 1,000.00");
        assert_eq!(format_php_amount(Some(0.5)), "PHP 0.50");
        assert_eq!(format_php_amount(Some(-45_000.0)), "PHP -45,000.00");
        assert_eq!(format_php_amount(Some(-0.001)), "PHP 0.00");
        assert_eq!(format_php_amount(None), "N/A");
        assert_eq!(format_php_amount(Some(f64::NAN)), "N/A");
    }

    #[test]
    fn schedule_phrasing() {
        assert_eq!(
            format_schedule(Some("2026-01-01"), Some("2026-12-31T00:00:00Z")),
            "2026-01-01 to 2026-12-31"
        );
        assert_eq!(format_schedule(Some("2026-01-01"), None), "2026-01-01 to N/A");
        assert_eq!(format_schedule(Some("  "), Some("December 2026")), "N/A to December 2026");
        assert_eq!(format_schedule(None, None), "N/A");
    }

    #[test]
    fn answer_lists_clauses_in_request_order() {
        let answer =
            build_line_item_answer(&road_row(), &[FactField::Total, FactField::Schedule]);
        assert_eq!(
            answer,
            "For Road Concreting (Ref 8000-003-002-006), total allocation: PHP 1,200.00; schedule: 2026-01-01 to 2026-12-31."
        );
    }

    #[test]
    fn missing_values_read_na_and_duplicates_collapse() {
        let answer = build_line_item_answer(
            &road_row(),
            &[
                FactField::ExpectedOutput,
                FactField::FundSource,
                FactField::ExpectedOutput,
            ],
        );
        assert_eq!(
            answer,
            "For Road Concreting (Ref 8000-003-002-006), expected output: N/A; fund source: General Fund."
        );
    }

    #[test]
    fn answer_never_carries_scope_language() {
        let answer = build_line_item_answer(&road_row(), &[FactField::FundSource]);
        assert!(!answer.contains("based on your account scope"));
        assert!(answer.contains("fund source: General Fund"));
    }

    #[test]
    fn no_fields_asks_for_one() {
        let answer = build_line_item_answer(&road_row(), &[]);
        assert!(answer.starts_with("I found Road Concreting, but I need a specific field"));
    }

    #[test]
    fn citation_text() {
        let row = road_row();
        assert_eq!(
            build_line_item_citation_snippet(&row),
            "Road Concreting - Fund: General Fund - Schedule: 2026-01-01..2026-12-31 - Total: PHP 1,200.00"
        );

        let scoped = LineItemScope::Barangay(ScopeResolution {
            barangay_id: Some("brgy-1".to_string()),
            barangay_name: Some("Mamatid".to_string()),
            scope_reason: ScopeReason::ExplicitBarangay,
        });
        let citation = build_line_item_citation(&row, &scoped);
        assert_eq!(citation.scope_name, "Barangay Mamatid | FY 2026 | Road Concreting");
        assert_eq!(citation.page_no, Some(3));

        assert_eq!(
            build_line_item_citation_scope_name(" ", None, &LineItemScope::Global),
            "All barangays | FY Any | Untitled line item"
        );
    }
}
