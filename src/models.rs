use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FactField {
    #[serde(alias = "amount")]
    Total,
    Schedule,
    FundSource,
    ImplementingAgency,
    ExpectedOutput,
}

impl FactField {
    pub fn as_str(self) -> &'static str {
        match self {
            FactField::Total => "total",
            FactField::Schedule => "schedule",
            FactField::FundSource => "fund_source",
            FactField::ImplementingAgency => "implementing_agency",
            FactField::ExpectedOutput => "expected_output",
        }
    }

    /// Unknown names map to `None`; callers skip them instead of failing.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "total" | "amount" => Some(FactField::Total),
            "schedule" => Some(FactField::Schedule),
            "fund_source" => Some(FactField::FundSource),
            "implementing_agency" => Some(FactField::ImplementingAgency),
            "expected_output" => Some(FactField::ExpectedOutput),
            _ => None,
        }
    }
}

/// Fields the published AIP never lists, so questions about them are refused
/// with a document-limitation message instead of being routed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DocLimitField {
    Contractor,
    ProcurementMode,
    ExactAddress,
    BeneficiaryCount,
    Supplier,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedQuestion {
    pub normalized_question: String,
    /// Requested fields in detection order, without duplicates.
    pub fact_fields: Vec<FactField>,
    pub requested_fiscal_year: Option<i32>,
    pub title_tokens: Vec<String>,
    pub title_phrase: Option<String>,
    pub mentioned_ref_code: Option<String>,
    pub has_global_scope_cue: bool,
    pub doc_limit_field: Option<DocLimitField>,
}

impl ParsedQuestion {
    pub fn is_fact_question(&self) -> bool {
        !self.fact_fields.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItemRow {
    pub id: String,
    pub aip_id: String,
    pub fiscal_year: i32,
    pub barangay_id: Option<String>,
    pub aip_ref_code: Option<String>,
    pub program_project_title: String,
    pub implementing_agency: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub fund_source: Option<String>,
    pub ps: Option<f64>,
    pub mooe: Option<f64>,
    pub co: Option<f64>,
    pub fe: Option<f64>,
    pub total: Option<f64>,
    pub expected_output: Option<String>,
    pub page_no: Option<i64>,
    pub row_no: Option<i64>,
    pub table_no: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateRecord {
    pub line_item_id: String,
    pub aip_id: String,
    pub fiscal_year: Option<i32>,
    pub barangay_id: Option<String>,
    pub aip_ref_code: Option<String>,
    pub program_project_title: String,
    pub page_no: Option<i64>,
    pub row_no: Option<i64>,
    pub table_no: Option<i64>,
    /// Base similarity from vector search, in `[0, 1]`.
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RankedCandidate {
    #[serde(flatten)]
    pub candidate: CandidateRecord,
    pub rank_score: f64,
    pub token_overlap: usize,
    pub year_match: bool,
    pub ref_code_match: bool,
    pub title_phrase_match: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BarangayRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CityRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScopeReason {
    ExplicitBarangay,
    ExplicitOurBarangay,
    DefaultUserBarangay,
    Unknown,
}

impl ScopeReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ScopeReason::ExplicitBarangay => "explicit_barangay",
            ScopeReason::ExplicitOurBarangay => "explicit_our_barangay",
            ScopeReason::DefaultUserBarangay => "default_user_barangay",
            ScopeReason::Unknown => "unknown",
        }
    }
}

/// `barangay_id` is `Some` exactly when `scope_reason` is not `Unknown`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScopeResolution {
    pub barangay_id: Option<String>,
    pub barangay_name: Option<String>,
    pub scope_reason: ScopeReason,
}

impl ScopeResolution {
    pub fn resolved(barangay: &BarangayRef, reason: ScopeReason) -> Self {
        Self {
            barangay_id: Some(barangay.id.clone()),
            barangay_name: Some(barangay.name.clone()),
            scope_reason: reason,
        }
    }

    pub fn unknown() -> Self {
        Self {
            barangay_id: None,
            barangay_name: None,
            scope_reason: ScopeReason::Unknown,
        }
    }
}

/// Scope used for line-item retrieval: either one barangay resolution or the
/// global "all barangays" scope requested explicitly by the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineItemScope {
    Global,
    Barangay(ScopeResolution),
}

impl LineItemScope {
    pub fn barangay_id(&self) -> Option<&str> {
        match self {
            LineItemScope::Global => None,
            LineItemScope::Barangay(resolution) => resolution.barangay_id.as_deref(),
        }
    }

    pub fn reason_label(&self) -> &'static str {
        match self {
            LineItemScope::Global => "global",
            LineItemScope::Barangay(resolution) => resolution.scope_reason.as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum AggregationIntent {
    TopProjects { limit: u32 },
    TotalsBySector,
    TotalsByFundSource,
    CompareYears { year_a: i32, year_b: i32 },
    None,
}

impl AggregationIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationIntent::TopProjects { .. } => "top_projects",
            AggregationIntent::TotalsBySector => "totals_by_sector",
            AggregationIntent::TotalsByFundSource => "totals_by_fund_source",
            AggregationIntent::CompareYears { .. } => "compare_years",
            AggregationIntent::None => "none",
        }
    }

    pub fn is_aggregate(&self) -> bool {
        !matches!(self, AggregationIntent::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fact_field_parse_accepts_amount_alias_and_skips_unknown() {
        assert_eq!(FactField::parse("amount"), Some(FactField::Total));
        assert_eq!(FactField::parse(" Fund_Source "), Some(FactField::FundSource));
        assert_eq!(FactField::parse("contractor"), None);
    }

    #[test]
    fn aggregation_intent_serializes_as_tagged_union() {
        let value = serde_json::to_value(AggregationIntent::CompareYears {
            year_a: 2025,
            year_b: 2026,
        })
        .unwrap();
        assert_eq!(value["intent"], "compare_years");
        assert_eq!(value["year_a"], 2025);

        let none: AggregationIntent = serde_json::from_str(r#"{"intent":"none"}"#).unwrap();
        assert_eq!(none, AggregationIntent::None);
    }

    #[test]
    fn unknown_scope_has_no_barangay() {
        let scope = ScopeResolution::unknown();
        assert!(scope.barangay_id.is_none());
        assert_eq!(scope.scope_reason.as_str(), "unknown");
    }
}
