use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Deserializer};
use tracing_subscriber::EnvFilter;

use aip_chat::aggregation::detect_aggregation_intent;
use aip_chat::models::{BarangayRef, FactField};
use aip_chat::question::parse_line_item_question;
use aip_chat::scope::{
    normalize_barangay_name_for_match, resolve_explicit_barangay, resolve_line_item_scope,
    BarangayDirectory,
};

#[derive(Parser, Debug)]
#[command(name = "eval")]
#[command(about = "Score query understanding against a labeled prompt set")]
struct Cli {
    #[arg(long, default_value = "eval/prompts.jsonl")]
    file: String,
    /// Comma-separated barangay names treated as the active directory.
    #[arg(long, default_value = "Mamatid,Poblacion,Pulo,Banay-Banay,Canlubang")]
    barangays: String,
    #[arg(long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct EvalPrompt {
    id: String,
    message: String,
    #[serde(default)]
    user_barangay: Option<String>,
    #[serde(default)]
    expect_intent: Option<String>,
    #[serde(default)]
    expect_fact_fields: Option<Vec<FactField>>,
    #[serde(default, deserialize_with = "present")]
    expect_fiscal_year: Option<Option<i32>>,
    #[serde(default, deserialize_with = "present")]
    expect_ref_code: Option<Option<String>>,
    #[serde(default)]
    expect_scope_reason: Option<String>,
}

/// Keeps an explicit `null` distinct from a missing key.
fn present<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// In-memory directory built from the `--barangays` list.
struct StaticDirectory(Vec<BarangayRef>);

impl StaticDirectory {
    fn from_names(names: &str) -> Self {
        let barangays = names
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .enumerate()
            .map(|(idx, name)| BarangayRef {
                id: format!("brgy-{}", idx + 1),
                name: name.to_string(),
            })
            .collect();
        Self(barangays)
    }

    fn find(&self, name: &str) -> Option<BarangayRef> {
        let wanted = normalize_barangay_name_for_match(name);
        self.0
            .iter()
            .find(|b| normalize_barangay_name_for_match(&b.name) == wanted)
            .cloned()
    }
}

impl BarangayDirectory for StaticDirectory {
    fn find_by_normalized_name(&self, normalized_name: &str) -> Result<Vec<BarangayRef>> {
        Ok(self
            .0
            .iter()
            .filter(|b| normalize_barangay_name_for_match(&b.name) == normalized_name)
            .cloned()
            .collect())
    }

    fn known_names_normalized(&self) -> Result<HashSet<String>> {
        Ok(self
            .0
            .iter()
            .map(|b| normalize_barangay_name_for_match(&b.name))
            .collect())
    }
}

#[derive(Default)]
struct Tally {
    checked: usize,
    passed: usize,
}

impl Tally {
    fn record(&mut self, passed: bool) -> bool {
        self.checked += 1;
        if passed {
            self.passed += 1;
        }
        passed
    }

    fn report(&self, label: &str) {
        if self.checked == 0 {
            return;
        }
        println!(
            "{} accuracy: {:.1}% ({}/{})",
            label,
            ratio(self.passed, self.checked) * 100.0,
            self.passed,
            self.checked
        );
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let directory = StaticDirectory::from_names(&cli.barangays);

    let prompts = load_prompts(&cli.file)?;
    if prompts.is_empty() {
        anyhow::bail!("no prompts found in {}", cli.file);
    }

    let mut intent = Tally::default();
    let mut fields = Tally::default();
    let mut year = Tally::default();
    let mut ref_code = Tally::default();
    let mut scope = Tally::default();
    let mut failures = Vec::new();

    for prompt in &prompts {
        let detected_intent = detect_aggregation_intent(&prompt.message);
        let parsed = parse_line_item_question(&prompt.message);
        let user = prompt
            .user_barangay
            .as_deref()
            .and_then(|name| directory.find(name));
        let explicit = resolve_explicit_barangay(&prompt.message, &directory)
            .with_context(|| format!("scope lookup failed for prompt {}", prompt.id))?;
        let line_item_scope =
            resolve_line_item_scope(&parsed, &prompt.message, user.as_ref(), explicit.as_ref());

        let mut ok = true;
        if let Some(expected) = &prompt.expect_intent {
            ok &= intent.record(detected_intent.as_str() == expected);
        }
        if let Some(expected) = &prompt.expect_fact_fields {
            ok &= fields.record(&parsed.fact_fields == expected);
        }
        if let Some(expected) = &prompt.expect_fiscal_year {
            ok &= year.record(parsed.requested_fiscal_year == *expected);
        }
        if let Some(expected) = &prompt.expect_ref_code {
            ok &= ref_code.record(parsed.mentioned_ref_code == *expected);
        }
        if let Some(expected) = &prompt.expect_scope_reason {
            ok &= scope.record(line_item_scope.reason_label() == expected);
        }
        if !ok {
            failures.push(prompt.id.clone());
        }

        if cli.verbose {
            println!("--- {} ---", prompt.id);
            println!("Q: {}", prompt.message);
            println!("Intent: {}", detected_intent.as_str());
            println!(
                "Fields: {:?} | FY: {:?} | Ref: {:?}",
                parsed.fact_fields, parsed.requested_fiscal_year, parsed.mentioned_ref_code
            );
            println!("Scope: {}", line_item_scope.reason_label());
            println!();
        }
    }

    println!("Eval prompts: {}", prompts.len());
    intent.report("Intent");
    fields.report("Fact field");
    year.report("Fiscal year");
    ref_code.report("Ref code");
    scope.report("Scope reason");
    if !failures.is_empty() {
        tracing::warn!("failing prompts: {}", failures.join(", "));
    }

    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_prompts(path: &str) -> Result<Vec<EvalPrompt>> {
    let file = File::open(path).with_context(|| format!("failed opening {}", path))?;
    let reader = BufReader::new(file);
    let mut prompts = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let parsed: EvalPrompt = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid JSON at {} line {}", path, idx + 1))?;
        prompts.push(parsed);
    }

    Ok(prompts)
}

fn ratio(n: usize, d: usize) -> f32 {
    if d == 0 {
        return 0.0;
    }
    n as f32 / d as f32
}
