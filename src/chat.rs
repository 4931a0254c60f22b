use std::collections::HashMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::aggregation::detect_aggregation_intent;
use crate::answer::{build_line_item_answer, build_line_item_citation, LineItemCitation};
use crate::city_scope::{detect_explicit_city_mention, resolve_city_by_name_exact, CityDirectory};
use crate::clarification::{
    build_clarification_options, build_clarification_prompt, clarification_reminder,
    resolve_clarification_reply, should_ask_line_item_clarification_for, ClarificationOption,
    ClarificationReply, CANCEL_REPLY_MESSAGE,
};
use crate::config::RankingConfig;
use crate::models::{
    AggregationIntent, BarangayRef, CandidateRecord, CityRef, FactField, LineItemRow,
    LineItemScope, ParsedQuestion, ScopeResolution,
};
use crate::question::parse_line_item_question;
use crate::refusal::{
    build_refusal_message, has_unsupported_cue, RefusalContext, RefusalIntent, RefusalMessage,
};
use crate::rerank::rerank_line_item_candidates_with_config;
use crate::scope::{
    build_scope_disclosure, detect_explicit_barangay_mention, display_barangay_name,
    has_own_barangay_cue, resolve_explicit_barangay, resolve_line_item_scope,
    resolve_totals_scope, BarangayDirectory,
};

const MATCH_COUNT: usize = 20;

/// Similarity search over published line items.
pub trait CandidateRetriever {
    fn match_line_items(&self, query: &CandidateQuery) -> Result<Vec<CandidateRecord>>;
}

/// Row lookup for line items chosen by id.
pub trait LineItemStore {
    /// Rows for the ids that exist; unknown ids are skipped.
    fn fetch_line_items(&self, ids: &[String]) -> Result<Vec<LineItemRow>>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateQuery {
    pub query_text: String,
    pub fiscal_year: Option<i32>,
    /// `None` searches every barangay.
    pub barangay_id: Option<String>,
    pub match_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub message: String,
    pub user_barangay: Option<BarangayRef>,
}

impl ChatTurn {
    pub fn new(message: impl Into<String>, user_barangay: Option<BarangayRef>) -> Self {
        Self {
            message: message.into(),
            user_barangay,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregateScope {
    Global,
    City(CityRef),
    Barangay(ScopeResolution),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Refusal(RefusalMessage),
    Aggregate {
        intent: AggregationIntent,
        scope: AggregateScope,
    },
    LineItem {
        question: ParsedQuestion,
        scope: LineItemScope,
    },
    /// Nothing structured applies; the caller's general pipeline takes over.
    Passthrough,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LineItemAnswer {
    pub text: String,
    /// Scope attribution shown next to the answer, never inside it.
    pub scope_disclosure: Option<String>,
    pub citation: Option<LineItemCitation>,
}

/// What has to be remembered between a clarification prompt and the reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingClarification {
    pub options: Vec<ClarificationOption>,
    pub fact_fields: Vec<FactField>,
    pub scope: LineItemScope,
    pub prompt: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Answer(LineItemAnswer),
    Clarification(PendingClarification),
    Refusal(RefusalMessage),
    /// Not a line-item turn; carries the route for the caller to handle.
    Delegated(Route),
}

/// Stateless orchestration of one chat turn over the lookup collaborators.
pub struct ChatRouter<'a> {
    barangays: &'a dyn BarangayDirectory,
    cities: Option<&'a dyn CityDirectory>,
    retriever: &'a dyn CandidateRetriever,
    store: &'a dyn LineItemStore,
    config: RankingConfig,
}

impl<'a> ChatRouter<'a> {
    pub fn new(
        barangays: &'a dyn BarangayDirectory,
        retriever: &'a dyn CandidateRetriever,
        store: &'a dyn LineItemStore,
    ) -> Self {
        Self {
            barangays,
            cities: None,
            retriever,
            store,
            config: RankingConfig::default(),
        }
    }

    pub fn with_cities(mut self, cities: &'a dyn CityDirectory) -> Self {
        self.cities = Some(cities);
        self
    }

    pub fn with_config(mut self, config: RankingConfig) -> Self {
        self.config = config.sanitized();
        self
    }

    /// Decides how a turn is handled. Document-limit and unsupported questions
    /// are refused before any scope lookup; an explicitly named scope that
    /// cannot be resolved asks for the exact name instead of guessing.
    pub fn route(&self, turn: &ChatTurn) -> Result<Route> {
        let message = turn.message.as_str();
        let question = parse_line_item_question(message);

        if let Some(field) = question.doc_limit_field {
            let mut ctx = RefusalContext::new(RefusalIntent::UnanswerableField, message);
            ctx.doc_limit_field = Some(field);
            tracing::info!(field = ?field, "refusing document-limited field");
            return Ok(Route::Refusal(build_refusal_message(&ctx)));
        }

        if has_unsupported_cue(message) {
            let ctx = RefusalContext::new(RefusalIntent::PipelineFallback, message);
            tracing::info!("refusing unsupported request");
            return Ok(Route::Refusal(build_refusal_message(&ctx)));
        }

        let intent = detect_aggregation_intent(message);
        let user_barangay = turn.user_barangay.as_ref();
        let explicit = resolve_explicit_barangay(message, self.barangays)?;
        let own_cue = user_barangay.is_some() && has_own_barangay_cue(message);

        if explicit.is_none()
            && !own_cue
            && !question.has_global_scope_cue
            && detect_explicit_barangay_mention(message).is_some()
        {
            return Ok(Route::Refusal(self.unresolved_scope_refusal(
                message,
                intent,
                question.requested_fiscal_year,
            )));
        }

        if intent.is_aggregate() {
            let scope = match self.aggregate_scope(
                message,
                &question,
                user_barangay,
                explicit.as_ref(),
                own_cue,
            )? {
                Some(scope) => scope,
                None => {
                    return Ok(Route::Refusal(self.unresolved_scope_refusal(
                        message,
                        intent,
                        question.requested_fiscal_year,
                    )));
                }
            };
            tracing::info!(intent = intent.as_str(), "aggregation route");
            return Ok(Route::Aggregate { intent, scope });
        }

        if question.is_fact_question() || question.mentioned_ref_code.is_some() {
            let scope =
                resolve_line_item_scope(&question, message, user_barangay, explicit.as_ref());
            tracing::info!(
                scope = scope.reason_label(),
                fields = question.fact_fields.len(),
                "line-item route"
            );
            return Ok(Route::LineItem { question, scope });
        }

        tracing::debug!("no structured route for message");
        Ok(Route::Passthrough)
    }

    /// `None` when a named city does not resolve to exactly one active city.
    fn aggregate_scope(
        &self,
        message: &str,
        question: &ParsedQuestion,
        user_barangay: Option<&BarangayRef>,
        explicit: Option<&BarangayRef>,
        own_cue: bool,
    ) -> Result<Option<AggregateScope>> {
        if own_cue || explicit.is_some() {
            return Ok(Some(AggregateScope::Barangay(resolve_totals_scope(
                message,
                user_barangay,
                explicit,
            ))));
        }
        if question.has_global_scope_cue {
            return Ok(Some(AggregateScope::Global));
        }

        if let (Some(cities), Some(name)) = (self.cities, detect_explicit_city_mention(message)) {
            return Ok(resolve_city_by_name_exact(cities, &name)?.map(AggregateScope::City));
        }

        Ok(Some(AggregateScope::Barangay(resolve_totals_scope(
            message,
            user_barangay,
            None,
        ))))
    }

    fn unresolved_scope_refusal(
        &self,
        message: &str,
        intent: AggregationIntent,
        fiscal_year: Option<i32>,
    ) -> RefusalMessage {
        let refusal_intent = if intent.is_aggregate() {
            RefusalIntent::Aggregation
        } else {
            RefusalIntent::LineItemFact
        };
        let mut ctx = RefusalContext::new(refusal_intent, message);
        ctx.explicit_scope_requested = true;
        ctx.scope_resolved = false;
        ctx.fiscal_year = fiscal_year;
        tracing::info!("explicit scope did not resolve");
        build_refusal_message(&ctx)
    }

    /// Routes the turn and, for line-item questions, retrieves, reranks and
    /// answers it or asks which line item was meant.
    pub fn answer_line_item(&self, turn: &ChatTurn) -> Result<TurnOutcome> {
        match self.route(turn)? {
            Route::Refusal(refusal) => Ok(TurnOutcome::Refusal(refusal)),
            Route::LineItem { question, scope } => {
                self.answer_routed_line_item(&turn.message, &question, &scope)
            }
            other => Ok(TurnOutcome::Delegated(other)),
        }
    }

    fn answer_routed_line_item(
        &self,
        message: &str,
        question: &ParsedQuestion,
        scope: &LineItemScope,
    ) -> Result<TurnOutcome> {
        let query = CandidateQuery {
            query_text: message.to_string(),
            fiscal_year: question.requested_fiscal_year,
            barangay_id: scope.barangay_id().map(str::to_string),
            match_count: MATCH_COUNT,
        };
        let candidates = self.retriever.match_line_items(&query)?;
        tracing::debug!(count = candidates.len(), "retrieved line-item candidates");

        if candidates.is_empty() {
            return Ok(TurnOutcome::Refusal(retrieval_refusal(message, question, scope)));
        }

        let ranked = rerank_line_item_candidates_with_config(
            question,
            question.requested_fiscal_year,
            &candidates,
            &self.config,
        );

        if should_ask_line_item_clarification_for(question, &ranked, &self.config) {
            let max_options = self.config.max_clarification_options;
            let ids: Vec<String> = ranked
                .iter()
                .take(max_options.saturating_mul(2))
                .map(|entry| entry.candidate.line_item_id.clone())
                .collect();
            let rows_by_id: HashMap<String, LineItemRow> = self
                .store
                .fetch_line_items(&ids)?
                .into_iter()
                .map(|row| (row.id.clone(), row))
                .collect();
            let options = build_clarification_options(&ranked, &rows_by_id, scope, max_options);

            if options.len() >= 2 {
                tracing::info!(options = options.len(), "asking line-item clarification");
                let prompt = build_clarification_prompt(&options);
                return Ok(TurnOutcome::Clarification(PendingClarification {
                    options,
                    fact_fields: question.fact_fields.clone(),
                    scope: scope.clone(),
                    prompt,
                }));
            }
            tracing::debug!("clarification options collapsed; answering top candidate");
        }

        let top_id = ranked[0].candidate.line_item_id.clone();
        self.answer_for_line_item(&top_id, &question.fact_fields, scope)
            .map(|answer| match answer {
                Some(answer) => TurnOutcome::Answer(answer),
                None => TurnOutcome::Refusal(retrieval_refusal(message, question, scope)),
            })
    }

    fn answer_for_line_item(
        &self,
        line_item_id: &str,
        fields: &[FactField],
        scope: &LineItemScope,
    ) -> Result<Option<LineItemAnswer>> {
        let rows = self.store.fetch_line_items(&[line_item_id.to_string()])?;
        let Some(row) = rows.into_iter().find(|row| row.id == line_item_id) else {
            tracing::warn!("line item {} missing from store", line_item_id);
            return Ok(None);
        };

        Ok(Some(LineItemAnswer {
            text: build_line_item_answer(&row, fields),
            scope_disclosure: build_scope_disclosure(scope),
            citation: Some(build_line_item_citation(&row, scope)),
        }))
    }

    /// Handles the reply to a pending clarification without retrieving again.
    pub fn resolve_pending(
        &self,
        reply: &str,
        pending: &PendingClarification,
    ) -> Result<TurnOutcome> {
        match resolve_clarification_reply(reply, &pending.options) {
            ClarificationReply::Selected(idx) => {
                let option = &pending.options[idx];
                tracing::info!(selected = idx + 1, "clarification resolved");
                let answer =
                    self.answer_for_line_item(&option.line_item_id, &pending.fact_fields, &pending.scope)?;
                Ok(match answer {
                    Some(answer) => TurnOutcome::Answer(answer),
                    None => TurnOutcome::Refusal(build_refusal_message(&RefusalContext::new(
                        RefusalIntent::LineItemFact,
                        reply,
                    ))),
                })
            }
            ClarificationReply::Cancelled => {
                tracing::info!("clarification cancelled");
                Ok(TurnOutcome::Answer(LineItemAnswer {
                    text: CANCEL_REPLY_MESSAGE.to_string(),
                    scope_disclosure: None,
                    citation: None,
                }))
            }
            ClarificationReply::Unmatched => {
                tracing::debug!("clarification reply did not match an option");
                Ok(TurnOutcome::Clarification(PendingClarification {
                    prompt: clarification_reminder(pending.options.len()),
                    ..pending.clone()
                }))
            }
        }
    }
}

fn scope_label(scope: &LineItemScope) -> Option<String> {
    match scope {
        LineItemScope::Global => Some("all barangays".to_string()),
        LineItemScope::Barangay(resolution) => {
            display_barangay_name(resolution.barangay_name.as_deref())
        }
    }
}

fn retrieval_refusal(
    message: &str,
    question: &ParsedQuestion,
    scope: &LineItemScope,
) -> RefusalMessage {
    let mut ctx = RefusalContext::new(RefusalIntent::LineItemFact, message);
    ctx.fiscal_year = question.requested_fiscal_year;
    ctx.scope_label = scope_label(scope);
    tracing::info!(scope = scope.reason_label(), "no matching line item");
    build_refusal_message(&ctx)
}
