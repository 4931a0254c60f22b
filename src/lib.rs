pub mod aggregation;
pub mod answer;
pub mod chat;
pub mod city_scope;
pub mod clarification;
pub mod config;
pub mod evidence;
pub mod models;
pub mod question;
pub mod refusal;
pub mod rerank;
pub mod scope;
pub mod text;

pub use chat::{ChatRouter, ChatTurn, Route, TurnOutcome};
pub use config::RankingConfig;
