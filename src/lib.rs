#![allow(unused_doc_comments)]

#[macro_use(debug)]
extern crate tracing;

pub mod atn;
pub mod atn_deserializer;
pub mod atn_state;
pub mod conflict_information;
pub mod dfa;
pub mod dfa_state;
pub mod errors;
pub mod interval_set;
pub mod lexer_action;
pub mod lexer_action_executor;
pub mod murmur_hash;
pub mod prediction_context;
pub mod prediction_context_cache;
pub mod rule_context;
pub mod semantic_context;
pub mod token;
pub mod transition;
pub mod tree;
pub mod uuid;
