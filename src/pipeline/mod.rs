//! Pipeline stages for turning a model completion into display tables.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the processing step in [`crate::process`] stays a flat sequence.
//!
//! ## Data Flow
//!
//! ```text
//! storage ──▶ llm ──▶ extract ──▶ normalize ──▶ storage      (processing request)
//! (upload)   (API)   (strategy   (canonical     (.result.json)
//!                     chain)      JSON)
//!
//! canonical JSON ──▶ tables                                  (visualiser request)
//! ```
//!
//! 1. [`storage`]   — where uploads and their artifacts live; path containment
//! 2. [`llm`]       — file upload, Responses call, completion-text extraction;
//!    the only stage with network I/O
//! 3. [`extract`]   — locate and validate the `{"Matriz": [...]}` object
//! 4. [`normalize`] — deterministic re-serialisation
//! 5. [`tables`]    — classify a JSON shape and produce `{title, markup}` tables

pub mod extract;
pub mod llm;
pub mod normalize;
pub mod storage;
pub mod tables;
