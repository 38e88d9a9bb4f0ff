//! Business logic and repository trait definitions for Mnemo.
//!
//! This crate defines the "ports" (repository traits) that the
//! infrastructure layer implements, plus the memory engine and prompt
//! builder. It depends only on `mnemo-types` -- never on `mnemo-infra`
//! or any database/IO crate.

pub mod chat;
pub mod llm;
pub mod memory;
