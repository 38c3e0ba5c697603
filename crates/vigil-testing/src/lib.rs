//! Test doubles for the supervisor's process boundary.
//!
//! `ScriptedRunner` stands in for the real agent CLI: each launch replays a
//! scripted sequence of output lines, pauses, and file writes, then exits
//! with a chosen code. Fixture helpers build the NDJSON records the real
//! agent emits.

pub mod fixtures;
mod script;

pub use script::{Script, ScriptStep, ScriptedRunner};
