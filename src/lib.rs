// LogWarden - lib.rs
//
// Library entry point, exposing the analysis pipeline for the CLI, for
// integration testing and for chat integrations that embed it.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
