// LogWarden - core/mod.rs
//
// Core analysis layer: line assembly, phase tables, the phase engine and
// report rendering.
// Dependencies: standard library, regex, serde, chrono, tracing.
// Must NOT depend on: platform, app, or any file/network I/O.

pub mod engine;
pub mod lines;
pub mod model;
pub mod moderation;
pub mod phase;
pub mod report;
pub mod sanitize;
