// LogWarden - app/mod.rs
//
// Application layer: phase-table loading, product resolvers, attachment
// discovery and the analysis pipeline.
// Dependencies: core, platform.

pub mod catalog;
pub mod context;
pub mod discovery;
pub mod phase_mgr;
pub mod pipeline;
