// LogWarden - platform/mod.rs
//
// Platform abstraction layer: paths, config files, attachment sources and
// decompression.
// Dependencies: standard library, directories, flate2, zip, tempfile, core
// model types.
// Must NOT depend on: app.

pub mod config;
pub mod source;
pub mod stream;
