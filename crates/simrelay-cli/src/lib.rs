//! simrelay CLI library
//!
//! The binary's pieces, exposed for integration tests: argument parsing, the
//! console front end, the demo engine and the controller loop.

pub mod app;
pub mod cli;
pub mod console;
pub mod demo;
