//! ircprobe - conformance and resilience harness for IRC servers.
//!
//! The harness opens raw TCP connections to a running server, drives
//! scripted exchanges through them, and turns whatever comes back into
//! per-scenario verdicts. See [`runner::Runner`] for the entry point.

pub mod catalog;
pub mod config;
pub mod console;
pub mod handshake;
pub mod payloads;
pub mod predicate;
pub mod registry;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod verdict;
