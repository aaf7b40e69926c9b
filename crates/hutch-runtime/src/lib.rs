//! Container lifecycle supervision for hutch.
//!
//! Turns user intent into privileged helper invocations, and keeps one
//! durable record per container consistent with what actually happened.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cleanup;
pub mod engine;
pub mod exec;
pub mod handoff;
pub mod helper;
pub mod metrics;
pub mod process;
pub mod resolve;
pub mod state;
