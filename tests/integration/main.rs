//! Integration Tests
//!
//! End-to-end tests across the core, durability and engine crates:
//! - Index: round trips, structural invariants, recall
//! - Ingest: dedup, backpressure, bus-driven intake
//! - Persistence: snapshot/restore, corruption, pruning
//! - Runtime: open/shutdown lifecycle

#[path = "../common/mod.rs"]
mod common;

mod index;
mod ingest;
mod persistence;
mod runtime;
