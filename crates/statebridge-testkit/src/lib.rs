//! # Statebridge Testkit
//!
//! Testing utilities for the state bridge.
//!
//! - **Fixtures**: a [`TestHarness`](fixtures::TestHarness) running a real
//!   hub over the in-memory transport, plus [`settle`](fixtures::settle) for
//!   deterministic waiting without sleeps.
//! - **Generators**: proptest strategies for keys, values, snapshots, and
//!   shuffled revision sequences.
//! - **Wire vectors**: pinned JSON encodings of every message kind, so wire
//!   compatibility breaks loudly.

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{settle, TestHarness};
