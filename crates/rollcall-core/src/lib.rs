//! Core types and reconciliation logic for rollcall.
//!
//! Classification and batching are pure functions over [`record::RosterRecord`].
//! The ledger and the external sinks are traits; the SQLite ledger and the
//! LMS/audit clients live in other crates.

// Trait declarations spell out `Send` futures; impls use plain `async fn`.
#![allow(async_fn_in_trait)]

pub mod batch;
pub mod eligibility;
pub mod error;
pub mod intake;
pub mod ledger;
pub mod memory;
pub mod reconcile;
pub mod record;
pub mod report;

pub use error::{Error, Result};
