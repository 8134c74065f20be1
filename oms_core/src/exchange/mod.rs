//! Uniform abstraction over the two exchange engines (spec.md §2 item 2,
//! §4.2). Rust cannot reflectively call into a Python `ccxt` instance the
//! way the original implementation does, so the adapter is split the way
//! the teacher's own `core::exchanges::traits::{ExchangeClient, Support}`
//! are split: a narrow trait with the concrete method set the
//! executor/reconciler actually use, plus a string-dispatched `call` for
//! arbitrary forwarding (SPEC_FULL.md §9).

pub mod adapter;
pub mod client;
pub mod session;

pub use adapter::ExchangeAdapter;
pub use client::{ExchangeClient, ExchangeClientFactory};
