#![deny(
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_must_use
)]

//! The relational store behind the OMS (spec.md §2 item 1, §4.1). Every
//! public function here takes a borrowed `tokio_postgres::GenericClient` so
//! the caller decides the transaction boundary — the same split the teacher
//! draws between `mmb_database::postgres_db::Client` (connection ownership)
//! and its callers (transaction scope).

pub mod error;
pub mod migrator;
pub mod pool;
pub mod store;

pub use error::{DbError, Result};
pub use pool::{connect_pool, DbPool, PooledClient};
pub use store::{accounts, admin, auth, commands, deals, events, locks, orders, positions, reconciliation, risk};
