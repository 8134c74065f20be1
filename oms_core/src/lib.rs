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

//! The OMS business logic: validation, dispatching, execution and
//! reconciliation sit here, against the store in `oms_database` and the
//! exchange boundary in `exchange`. Grounded on the teacher's `core` crate
//! shape — one crate owning settings, exchange traits and the RPC surface's
//! server-side implementation, with the wire schemas split out into a thin
//! sibling (`mmb_rpc` there, `oms_rpc` here).

pub mod auth;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod error;
pub mod event_ring;
pub mod exchange;
pub mod executor;
pub mod intake;
pub mod queue_worker;
pub mod reconciler;

pub use config::Settings;
pub use credentials::CredentialsCodec;
pub use error::{AdapterError, DispatchError, ExecutorError, IntakeError};
