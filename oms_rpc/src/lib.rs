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

//! Shared wire-format crate between the dispatcher server (`oms_core`) and
//! any client. Plain serde types, no transport or business logic, the way
//! `mmb_rpc::rest_api` sits between `core` and its callers.

pub mod envelope;
pub mod error;
pub mod ops;

pub use envelope::{Request, Response};
pub use error::{ErrorCode, RpcError};
pub use ops::Op;

/// One line == one JSON object, in either direction, capped at this frame
/// size (spec.md §4.4, §6 "max frame 8 MiB").
pub const MAX_FRAME_BYTES: usize = 8 * 1024 * 1024;
