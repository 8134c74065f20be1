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

pub mod cancellation_token;
pub mod decimal;
pub mod id_macros;
pub mod infrastructure;
pub mod logger;
pub mod time;

pub type DateTime = chrono::DateTime<chrono::Utc>;

pub static OPERATION_CANCELED_MSG: &str = "Operation cancelled";

/// Just for marking explicitly: no action to do here and it is not a forgotten branch.
#[inline(always)]
pub fn nothing_to_do() {}

#[macro_export]
macro_rules! hashmap {
    ($( $key: expr => $val: expr ),* $(,)?) => {{
         let mut map = ::std::collections::HashMap::new();
         $( map.insert($key, $val); )*
         map
    }}
}
