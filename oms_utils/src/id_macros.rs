/// Declares a `Copy` newtype around `i64` for a database-assigned primary key
/// (accounts, orders, positions, ...). These ids are assigned by the store,
/// never generated client-side, so unlike `impl_str_id!`/`impl_u64_id!` in
/// the teacher crate there is no atomic counter here.
#[macro_export]
macro_rules! impl_i64_id {
    ($type: ident) => {
        #[derive(
            Debug,
            Default,
            Clone,
            Copy,
            Eq,
            PartialEq,
            Ord,
            PartialOrd,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $type(pub i64);

        impl $type {
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }

            pub const fn is_set(self) -> bool {
                self.0 > 0
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $type {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$type> for i64 {
            fn from(value: $type) -> Self {
                value.0
            }
        }
    };
}

/// Declares a `Clone` newtype around a `SmallString` for a caller/exchange
/// supplied string identifier (client order ids, request ids, ...).
/// Grounded on `mmb_utils::impl_str_id!`, minus the atomic-counter
/// `unique_id()` constructor: these ids are either supplied by the caller or
/// derived deterministically (`ext-trade:<trade_id>`), never generated here.
#[macro_export]
macro_rules! impl_str_id {
    ($type: ident) => {
        #[derive(
            Debug,
            Clone,
            Eq,
            PartialEq,
            Ord,
            PartialOrd,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $type(smallstr::SmallString<[u8; 24]>);

        impl $type {
            pub fn new(value: impl AsRef<str>) -> Self {
                use std::str::FromStr;
                Self(smallstr::SmallString::from_str(value.as_ref()).unwrap_or_default())
            }

            pub fn as_str(&self) -> &str {
                self.0.as_str()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl std::fmt::Display for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $type {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $type {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    impl_i64_id!(TestAccountId);
    impl_str_id!(TestClientOrderId);

    #[test]
    fn i64_id_roundtrips() {
        let id = TestAccountId::from(42);
        assert_eq!(id.get(), 42);
        assert!(id.is_set());
        assert_eq!(format!("{id}"), "42");
    }

    #[test]
    fn unset_i64_id_is_not_set() {
        assert!(!TestAccountId::default().is_set());
    }

    #[test]
    fn str_id_roundtrips() {
        let id = TestClientOrderId::from("abc-123");
        assert_eq!(id.as_str(), "abc-123");
        assert_eq!(format!("{id}"), "abc-123");
    }
}
