use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;

/// All quantity/price/avg-price/pnl arithmetic in the OMS goes through
/// `rust_decimal::Decimal`; this module is the one place that talks to
/// loosely-typed JSON (exchange payloads, command params) on the way in.
pub fn decimal_or_zero(value: Option<&Value>) -> Decimal {
    value
        .and_then(value_to_decimal)
        .unwrap_or(Decimal::ZERO)
}

pub fn value_to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

pub trait GetOrErr {
    fn get_as_str(&self, key: &str) -> anyhow::Result<String>;
    fn get_as_decimal(&self, key: &str) -> Option<Decimal>;
}

impl GetOrErr for Value {
    fn get_as_str(&self, key: &str) -> anyhow::Result<String> {
        self.get(key)
            .and_then(|v| v.as_str())
            .map(str::to_owned)
            .ok_or_else(|| anyhow::anyhow!("unable to get `{key}` as string from {self}"))
    }

    fn get_as_decimal(&self, key: &str) -> Option<Decimal> {
        self.get(key).and_then(value_to_decimal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn parses_numeric_and_string_decimals() {
        assert_eq!(value_to_decimal(&Value::from("1.5")), Some(dec!(1.5)));
        assert_eq!(value_to_decimal(&Value::from(2)), Some(dec!(2)));
        assert_eq!(value_to_decimal(&Value::Null), None);
    }

    #[test]
    fn missing_key_defaults_to_zero() {
        let payload = serde_json::json!({"qty": "1.25"});
        assert_eq!(payload.get_as_decimal("qty"), Some(dec!(1.25)));
        assert_eq!(payload.get_as_decimal("price"), None);
    }
}
