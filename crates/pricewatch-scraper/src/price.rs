//! Normalization of marketplace price and volume strings.

use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::{Decimal, RoundingStrategy};

/// Exclusive upper bound of a stored price (`NUMERIC(14,2)`).
const PRICE_CEILING: i64 = 1_000_000_000_000;

static NON_NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^0-9.,]").expect("valid price regex"));

/// Parses a human-formatted price such as `"¥ 1,234.50"`, `"1.234,50€"` or
/// `"12,5"` into a two-decimal value, rounding half away from zero.
///
/// Currency symbols and whitespace are stripped. When both `,` and `.` are
/// present the later one is the decimal separator. A lone `,` is a decimal
/// separator only when followed by one or two digits; otherwise it groups
/// thousands. Repeated `.` groups thousands.
///
/// Returns `None` for input with no digits, that still fails to parse, or
/// whose value does not fit the price-history column; callers treat that as
/// "no result", never as zero.
#[must_use]
pub fn parse_price(raw: &str) -> Option<Decimal> {
    let clean = NON_NUMERIC.replace_all(raw, "");
    if !clean.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match (clean.rfind(','), clean.rfind('.')) {
        (Some(comma), Some(dot)) if comma < dot => clean.replace(',', ""),
        (Some(_), Some(_)) => clean.replace('.', "").replace(',', "."),
        (Some(comma), None) => {
            let decimals = clean.len() - comma - 1;
            if clean.matches(',').count() == 1 && (1..=2).contains(&decimals) {
                clean.replace(',', ".")
            } else {
                clean.replace(',', "")
            }
        }
        (None, Some(_)) if clean.matches('.').count() > 1 => clean.replace('.', ""),
        _ => clean.into_owned(),
    };

    let value = normalized.parse::<Decimal>().ok()?;
    if value.is_sign_negative() {
        return None;
    }
    let value = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    if value >= Decimal::from(PRICE_CEILING) {
        return None;
    }
    Some(value)
}

/// Parses a volume/listing count, keeping digits only. Anything without
/// digits is `0`.
#[must_use]
pub fn parse_volume(raw: &str) -> i64 {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// Text form of a JSON price field that may arrive as a string or a number.
pub(crate) fn json_price_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn strips_currency_and_grouping() {
        assert_eq!(parse_price("¥ 1,234.50"), Some(dec("1234.50")));
        assert_eq!(parse_price("RM 123.00"), Some(dec("123.00")));
        assert_eq!(parse_price("$1,000"), Some(dec("1000")));
    }

    #[test]
    fn european_formats_use_comma_decimals() {
        assert_eq!(parse_price("1.234,50€"), Some(dec("1234.50")));
        assert_eq!(parse_price("12,5"), Some(dec("12.5")));
        assert_eq!(parse_price("1.234.567"), Some(dec("1234567")));
    }

    #[test]
    fn rounds_half_up_to_two_places() {
        assert_eq!(parse_price("10.005"), Some(dec("10.01")));
        assert_eq!(parse_price("10.004"), Some(dec("10.00")));
        assert_eq!(parse_price("106"), Some(dec("106")));
    }

    #[test]
    fn unparseable_input_is_none_not_zero() {
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("--"), None);
        assert_eq!(parse_price("N/A"), None);
        assert_eq!(parse_price("1.2.3,4.5"), None);
    }

    #[test]
    fn prices_beyond_the_stored_range_are_rejected() {
        assert_eq!(parse_price("¥ 1,234,567,890,123"), None);
        assert_eq!(parse_price("1000000000000"), None);
        assert_eq!(parse_price("999999999999.995"), None);
        assert_eq!(
            parse_price("999,999,999,999.99"),
            Some(dec("999999999999.99"))
        );
    }

    #[test]
    fn volume_keeps_digits_only() {
        assert_eq!(parse_volume("1,234"), 1234);
        assert_eq!(parse_volume("12 sold"), 12);
        assert_eq!(parse_volume(""), 0);
        assert_eq!(parse_volume("none"), 0);
    }

    #[test]
    fn json_price_accepts_strings_and_numbers() {
        assert_eq!(
            json_price_text(&serde_json::json!("100.5")).as_deref(),
            Some("100.5")
        );
        assert_eq!(
            json_price_text(&serde_json::json!(99.9)).as_deref(),
            Some("99.9")
        );
        assert_eq!(json_price_text(&serde_json::Value::Null), None);
    }
}
