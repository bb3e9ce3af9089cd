//! Wire-flexible numeric decoding.
//!
//! Exchanges are not consistent about how they encode numbers: the same
//! timestamp field may arrive as a JSON integer, a JSON float, or a numeric
//! string. [`decode_i64`] accepts all three and normalizes them to `i64`:
//!
//! | input                         | result                                   |
//! |-------------------------------|------------------------------------------|
//! | `null`                        | `0`                                      |
//! | integer that fits `i64`       | verbatim                                 |
//! | any other number              | round half to even, then saturate        |
//! | string                        | integer parse, else float parse as above |
//! | bool / object / array / junk  | [`DecodeError::Integer`]                 |
//!
//! Decimal price fields use the opposite policy: [`parse_decimal`] never
//! fails and maps anything unparsable to `0.0`.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::DecodeError;

/// `2^63` as `f64`. Exactly representable, and one past `i64::MAX`.
const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

/// Decode a JSON scalar of unknown shape into an `i64`.
pub fn decode_i64(v: &Value) -> Result<i64, DecodeError> {
    match v {
        Value::Null => Ok(0),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(i);
            }
            // u64 above i64::MAX, or a float. With `arbitrary_precision` the
            // number keeps its literal text, so `1e400` reaches the
            // saturation rule instead of failing in the parser.
            decode_i64_str(&n.to_string())
        }
        Value::String(s) => decode_i64_str(s),
        other => Err(DecodeError::Integer(other.to_string())),
    }
}

/// Decode a bare numeric token (the content of a JSON string).
///
/// Integer syntax is tried first so that values above 2^53 survive without
/// passing through `f64`.
pub fn decode_i64_str(s: &str) -> Result<i64, DecodeError> {
    if let Ok(i) = s.parse::<i64>() {
        return Ok(i);
    }
    s.parse::<f64>()
        .ok()
        .and_then(round_saturating)
        .ok_or_else(|| DecodeError::Integer(format!("{s:?}")))
}

/// Round half to even, then clamp into the `i64` range.
///
/// The range check runs on the value *before* rounding and against the
/// exact float boundaries `2^63` / `-2^63`, so `i64::MAX as f64` (which is
/// itself rounded up to `2^63`) never takes part in a comparison.
/// Returns `None` for NaN.
pub fn round_saturating(f: f64) -> Option<i64> {
    if f.is_nan() {
        None
    } else if f >= TWO_POW_63 {
        Some(i64::MAX)
    } else if f < -TWO_POW_63 {
        Some(i64::MIN)
    } else {
        // In range: |rounded| <= 2^63 - 1024 or exactly -2^63.
        Some(f.round_ties_even() as i64)
    }
}

/// Parse a decimal string as `f64`, mapping failures to `0.0`.
#[inline]
pub fn parse_decimal(s: &str) -> f64 {
    fast_float2::parse(s).unwrap_or(0.0)
}

/// Serde adapter for `#[serde(deserialize_with = "flex_i64")]`.
///
/// Deserializes the field as an untyped JSON value and hands it to
/// [`decode_i64`], so the lenient rules live in one place.
pub fn flex_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let v = Value::deserialize(deserializer)?;
    decode_i64(&v).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(text: &str) -> Result<i64, DecodeError> {
        let v: Value = serde_json::from_str(text).unwrap();
        decode_i64(&v)
    }

    #[test]
    fn null_is_zero() {
        assert_eq!(raw("null").unwrap(), 0);
    }

    #[test]
    fn integers_verbatim() {
        assert_eq!(raw("12345").unwrap(), 12345);
        assert_eq!(raw("-7").unwrap(), -7);
        assert_eq!(raw("9223372036854775807").unwrap(), i64::MAX);
        assert_eq!(raw("-9223372036854775808").unwrap(), i64::MIN);
        // Above 2^53: must not lose precision through f64.
        assert_eq!(raw("1672515782136123457").unwrap(), 1_672_515_782_136_123_457);
    }

    #[test]
    fn integer_round_trips_through_string() {
        for x in [0i64, 1, -1, 1_672_515_782_136, i64::MAX, i64::MIN] {
            assert_eq!(decode_i64_str(&x.to_string()).unwrap(), x);
            assert_eq!(decode_i64(&json!(x.to_string())).unwrap(), x);
        }
    }

    #[test]
    fn floats_round_to_nearest() {
        assert_eq!(raw("12345.67").unwrap(), 12346);
        assert_eq!(raw("12345.4").unwrap(), 12345);
        assert_eq!(raw("-12345.67").unwrap(), -12346);
        assert_eq!(raw("1e3").unwrap(), 1000);
    }

    #[test]
    fn ties_go_to_even() {
        assert_eq!(raw("2.5").unwrap(), 2);
        assert_eq!(raw("1.5").unwrap(), 2);
        assert_eq!(raw("0.5").unwrap(), 0);
        assert_eq!(raw("-0.5").unwrap(), 0);
        assert_eq!(raw("-1.5").unwrap(), -2);
        assert_eq!(raw("12344.5").unwrap(), 12344);
        assert_eq!(raw("12345.5").unwrap(), 12346);
        assert_eq!(decode_i64_str("12344.5").unwrap(), 12344);
        assert_eq!(decode_i64_str("12345.5").unwrap(), 12346);
    }

    #[test]
    fn saturates_out_of_range() {
        assert_eq!(raw("9223372036854775808").unwrap(), i64::MAX);
        assert_eq!(raw("9223372036854775808.0").unwrap(), i64::MAX);
        assert_eq!(raw("1e30").unwrap(), i64::MAX);
        assert_eq!(raw("-9223372036854775809.0").unwrap(), i64::MIN);
        assert_eq!(raw("-1e30").unwrap(), i64::MIN);
        assert_eq!(decode_i64_str("1e300").unwrap(), i64::MAX);
        assert_eq!(decode_i64_str("-1e300").unwrap(), i64::MIN);
        assert_eq!(raw("1e400").unwrap(), i64::MAX);
        assert_eq!(raw("-1e400").unwrap(), i64::MIN);
        assert_eq!(raw("123456789012345678901234567890").unwrap(), i64::MAX);
        assert_eq!(decode_i64_str("inf").unwrap(), i64::MAX);
        assert_eq!(decode_i64_str("-inf").unwrap(), i64::MIN);
    }

    #[test]
    fn boundary_is_not_double_rounded() {
        // Largest f64 below 2^63 is 2^63 - 1024; it must map exactly.
        let below = 9_223_372_036_854_774_784.0_f64;
        assert_eq!(round_saturating(below), Some(9_223_372_036_854_774_784));
        assert_eq!(round_saturating(-TWO_POW_63), Some(i64::MIN));
        assert_eq!(round_saturating(TWO_POW_63), Some(i64::MAX));
    }

    #[test]
    fn string_forms() {
        assert_eq!(raw(r#""12345""#).unwrap(), 12345);
        assert_eq!(raw(r#""12345.67""#).unwrap(), 12346);
        assert_eq!(raw(r#""2.5""#).unwrap(), 2);
    }

    #[test]
    fn rejects_non_numeric() {
        assert!(raw(r#""invalid""#).is_err());
        assert!(raw(r#""""#).is_err());
        assert!(raw(r#"" 12""#).is_err());
        assert!(raw(r#""NaN""#).is_err());
        assert!(raw("{}").is_err());
        assert!(raw("[1]").is_err());
        assert!(raw("true").is_err());
    }

    #[test]
    fn lenient_decimal() {
        assert_eq!(parse_decimal("50000.00"), 50000.0);
        assert_eq!(parse_decimal("-0.0015"), -0.0015);
        assert_eq!(parse_decimal(""), 0.0);
        assert_eq!(parse_decimal("abc"), 0.0);
    }

    #[test]
    fn serde_adapter() {
        #[derive(serde::Deserialize)]
        struct Probe {
            #[serde(deserialize_with = "flex_i64")]
            t: i64,
        }
        let p: Probe = serde_json::from_str(r#"{"t":"1625097600000"}"#).unwrap();
        assert_eq!(p.t, 1_625_097_600_000);
        let p: Probe = serde_json::from_str(r#"{"t":1625097600000.5}"#).unwrap();
        assert_eq!(p.t, 1_625_097_600_000);
        assert!(serde_json::from_str::<Probe>(r#"{"t":false}"#).is_err());
    }
}
