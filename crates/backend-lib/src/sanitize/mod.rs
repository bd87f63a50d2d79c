//! Boundary layer between untrusted client JSON and stored room state.
//!
//! Every function here is total: whatever shape arrives, the result has the
//! expected type, finite numbers inside their clamp range, trimmed and capped
//! strings, and lists no longer than their per-entity cap. Nothing in this
//! module knows about rooms.

pub mod entities;
pub mod heartbeat;

pub use entities::{
    sanitize_buildings, sanitize_enemies, sanitize_minerals, sanitize_projectiles,
    sanitize_units, sanitize_world, sanitize_world_state,
};
pub use heartbeat::{sanitize_heartbeat, HeartbeatPayload};

use serde_json::{Map, Value};

/// Outcome of parsing one untrusted list entry
#[derive(Debug, Clone, PartialEq)]
pub enum Sanitized<T> {
    Ok(T),
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    NotAnObject,
    MissingDiscriminator,
}

impl<T> Sanitized<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Sanitized::Ok(value) => Some(value),
            Sanitized::Dropped(_) => None,
        }
    }
}

/// Parse every entry of an array-shaped value, keeping at most `cap` records.
/// Anything that is not an array yields an empty list.
pub fn bounded_list<T>(
    value: Option<&Value>,
    cap: usize,
    parse: impl Fn(&Value) -> Sanitized<T>,
) -> Vec<T> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| parse(entry).ok())
        .take(cap)
        .collect()
}

/// Run `parse` on an object entry, dropping anything else.
pub fn with_object<T>(
    value: &Value,
    parse: impl FnOnce(&Map<String, Value>) -> Sanitized<T>,
) -> Sanitized<T> {
    match value.as_object() {
        Some(obj) => parse(obj),
        None => Sanitized::Dropped(DropReason::NotAnObject),
    }
}

/// Coerce a JSON value to a finite number. Numeric strings and booleans count;
/// everything else, and non-finite results, yield `None`.
pub fn coerce_number(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok()?
        },
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Finite number clamped to `[min, max]`, `default` when not coercible.
pub fn number(value: Option<&Value>, default: f64, min: f64, max: f64) -> f64 {
    coerce_number(value).unwrap_or(default).clamp(min, max)
}

pub fn opt_number(value: Option<&Value>, min: f64, max: f64) -> Option<f64> {
    coerce_number(value).map(|n| n.clamp(min, max))
}

/// Like [`number`] but floored to an integer.
pub fn integer(value: Option<&Value>, default: i64, min: i64, max: i64) -> i64 {
    opt_integer(value, min, max).unwrap_or_else(|| default.clamp(min, max))
}

#[allow(clippy::cast_possible_truncation)]
pub fn opt_integer(value: Option<&Value>, min: i64, max: i64) -> Option<i64> {
    coerce_number(value).map(|n| (n.floor().clamp(min as f64, max as f64)) as i64)
}

/// Entity id: non-negative integer, 0 when absent.
#[allow(clippy::cast_sign_loss)]
pub fn entity_id(value: Option<&Value>) -> u64 {
    integer(value, 0, 0, MAX_ENTITY_ID) as u64
}

pub const MAX_ENTITY_ID: i64 = 1_000_000_000;

/// Trimmed string capped to `max_chars`; non-strings become empty.
pub fn text(value: Option<&Value>, max_chars: usize) -> String {
    opt_text(value, max_chars).unwrap_or_default()
}

pub fn opt_text(value: Option<&Value>, max_chars: usize) -> Option<String> {
    let s = value?.as_str()?;
    let capped: String = s.trim().chars().take(max_chars).collect();
    Some(capped.trim_end().to_string())
}

/// Non-empty capped string, used for discriminator fields.
pub fn required_text(value: Option<&Value>, max_chars: usize) -> Option<String> {
    opt_text(value, max_chars).filter(|s| !s.is_empty())
}

/// JavaScript truthiness.
pub fn flag(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0 && !n.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_) | Value::Object(_)) => true,
    }
}

pub fn opt_flag(value: Option<&Value>) -> Option<bool> {
    value.map(|v| flag(Some(v)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coerce_number() {
        assert_eq!(coerce_number(Some(&json!(4.5))), Some(4.5));
        assert_eq!(coerce_number(Some(&json!(" 12 "))), Some(12.0));
        assert_eq!(coerce_number(Some(&json!(true))), Some(1.0));
        assert_eq!(coerce_number(Some(&json!("NaN"))), None);
        assert_eq!(coerce_number(Some(&json!("inf"))), None);
        assert_eq!(coerce_number(Some(&json!(""))), None);
        assert_eq!(coerce_number(Some(&json!([1]))), None);
        assert_eq!(coerce_number(None), None);
    }

    #[test]
    fn test_number_clamps_and_defaults() {
        assert_eq!(number(Some(&json!(1e300)), 0.0, 0.0, 10.0), 10.0);
        assert_eq!(number(Some(&json!(-3)), 0.0, 0.0, 10.0), 0.0);
        assert_eq!(number(Some(&json!({})), 7.0, 0.0, 10.0), 7.0);
        assert_eq!(integer(Some(&json!(3.9)), 1, 1, 10), 3);
        assert_eq!(integer(Some(&json!(-1e20)), 1, 1, 10), 1);
        assert_eq!(entity_id(Some(&json!(-5))), 0);
        assert_eq!(entity_id(Some(&json!(1e15))), 1_000_000_000);
    }

    #[test]
    fn test_text_is_trimmed_and_capped() {
        assert_eq!(text(Some(&json!("  wall  ")), 24), "wall");
        assert_eq!(text(Some(&json!("abcdef")), 3), "abc");
        // truncation must not leave trailing whitespace behind
        assert_eq!(text(Some(&json!("ab cd")), 3), "ab");
        assert_eq!(text(Some(&json!(12)), 3), "");
        assert_eq!(required_text(Some(&json!("   ")), 8), None);
    }

    #[test]
    fn test_flag_truthiness() {
        assert!(!flag(None));
        assert!(!flag(Some(&json!(0))));
        assert!(!flag(Some(&json!(""))));
        assert!(flag(Some(&json!("no"))));
        assert!(flag(Some(&json!([]))));
        assert_eq!(opt_flag(None), None);
        assert_eq!(opt_flag(Some(&json!(null))), Some(false));
    }

    #[test]
    fn test_bounded_list_rejects_non_arrays() {
        let parse = |v: &Value| with_object(v, |_| Sanitized::Ok(()));
        assert!(bounded_list(Some(&json!({"0": {}})), 5, parse).is_empty());
        assert!(bounded_list(Some(&json!("[]")), 5, parse).is_empty());
        assert!(bounded_list(None, 5, parse).is_empty());
        assert_eq!(bounded_list(Some(&json!([{}, 1, {}, {}])), 2, parse).len(), 2);
    }
}
