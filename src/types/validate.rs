use super::PgType;
use crate::error::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});
static NUMERIC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?$").unwrap());

/// Validate a JSON value against a declared column type. Null is always
/// valid here; nullability is the caller's responsibility to enforce
/// separately (a NULL write to a NOT NULL column is rejected by the store
/// anyway, but the handler checks it first to report `validation_failed`
/// rather than `check_violation`).
pub fn validate(pg_type: PgType, value: &serde_json::Value) -> Result<()> {
    if value.is_null() {
        return Ok(());
    }

    let bad = |msg: &str| Err(Error::Validation(msg.to_string()));

    match pg_type {
        PgType::Uuid => match value.as_str() {
            Some(s) if UUID_RE.is_match(s) => Ok(()),
            _ => bad("expected a UUID string"),
        },
        PgType::Text => match value.as_str() {
            Some(_) => Ok(()),
            None => bad("expected a string"),
        },
        PgType::Integer => {
            if let Some(n) = value.as_i64() {
                if n >= i32::MIN as i64 && n <= i32::MAX as i64 {
                    Ok(())
                } else {
                    bad("integer out of range for a 32-bit column")
                }
            } else if value.as_f64().is_some() {
                bad("expected an integer, got a fractional number")
            } else {
                bad("expected an integer")
            }
        }
        PgType::Numeric => {
            if value.is_number() {
                Ok(())
            } else if let Some(s) = value.as_str() {
                if NUMERIC_RE.is_match(s) {
                    Ok(())
                } else {
                    bad("expected a numeric string")
                }
            } else {
                bad("expected a number")
            }
        }
        PgType::Boolean => {
            if value.is_boolean() {
                Ok(())
            } else if let Some(n) = value.as_i64() {
                if n == 0 || n == 1 {
                    Ok(())
                } else {
                    bad("boolean integer must be 0 or 1")
                }
            } else {
                bad("expected a boolean")
            }
        }
        PgType::Timestamptz => match value.as_str() {
            Some(s) if parse_timestamptz(s).is_some() => Ok(()),
            Some(_) => bad("unrecognized timestamp format"),
            None => bad("expected a timestamp string"),
        },
        PgType::Jsonb => {
            if value.is_object() || value.is_array() {
                Ok(())
            } else if let Some(s) = value.as_str() {
                match serde_json::from_str::<serde_json::Value>(s) {
                    Ok(v) if v.is_object() || v.is_array() => Ok(()),
                    _ => bad("expected a JSON object or array"),
                }
            } else {
                bad("expected a JSON object or array")
            }
        }
        PgType::Bytea => {
            if let Some(s) = value.as_str() {
                use base64::Engine;
                if base64::engine::general_purpose::STANDARD.decode(s).is_ok() {
                    Ok(())
                } else {
                    bad("expected base64-encoded bytes")
                }
            } else {
                bad("expected a base64 string")
            }
        }
    }
}

/// Parse the accepted timestamptz formats: RFC3339, RFC3339Nano,
/// `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD`.
pub fn parse_timestamptz(s: &str) -> Option<chrono::DateTime<chrono::Utc>> {
    use chrono::{NaiveDate, NaiveDateTime, TimeZone};

    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&chrono::Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Some(chrono::Utc.from_utc_datetime(&ndt));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(chrono::Utc.from_utc_datetime(&ndt));
    }
    if let Ok(nd) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(chrono::Utc.from_utc_datetime(&nd.and_hms_opt(0, 0, 0)?));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn uuid_validates() {
        assert!(validate(PgType::Uuid, &json!("550e8400-e29b-41d4-a716-446655440000")).is_ok());
        assert!(validate(PgType::Uuid, &json!("not-a-uuid")).is_err());
    }

    #[test]
    fn integer_rejects_fraction() {
        assert!(validate(PgType::Integer, &json!(5)).is_ok());
        assert!(validate(PgType::Integer, &json!(5.5)).is_err());
    }

    #[test]
    fn numeric_accepts_string_or_number() {
        assert!(validate(PgType::Numeric, &json!("12.50")).is_ok());
        assert!(validate(PgType::Numeric, &json!(12.5)).is_ok());
        assert!(validate(PgType::Numeric, &json!("x")).is_err());
    }

    #[test]
    fn boolean_accepts_zero_one() {
        assert!(validate(PgType::Boolean, &json!(true)).is_ok());
        assert!(validate(PgType::Boolean, &json!(1)).is_ok());
        assert!(validate(PgType::Boolean, &json!(2)).is_err());
    }

    #[test]
    fn timestamptz_accepts_multiple_formats() {
        assert!(validate(PgType::Timestamptz, &json!("2024-01-01T00:00:00Z")).is_ok());
        assert!(validate(PgType::Timestamptz, &json!("2024-01-01 00:00:00")).is_ok());
        assert!(validate(PgType::Timestamptz, &json!("2024-01-01")).is_ok());
        assert!(validate(PgType::Timestamptz, &json!("not-a-date")).is_err());
    }

    #[test]
    fn jsonb_rejects_primitives() {
        assert!(validate(PgType::Jsonb, &json!({"a": 1})).is_ok());
        assert!(validate(PgType::Jsonb, &json!([1, 2])).is_ok());
        assert!(validate(PgType::Jsonb, &json!(5)).is_err());
    }

    #[test]
    fn null_always_valid() {
        assert!(validate(PgType::Integer, &serde_json::Value::Null).is_ok());
    }
}
