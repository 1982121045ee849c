use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

/// Epoch values above this magnitude are milliseconds, everything else is seconds
const EPOCH_MILLIS_THRESHOLD: f64 = 1e10;

const ZONED_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Resolves a raw timestamp candidate into an absolute UTC instant.
///
/// Accepts epoch seconds or milliseconds (as a JSON number or a numeric string) and
/// ISO-8601 strings. Anything that cannot be interpreted resolves to the current instant,
/// so this never fails.
pub fn resolve_timestamp(raw: Option<&Value>) -> DateTime<Utc> {
    resolve_timestamp_or(raw, Utc::now)
}

/// Same as [`resolve_timestamp`] with an explicit fallback clock.
pub fn resolve_timestamp_or(
    raw: Option<&Value>,
    fallback: impl FnOnce() -> DateTime<Utc>,
) -> DateTime<Utc> {
    let resolved = match raw {
        Some(Value::Number(number)) => match number.as_i64() {
            Some(epoch) => from_epoch_int(epoch),
            None => number.as_f64().and_then(from_epoch_float),
        },
        Some(Value::String(text)) => parse_iso8601(text).or_else(|| parse_numeric(text)),
        _ => None,
    };

    resolved.unwrap_or_else(fallback)
}

fn from_epoch_int(epoch: i64) -> Option<DateTime<Utc>> {
    if epoch.unsigned_abs() as f64 > EPOCH_MILLIS_THRESHOLD {
        DateTime::from_timestamp_millis(epoch)
    } else {
        DateTime::from_timestamp(epoch, 0)
    }
}

fn from_epoch_float(epoch: f64) -> Option<DateTime<Utc>> {
    if !epoch.is_finite() {
        return None;
    }

    let seconds = if epoch.abs() > EPOCH_MILLIS_THRESHOLD {
        epoch / 1000.0
    } else {
        epoch
    };

    let micros = (seconds * 1_000_000.0).round();
    if micros.abs() >= i64::MAX as f64 {
        return None;
    }

    DateTime::from_timestamp_micros(micros as i64)
}

fn parse_iso8601(text: &str) -> Option<DateTime<Utc>> {
    let text = match text.strip_suffix('Z') {
        Some(head) => format!("{head}+00:00"),
        None => text.to_string(),
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&text) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ZONED_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(&text, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }

    // Offset-less values are taken as UTC
    for format in NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(&text, format) {
            return Some(parsed.and_utc());
        }
    }

    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

fn parse_numeric(text: &str) -> Option<DateTime<Utc>> {
    text.trim().parse::<f64>().ok().and_then(from_epoch_float)
}
