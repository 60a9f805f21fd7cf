use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

pub fn utc_now() -> DateTime<Utc> {
    Utc::now()
}

/// Epoch-Sekunden (f64) → UTC, auf Mikrosekunden gerundet.
/// `None` für NaN/∞ oder außerhalb des chrono-Bereichs.
///
/// An f64 around 1.7e9 only resolves ~0.24 µs, so rounding to whole
/// microseconds gives back exactly what the writer stored.
pub fn from_epoch_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let micros = ((secs - whole) * 1_000_000.0).round() as i64;
    let (whole, micros) = if micros >= 1_000_000 {
        (whole as i64 + 1, 0)
    } else {
        (whole as i64, micros)
    };
    DateTime::from_timestamp(whole, (micros * 1_000) as u32)
}

pub fn to_epoch_secs(ts: DateTime<Utc>) -> f64 {
    ts.timestamp() as f64 + ts.timestamp_subsec_nanos() as f64 / 1_000_000_000.0
}

/// Parses an ISO-8601 timestamp as sent by event producers.
///
/// RFC 3339 strings keep their offset. Naive strings
/// (`2025-03-01T12:00:00.250`) are read as local wall-clock time.
pub fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
}

pub fn format_hms_millis(ts: DateTime<Utc>) -> String {
    ts.format("%H:%M:%S%.3f").to_string()
}
