use chrono::Utc;

/// Wall-clock time as nanoseconds since the Unix epoch.
///
/// Canvas timestamps and render times share this clock. Values outside the
/// representable range (year 2262 and later) saturate instead of wrapping.
pub fn unix_nanos() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .map(|nanos| nanos.max(0) as u64)
        .unwrap_or(u64::MAX)
}

/// Wall-clock time in whole seconds since the Unix epoch.
pub fn unix_secs() -> i64 {
    Utc::now().timestamp()
}
