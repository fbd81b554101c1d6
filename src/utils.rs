use std::fmt::Write;

use hifitime::prelude::Epoch;

/// `HH:MM:SS.mmm` (UTC), as used in the audit journals
pub fn audit_timestamp(t: Epoch) -> String {
    let (_, _, _, h, m, s, ns) = t.to_gregorian_utc();
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, ns / 1_000_000)
}

/// ISO-8601 UTC timestamp with millisecond resolution and `Z` suffix
pub fn iso_timestamp(t: Epoch) -> String {
    let (y, mo, d, h, m, s, ns) = t.to_gregorian_utc();
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        y,
        mo,
        d,
        h,
        m,
        s,
        ns / 1_000_000
    )
}

/// `HHMM` session stamp used in log file names
pub fn session_stamp(t: Epoch) -> String {
    let (_, _, _, h, m, _, _) = t.to_gregorian_utc();
    format!("{:02}{:02}", h, m)
}

/// Lower case hex dump, no separator
pub fn to_hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}
