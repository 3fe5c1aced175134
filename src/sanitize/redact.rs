//! Redaction pass for outbound error text.
//!
//! Strips the substring classes most likely to leak internals: filesystem
//! paths, email addresses, bare IPv4 addresses, `key=value`-shaped secrets,
//! stack-frame references, and long opaque alphanumeric runs.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref KV_SECRET_REGEX: Regex = Regex::new(
        r"(?i)\b(key|token|secret|password|passwd|api[_-]?key|auth|credential)\s*[=:]\s*[^\s,;]+"
    )
    .unwrap();
    static ref STACK_FRAME_REGEX: Regex =
        Regex::new(r"[A-Za-z0-9_./\\\-]+\.(?:rs|py|js|ts|go|java|c|cpp):\d+(?::\d+)?").unwrap();
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"(?i)\b[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}\b").unwrap();
    static ref WINDOWS_PATH_REGEX: Regex = Regex::new(r#"[A-Za-z]:\\[^\s'\"]+"#).unwrap();
    static ref UNIX_PATH_REGEX: Regex = Regex::new(r"(?:/[A-Za-z0-9._\-]+){2,}/?").unwrap();
    static ref IPV4_REGEX: Regex = Regex::new(r"\b\d{1,3}(?:\.\d{1,3}){3}\b").unwrap();
    static ref LONG_OPAQUE_REGEX: Regex = Regex::new(r"\b[A-Za-z0-9_\-]{32,}\b").unwrap();
}

/// Redact sensitive substrings and cap the result at `max_len` characters.
pub fn redact(message: &str, max_len: usize) -> String {
    // Key/value secrets go first so the value is gone before the looser
    // patterns see it.
    let out = KV_SECRET_REGEX.replace_all(message, "${1}=[redacted]");
    let out = STACK_FRAME_REGEX.replace_all(&out, "[src]");
    let out = EMAIL_REGEX.replace_all(&out, "[email]");
    let out = WINDOWS_PATH_REGEX.replace_all(&out, "[path]");
    let out = UNIX_PATH_REGEX.replace_all(&out, "[path]");
    let out = IPV4_REGEX.replace_all(&out, "[addr]");
    let out = LONG_OPAQUE_REGEX.replace_all(&out, "[redacted]");

    truncate(&out, max_len)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        s.chars().take(max_len).collect()
    }
}
