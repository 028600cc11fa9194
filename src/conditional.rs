//! Conditional request evaluation (RFC 7232 section 6).

use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::{header, HeaderMap, HeaderValue};
use axum_extra::headers::{Header, LastModified};

/// The inbound headers that steer a conditional or partial GET.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalContext {
    pub range: Option<String>,
    pub if_range: Option<String>,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub if_unmodified_since: Option<String>,
    pub if_modified_since: Option<String>,
}

impl ConditionalContext {
    /// Picks the first value of each recognized header. Empty values count as
    /// absent.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let pick = |name: header::HeaderName| {
            headers
                .get(name)
                .and_then(|v| std::str::from_utf8(v.as_bytes()).ok())
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };
        ConditionalContext {
            range: pick(header::RANGE),
            if_range: pick(header::IF_RANGE),
            if_match: pick(header::IF_MATCH),
            if_none_match: pick(header::IF_NONE_MATCH),
            if_unmodified_since: pick(header::IF_UNMODIFIED_SINCE),
            if_modified_since: pick(header::IF_MODIFIED_SINCE),
        }
    }
}

/// Outcome of evaluating preconditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// Serve the representation. `range` is the Range header still in force
    /// after If-Range, if any.
    Proceed { range: Option<String> },
    /// 304.
    NotModified,
    /// 412.
    PreconditionFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cond {
    None,
    True,
    False,
}

/// Evaluates `ctx` against the resource's current validators.
///
/// `mod_time` of `None` or the Unix epoch counts as unspecified, which
/// disables the date-based checks.
pub fn evaluate(ctx: &ConditionalContext, etag: Option<&str>, mod_time: Option<SystemTime>) -> Precondition {
    let etag = etag.unwrap_or("");
    let mod_time = mod_time.filter(|t| *t != UNIX_EPOCH);

    let mut ch = check_if_match(ctx.if_match.as_deref(), etag);
    if ch == Cond::None {
        ch = check_if_unmodified_since(ctx.if_unmodified_since.as_deref(), mod_time);
    }
    if ch == Cond::False {
        return Precondition::PreconditionFailed;
    }

    match check_if_none_match(ctx.if_none_match.as_deref(), etag) {
        Cond::False => return Precondition::NotModified,
        Cond::None => {
            if check_if_modified_since(ctx.if_modified_since.as_deref(), mod_time) == Cond::False {
                return Precondition::NotModified;
            }
        }
        Cond::True => {}
    }

    let range = ctx.range.clone().filter(|r| !r.is_empty());
    let range = match range {
        Some(_) if check_if_range(ctx.if_range.as_deref(), etag, mod_time) == Cond::False => {
            tracing::debug!("If-Range did not match, ignoring Range");
            None
        }
        other => other,
    };
    Precondition::Proceed { range }
}

fn trim(s: &str) -> &str {
    s.trim_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
}

/// Splits a syntactically valid ETag (`"x"` or `W/"x"`) off the front of `s`,
/// returning it with the unconsumed rest.
pub fn scan_etag(s: &str) -> Option<(&str, &str)> {
    let s = trim(s);
    let start = if s.starts_with("W/") { 2 } else { 0 };
    let bytes = s.as_bytes();
    if bytes.len() - start < 2 || bytes[start] != b'"' {
        return None;
    }
    for (i, &c) in bytes.iter().enumerate().skip(start + 1) {
        match c {
            b'"' => return Some((&s[..=i], &s[i + 1..])),
            0x21 | 0x23..=0x7E | 0x80..=0xFF => {}
            _ => return None,
        }
    }
    None
}

/// Strong comparison: identical and not weak.
pub fn etag_strong_match(a: &str, b: &str) -> bool {
    a == b && a.starts_with('"')
}

/// Weak comparison: identical once any `W/` prefix is removed.
pub fn etag_weak_match(a: &str, b: &str) -> bool {
    a.strip_prefix("W/").unwrap_or(a) == b.strip_prefix("W/").unwrap_or(b)
}

/// Walks a comma-separated ETag list. `matches` decides a hit; `*` short
/// circuits to `on_star`. Scanning stops at the first malformed entry.
fn scan_etag_list(list: &str, on_star: Cond, mut matches: impl FnMut(&str) -> bool) -> Option<Cond> {
    let mut rest = list;
    loop {
        rest = trim(rest);
        if rest.is_empty() {
            return None;
        }
        if let Some(after) = rest.strip_prefix(',') {
            rest = after;
            continue;
        }
        if rest.starts_with('*') {
            return Some(on_star);
        }
        let (etag, remain) = scan_etag(rest)?;
        if matches(etag) {
            return Some(on_star);
        }
        rest = remain;
    }
}

fn check_if_match(if_match: Option<&str>, etag: &str) -> Cond {
    let Some(list) = if_match else { return Cond::None };
    scan_etag_list(list, Cond::True, |candidate| etag_strong_match(candidate, etag)).unwrap_or(Cond::False)
}

fn check_if_none_match(if_none_match: Option<&str>, etag: &str) -> Cond {
    let Some(list) = if_none_match else { return Cond::None };
    scan_etag_list(list, Cond::False, |candidate| etag_weak_match(candidate, etag)).unwrap_or(Cond::True)
}

fn check_if_unmodified_since(value: Option<&str>, mod_time: Option<SystemTime>) -> Cond {
    let (Some(value), Some(mod_time)) = (value, mod_time) else { return Cond::None };
    let Some(t) = parse_http_date(value) else { return Cond::None };
    if unix_seconds(mod_time) <= unix_seconds(t) {
        Cond::True
    } else {
        Cond::False
    }
}

fn check_if_modified_since(value: Option<&str>, mod_time: Option<SystemTime>) -> Cond {
    let (Some(value), Some(mod_time)) = (value, mod_time) else { return Cond::None };
    let Some(t) = parse_http_date(value) else { return Cond::None };
    if unix_seconds(mod_time) <= unix_seconds(t) {
        Cond::False
    } else {
        Cond::True
    }
}

fn check_if_range(if_range: Option<&str>, etag: &str, mod_time: Option<SystemTime>) -> Cond {
    let Some(value) = if_range else { return Cond::None };
    if let Some((candidate, _)) = scan_etag(value) {
        return if etag_strong_match(candidate, etag) { Cond::True } else { Cond::False };
    }
    // the validator may also be a date
    match (mod_time, parse_http_date(value)) {
        (Some(m), Some(t)) if unix_seconds(m) == unix_seconds(t) => Cond::True,
        _ => Cond::False,
    }
}

/// Whole seconds since the epoch, floored.
fn unix_seconds(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => {
            let d = e.duration();
            -(d.as_secs() as i64) - i64::from(d.subsec_nanos() > 0)
        }
    }
}

// 9999-12-31T23:59:59Z
const MAX_HTTP_DATE_SECS: u64 = 253_402_300_799;

/// Parses an HTTP-date in any of the three RFC 7231 formats.
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    let value = HeaderValue::from_str(trim(value)).ok()?;
    LastModified::decode(&mut std::iter::once(&value)).ok().map(SystemTime::from)
}

/// Formats `t` as an IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
/// Times outside 1970 through 9999 have no such form and yield `None`.
pub fn format_http_date(t: SystemTime) -> Option<HeaderValue> {
    let since_epoch = t.duration_since(UNIX_EPOCH).ok()?;
    if since_epoch.as_secs() > MAX_HTTP_DATE_SECS {
        return None;
    }
    let mut values = Vec::with_capacity(1);
    LastModified::from(t).encode(&mut values);
    values.pop()
}
