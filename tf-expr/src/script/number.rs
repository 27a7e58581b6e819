//! Numeric literal parsing.
//!
//! | Text          | Result  |
//! |---------------|---------|
//! | `i`           | INT, or FLOAT if it overflows |
//! | `i.f`         | DECIMAL with up to six fraction digits |
//! | `h:m[:s][.f]` | DECIMAL, in seconds |
//! | `i.fEe`, or more than six fraction digits | FLOAT |
//!
//! Parsing stops at the first character that cannot continue the number;
//! the caller decides whether trailing text is an error.

use super::timeval::TimeVal;

/// A parsed numeric literal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Decimal(TimeVal),
    Float(f64),
}

/// Scan a number at the start of `s`.
///
/// Returns the value and the number of bytes consumed, or an error message
/// for values too large to represent.  Text with no digits at all parses as
/// `Int(0)` with nothing consumed past any sign, matching `strtol`.
pub fn parse_number(s: &str) -> Result<(Number, usize), String> {
    let b = s.as_bytes();
    let mut pos = 0;
    while pos < b.len() && b[pos].is_ascii_whitespace() {
        pos += 1;
    }
    let mut neg = false;
    while pos < b.len() && (b[pos] == b'+' || b[pos] == b'-') {
        if b[pos] == b'-' {
            neg = !neg;
        }
        pos += 1;
    }
    let start = pos;

    let (whole, after_int, overflow) = scan_digits(b, pos);
    match b.get(after_int) {
        Some(b'.') | Some(b':') => parse_time(b, start, whole, overflow, neg),
        Some(b'e') | Some(b'E') => parse_float(s, start, neg),
        _ if overflow => parse_float(s, start, neg),
        _ => Ok((Number::Int(if neg { whole.wrapping_neg() } else { whole }), after_int)),
    }
}

/// Read decimal digits from `pos`; returns value, end, and whether it overflowed.
fn scan_digits(b: &[u8], mut pos: usize) -> (i64, usize, bool) {
    let mut val: i64 = 0;
    let mut overflow = false;
    while let Some(&c) = b.get(pos) {
        if !c.is_ascii_digit() {
            break;
        }
        match val.checked_mul(10).and_then(|v| v.checked_add((c - b'0') as i64)) {
            Some(v) => val = v,
            None => {
                overflow = true;
                val = i64::MAX;
            }
        }
        pos += 1;
    }
    (val, pos, overflow)
}

fn parse_time(
    b: &[u8],
    start: usize,
    whole: i64,
    overflow: bool,
    neg: bool,
) -> Result<(Number, usize), String> {
    const TOO_LARGE: &str = "time value too large";
    let (_, mut pos, _) = scan_digits(b, start);
    let mut sec = whole;
    let mut usec: i64 = 0;

    if b.get(pos) == Some(&b':') {
        if overflow {
            return Err(TOO_LARGE.into());
        }
        sec = sec.checked_mul(3600).ok_or(TOO_LARGE)?;
        pos += 1;
        if b.get(pos).is_some_and(u8::is_ascii_digit) {
            let (min, end, ovf) = scan_digits(b, pos);
            pos = end;
            let min = if ovf { None } else { min.checked_mul(60) };
            sec = min.and_then(|m| sec.checked_add(m)).ok_or(TOO_LARGE)?;
            if b.get(pos) == Some(&b':') {
                pos += 1;
                if b.get(pos).is_some_and(u8::is_ascii_digit) {
                    let (s, end, ovf) = scan_digits(b, pos);
                    pos = end;
                    if ovf {
                        return Err(TOO_LARGE.into());
                    }
                    sec = sec.checked_add(s).ok_or(TOO_LARGE)?;
                }
            }
        }
        if b.get(pos) == Some(&b'.') {
            let (u, end) = scan_fraction(b, pos + 1);
            usec = u;
            pos = skip_digits(b, end);
        }
    } else {
        // `i.f`
        if overflow {
            return parse_float_bytes(b, start, neg);
        }
        let (u, end) = scan_fraction(b, pos + 1);
        if matches!(b.get(end), Some(c) if c.is_ascii_digit() || *c == b'e' || *c == b'E') {
            return parse_float_bytes(b, start, neg);
        }
        usec = u;
        pos = skip_digits(b, end);
    }

    let tv = if neg {
        TimeVal::new(-sec, -usec)
    } else {
        TimeVal::new(sec, usec)
    };
    Ok((Number::Decimal(tv), pos))
}

/// Up to six fraction digits, scaled to microseconds.
fn scan_fraction(b: &[u8], mut pos: usize) -> (i64, usize) {
    let mut usec = 0;
    let mut digits = 0;
    while digits < 6 {
        match b.get(pos) {
            Some(c) if c.is_ascii_digit() => {
                usec = usec * 10 + (c - b'0') as i64;
                digits += 1;
                pos += 1;
            }
            _ => break,
        }
    }
    while digits < 6 {
        usec *= 10;
        digits += 1;
    }
    (usec, pos)
}

fn skip_digits(b: &[u8], mut pos: usize) -> usize {
    while b.get(pos).is_some_and(u8::is_ascii_digit) {
        pos += 1;
    }
    pos
}

fn parse_float(s: &str, start: usize, neg: bool) -> Result<(Number, usize), String> {
    parse_float_bytes(s.as_bytes(), start, neg)
}

fn parse_float_bytes(b: &[u8], start: usize, neg: bool) -> Result<(Number, usize), String> {
    let end = float_extent(b, start);
    // The extent only covers ASCII digits, '.', 'e' and signs.
    let text = std::str::from_utf8(&b[start..end]).unwrap_or("0");
    let f: f64 = text.parse().unwrap_or(0.0);
    if f.is_infinite() {
        return Err("numeric value too large".into());
    }
    Ok((Number::Float(if neg { -f } else { f }), end))
}

/// End of the longest prefix from `start` that `strtod` would accept.
fn float_extent(b: &[u8], start: usize) -> usize {
    let mut pos = skip_digits(b, start);
    if b.get(pos) == Some(&b'.') {
        pos = skip_digits(b, pos + 1);
    }
    if matches!(b.get(pos), Some(b'e') | Some(b'E')) {
        let mut exp = pos + 1;
        if matches!(b.get(exp), Some(b'+') | Some(b'-')) {
            exp += 1;
        }
        if b.get(exp).is_some_and(u8::is_ascii_digit) {
            pos = skip_digits(b, exp);
        }
    }
    pos
}

/// Parse the longest float prefix of `s`, as `strtod` does; 0.0 if none.
pub fn parse_float_prefix(s: &str) -> f64 {
    let b = s.as_bytes();
    let mut pos = 0;
    while pos < b.len() && b[pos].is_ascii_whitespace() {
        pos += 1;
    }
    let neg = b.get(pos) == Some(&b'-');
    if matches!(b.get(pos), Some(b'+') | Some(b'-')) {
        pos += 1;
    }
    match parse_float_bytes(b, pos, neg) {
        Ok((Number::Float(f), _)) => f,
        _ => if neg { f64::NEG_INFINITY } else { f64::INFINITY },
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
