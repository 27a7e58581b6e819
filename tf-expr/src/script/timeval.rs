//! Seconds + microseconds pairs backing the DECIMAL, ATIME and DTIME types.
//!
//! Addition, subtraction and normalisation of the pairs, plus the `s.u`
//! and `h:mm:ss.u` renderings.

use std::cmp::Ordering;
use std::fmt::Write as _;

pub const USEC_PER_SEC: i64 = 1_000_000;

/// A signed time pair.
///
/// After [`TimeVal::normalize`], `usec` lies in `0..=999_999` when `sec` is
/// positive, in `-999_999..=0` when `sec` is negative, and carries the sign
/// of the whole value when `sec` is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TimeVal {
    pub sec: i64,
    pub usec: i64,
}

impl TimeVal {
    pub const ZERO: TimeVal = TimeVal { sec: 0, usec: 0 };

    pub const fn new(sec: i64, usec: i64) -> Self {
        TimeVal { sec, usec }
    }

    /// Bring `usec` back into range, borrowing from or carrying into `sec`.
    pub fn normalize(mut self) -> Self {
        while self.usec < if self.sec > 0 { 0 } else { -(USEC_PER_SEC - 1) } {
            self.sec = self.sec.wrapping_sub(1);
            self.usec += USEC_PER_SEC;
        }
        while self.usec > if self.sec < 0 { 0 } else { USEC_PER_SEC - 1 } {
            self.sec = self.sec.wrapping_add(1);
            self.usec -= USEC_PER_SEC;
        }
        self
    }

    pub fn add(self, rhs: TimeVal) -> TimeVal {
        TimeVal {
            sec: self.sec.wrapping_add(rhs.sec),
            usec: self.usec + rhs.usec,
        }
        .normalize()
    }

    pub fn sub(self, rhs: TimeVal) -> TimeVal {
        TimeVal {
            sec: self.sec.wrapping_sub(rhs.sec),
            usec: self.usec - rhs.usec,
        }
        .normalize()
    }

    pub fn is_zero(self) -> bool {
        self.sec == 0 && self.usec == 0
    }

    /// Sign of a normalized pair: taken from `sec` unless it is zero.
    pub fn signum(self) -> Ordering {
        if self.sec != 0 {
            self.sec.cmp(&0)
        } else {
            self.usec.cmp(&0)
        }
    }

    pub fn as_f64(self) -> f64 {
        self.sec as f64 + self.usec as f64 / USEC_PER_SEC as f64
    }

    /// Split a float into a pair; `None` if the whole part is not
    /// representable.
    pub fn from_f64(f: f64) -> Option<TimeVal> {
        let whole = f.trunc();
        if !whole.is_finite() || whole != (whole as i64) as f64 {
            return None;
        }
        let sec = whole as i64;
        let usec = ((f - whole) * USEC_PER_SEC as f64) as i64;
        Some(TimeVal { sec, usec })
    }

    /// `s.u` rendering with trailing zero microseconds trimmed to one digit.
    pub fn fmt_decimal(self) -> String {
        let mut out = String::new();
        let mut usec = self.usec;
        if self.sec < 0 || self.usec < 0 {
            usec = -usec;
            if self.sec == 0 {
                out.push('-');
            }
        }
        let _ = write!(out, "{}", self.sec);
        push_usec(&mut out, usec);
        out
    }

    /// Duration rendering: `h:mm[:ss][.u]` from one minute up, `s.u` below.
    pub fn fmt_duration(self) -> String {
        if self.sec < 60 && self.sec > -60 {
            return self.fmt_decimal();
        }
        let mut out = String::new();
        let (mut sec, mut usec) = (self.sec, self.usec);
        if sec < 0 {
            out.push('-');
            sec = sec.wrapping_neg();
            usec = -usec;
        }
        let _ = write!(out, "{}:{:02}", sec / 3600, (sec / 60) % 60);
        if sec % 60 != 0 || usec != 0 {
            let _ = write!(out, ":{:02}", sec % 60);
        }
        if usec != 0 {
            push_usec(&mut out, usec);
        }
        out
    }
}

fn push_usec(out: &mut String, usec: i64) {
    let digits = format!("{:06}", usec);
    let trimmed = digits.trim_end_matches('0');
    out.push('.');
    out.push_str(if trimmed.is_empty() { "0" } else { trimmed });
}

// ── Tests ─────────────────────────────────────────────────────────────────────
