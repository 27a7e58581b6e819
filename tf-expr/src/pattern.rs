//! Pattern service: TF globs for `=/` and `!/`, regexps for `regmatch()`.
//!
//! Globs support `*`, `?`, `[...]` classes and `{a|b}` word alternatives;
//! regexps go through the [`regex`] crate with the options TF compiles
//! with.
//!
//! A successful regexp match is kept as an owned [`RegMatch`] so the host can
//! serve `{P1}`, `{PL}` and `{PR}` substitutions after the call returns.

use regex::Regex;

use crate::tfstr::TfStr;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Regexp,
    Glob,
}

/// Error returned when a pattern cannot be compiled.
#[derive(Debug)]
pub enum PatternError {
    InvalidRegex(regex::Error),
    InvalidGlob(String),
}

impl std::fmt::Display for PatternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternError::InvalidRegex(e) => write!(f, "regexp error: {e}"),
            PatternError::InvalidGlob(msg) => write!(f, "glob error: {msg}"),
        }
    }
}

impl std::error::Error for PatternError {}

#[derive(Debug, Clone)]
enum Compiled {
    Regex(Regex),
    Glob,
}

/// A compiled pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    src: String,
    compiled: Compiled,
}

impl Pattern {
    pub fn new(src: &str, mode: MatchMode) -> Result<Self, PatternError> {
        let compiled = match mode {
            MatchMode::Regexp => Compiled::Regex(compile_regex(src)?),
            MatchMode::Glob => {
                check_glob(src).map_err(PatternError::InvalidGlob)?;
                Compiled::Glob
            }
        };
        Ok(Self {
            src: src.to_owned(),
            compiled,
        })
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn mode(&self) -> MatchMode {
        match self.compiled {
            Compiled::Regex(_) => MatchMode::Regexp,
            Compiled::Glob => MatchMode::Glob,
        }
    }

    /// Returns `true` if this pattern matches `text`.
    pub fn matches(&self, text: &str) -> bool {
        match &self.compiled {
            Compiled::Regex(re) => re.is_match(text),
            Compiled::Glob => glob_match(&self.src, text),
        }
    }

    /// Match against `subject`, keeping the match offsets.
    ///
    /// Globs match the whole subject, so their [`RegMatch`] has no groups.
    pub fn find(&self, subject: &TfStr) -> Option<RegMatch> {
        match &self.compiled {
            Compiled::Regex(re) => {
                let caps = re.captures(subject)?;
                let whole = caps.get(0)?;
                let groups = (1..caps.len())
                    .map(|i| caps.get(i).map(|m| (m.start(), m.end())))
                    .collect();
                Some(RegMatch {
                    subject: subject.clone(),
                    start: whole.start(),
                    end: whole.end(),
                    groups,
                })
            }
            Compiled::Glob => glob_match(&self.src, subject).then(|| RegMatch {
                subject: subject.clone(),
                start: 0,
                end: subject.len(),
                groups: Vec::new(),
            }),
        }
    }
}

/// The subject and offsets of the most recent successful match.
///
/// Group `n` follows `regsubstr`: 0 is the whole match, `n > 0` a numbered
/// group; [`RegMatch::left`] and [`RegMatch::right`] are the `PL` / `PR`
/// selectors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegMatch {
    subject: TfStr,
    start: usize,
    end: usize,
    /// Byte offsets per numbered group; `None` if the group did not take part.
    groups: Vec<Option<(usize, usize)>>,
}

impl RegMatch {
    pub fn subject(&self) -> &TfStr {
        &self.subject
    }

    pub fn left(&self) -> &str {
        &self.subject[..self.start]
    }

    pub fn whole(&self) -> &str {
        &self.subject[self.start..self.end]
    }

    pub fn right(&self) -> &str {
        &self.subject[self.end..]
    }

    /// Group `n`; `None` if it is out of range or did not participate.
    pub fn group(&self, n: usize) -> Option<&str> {
        if n == 0 {
            return Some(self.whole());
        }
        self.groups
            .get(n - 1)?
            .map(|(s, e)| &self.subject[s..e])
    }

    /// One more than the highest participating group, as PCRE reports it.
    pub fn count(&self) -> usize {
        self.groups
            .iter()
            .rposition(Option::is_some)
            .map_or(1, |i| i + 2)
    }
}

// ── Regex compilation ─────────────────────────────────────────────────────────

/// Compile with TF's PCRE options: `.` matches newline, `$` only at the
/// very end, and caseless unless an unescaped capital appears.
fn compile_regex(pattern: &str) -> Result<Regex, PatternError> {
    regex::RegexBuilder::new(pattern)
        .case_insensitive(!has_unescaped_upper(pattern))
        .dot_matches_new_line(true)
        .multi_line(false)
        .build()
        .map_err(PatternError::InvalidRegex)
}

fn has_unescaped_upper(pattern: &str) -> bool {
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            chars.next();
        } else if c.is_ascii_uppercase() {
            return true;
        }
    }
    false
}

// ── Glob matching ─────────────────────────────────────────────────────────────
//
//   *        any run of characters (not spaces inside {…})
//   ?        one character (not a space inside {…})
//   [...]    character class, [^...] negated
//   {a|b}    one whole word equal to one of the alternatives
//   \x       literal x
//
// Everything compares ASCII-case-insensitively.

/// Recursion budget for `*` backtracking; exhausting it counts as no match.
const GLOB_MAX_DEPTH: usize = 256;

pub fn glob_match(pat: &str, text: &str) -> bool {
    let glob = Glob {
        pat: pat.as_bytes(),
        text: text.as_bytes(),
    };
    glob.at(0, 0, None, GLOB_MAX_DEPTH)
}

struct Glob<'a> {
    pat: &'a [u8],
    text: &'a [u8],
}

impl Glob<'_> {
    fn pat_at(&self, p: usize) -> Option<u8> {
        self.pat.get(p).copied()
    }

    fn text_at(&self, s: usize) -> Option<u8> {
        self.text.get(s).copied()
    }

    fn at_word_start(&self, s: usize) -> bool {
        s == 0 || self.text[s - 1] == b' '
    }

    fn at_word_end(&self, s: usize) -> bool {
        matches!(self.text_at(s), None | Some(b' '))
    }

    /// Match pattern from `p` against text from `s`.  `word_end` is the end
    /// of the current `{…}` alternative when matching inside one.
    fn at(&self, mut p: usize, mut s: usize, word_end: Option<usize>, depth: usize) -> bool {
        if depth == 0 {
            return false;
        }
        let inword = word_end.is_some();
        let pat_end = word_end.unwrap_or(self.pat.len());
        loop {
            if p >= pat_end {
                return if inword {
                    self.at_word_end(s)
                } else {
                    s >= self.text.len()
                };
            }
            match self.pat[p] {
                b'\\' => {
                    let Some(lit) = self.pat_at(p + 1) else {
                        return s >= self.text.len();
                    };
                    match self.text_at(s) {
                        Some(c) if c.eq_ignore_ascii_case(&lit) => {}
                        _ => return false,
                    }
                    p += 2;
                    s += 1;
                }
                b'?' => {
                    match self.text_at(s) {
                        None => return false,
                        Some(b' ') if inword => return false,
                        _ => {}
                    }
                    p += 1;
                    s += 1;
                }
                b'*' => return self.star(p, s, word_end, depth),
                b'[' => {
                    let Some(c) = self.text_at(s) else {
                        return false;
                    };
                    if inword && c == b' ' {
                        return false;
                    }
                    match class_match(&self.pat[p + 1..], c) {
                        Some(used) => p += 1 + used,
                        None => return false,
                    }
                    s += 1;
                }
                b'{' if !inword => {
                    if !self.at_word_start(s) {
                        return false;
                    }
                    let Some(close) = find_unescaped(&self.pat[p..], b'}').map(|i| p + i) else {
                        return false;
                    };
                    let mut alt = p + 1;
                    let matched = loop {
                        let bar = find_unescaped(&self.pat[alt..close], b'|')
                            .map_or(close, |i| alt + i);
                        if self.at(alt, s, Some(bar), depth - 1) {
                            break true;
                        }
                        if bar >= close {
                            break false;
                        }
                        alt = bar + 1;
                    };
                    if !matched {
                        return false;
                    }
                    while !self.at_word_end(s) {
                        s += 1;
                    }
                    p = close + 1;
                }
                lit => {
                    match self.text_at(s) {
                        Some(c) if c.eq_ignore_ascii_case(&lit) => {}
                        _ => return false,
                    }
                    p += 1;
                    s += 1;
                }
            }
        }
    }

    fn star(&self, mut p: usize, mut s: usize, word_end: Option<usize>, depth: usize) -> bool {
        let inword = word_end.is_some();
        let pat_end = word_end.unwrap_or(self.pat.len());
        // A run of `*` and `?` collapses; each `?` still needs a character.
        while p < pat_end && matches!(self.pat[p], b'*' | b'?') {
            if self.pat[p] == b'?' {
                match self.text_at(s) {
                    None => return false,
                    Some(b' ') if inword => return false,
                    _ => s += 1,
                }
            }
            p += 1;
        }

        if inword {
            while !self.at_word_end(s) {
                if self.at(p, s, word_end, depth - 1) {
                    return true;
                }
                s += 1;
            }
            return self.at(p, s, word_end, depth - 1);
        }
        let Some(next) = self.pat_at(p) else {
            return true;
        };
        match next {
            b'{' => (s..=self.text.len()).any(|i| {
                self.at_word_start(i) && self.at(p, i, None, depth - 1)
            }),
            b'[' => (s..self.text.len()).any(|i| self.at(p, i, None, depth - 1)),
            _ => {
                let lit = if next == b'\\' {
                    self.pat_at(p + 1).unwrap_or(next)
                } else {
                    next
                };
                (s..self.text.len()).any(|i| {
                    self.text[i].eq_ignore_ascii_case(&lit) && self.at(p, i, None, depth - 1)
                })
            }
        }
    }
}

/// Match `ch` against the class body following `[`.  On success returns
/// the number of pattern bytes consumed, including the closing `]`.
fn class_match(class: &[u8], ch: u8) -> Option<usize> {
    let ch = ch.to_ascii_lowercase();
    let mut i = 0;
    let negated = class.first() == Some(&b'^');
    if negated {
        i += 1;
    }
    let mut matched = false;
    loop {
        let lo = match class.get(i).copied() {
            None => return None,
            Some(b']') => break,
            Some(b'\\') => {
                i += 1;
                class.get(i).copied()?
            }
            Some(c) => c,
        };
        i += 1;
        if class.get(i) == Some(&b'-') && !matches!(class.get(i + 1), None | Some(b']')) {
            i += 1;
            if class[i] == b'\\' {
                i += 1;
            }
            let hi = class.get(i).copied()?;
            i += 1;
            if (lo.to_ascii_lowercase()..=hi.to_ascii_lowercase()).contains(&ch) {
                matched = true;
            }
        } else if lo.to_ascii_lowercase() == ch {
            matched = true;
        }
    }
    (matched != negated).then_some(i + 1)
}

fn find_unescaped(haystack: &[u8], needle: u8) -> Option<usize> {
    let mut i = 0;
    while i < haystack.len() {
        match haystack[i] {
            b'\\' => i += 2,
            c if c == needle => return Some(i),
            _ => i += 1,
        }
    }
    None
}

// ── Glob syntax validation ────────────────────────────────────────────────────

/// Reject malformed globs: unterminated `[` classes and `{` alternatives.
pub fn check_glob(pat: &str) -> Result<(), String> {
    let b = pat.as_bytes();
    let mut inword = false;
    let mut i = 0;
    while i < b.len() {
        match b[i] {
            b'\\' => i += 2,
            b'[' => match find_unescaped(&b[i..], b']') {
                Some(off) => i += off + 1,
                None => return Err("unmatched '['".into()),
            },
            b'{' => {
                if inword {
                    return Err("nested '{'".into());
                }
                if i > 0 && !matches!(b[i - 1], b' ' | b'*' | b'?' | b']') {
                    return Err(format!("'{}' before '{{' can never match", b[i - 1] as char));
                }
                inword = true;
                i += 1;
            }
            b'}' => {
                if let Some(&next) = b.get(i + 1) {
                    if !matches!(next, b' ' | b'*' | b'?' | b'[') {
                        return Err(format!("'{}' after '}}' can never match", next as char));
                    }
                }
                inword = false;
                i += 1;
            }
            b' ' if inword => return Err("space inside '{...}' can never match".into()),
            _ => i += 1,
        }
    }
    if inword {
        return Err("unmatched '{'".into());
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
