//! Engine settings and the `.tfexprrc` loader.
//!
//! The rc file is a small subset of TF script:
//!
//! | Directive | Action |
//! |-----------|--------|
//! | `/set <name>=<value>` or `/set <name> <value>` | engine setting or variable |
//! | `/def <name>=<body>` | define a macro whose body is an expression |
//! | Lines starting with `;` | comment, ignored |
//! | Any other `/command` | silently skipped |
//!
//! `sigfigs`, `optimize`, `pedantic`, `stack_size` and `max_instr` configure
//! the engine; any other `/set` name becomes a global variable.

use std::path::Path;

use thiserror::Error;

// ── Engine settings ───────────────────────────────────────────────────────────

/// Tunables of an [`Engine`](crate::script::Engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Significant digits when rendering floats (`%sigfigs`), 1 to 17.
    pub sigfigs: usize,
    /// Fold constant subexpressions at compile time.
    pub optimize: bool,
    /// Warn about legal but dubious constructs every time, not just once.
    pub pedantic: bool,
    /// Capacity of the evaluation stack.
    pub stack_size: usize,
    /// Instructions one evaluation may execute; 0 is unlimited.
    pub max_instr: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            sigfigs: 15,
            optimize: true,
            pedantic: false,
            stack_size: 512,
            max_instr: 1_000_000,
        }
    }
}

pub const MIN_SIGFIGS: usize = 1;
pub const MAX_SIGFIGS: usize = 17;

impl EngineConfig {
    /// Apply one `name=value` setting.  Returns `Ok(false)` if `name` is not
    /// an engine setting.
    pub fn set(&mut self, name: &str, value: &str) -> Result<bool, String> {
        match name {
            "sigfigs" => {
                let n: usize = parse_num(name, value)?;
                self.sigfigs = n.clamp(MIN_SIGFIGS, MAX_SIGFIGS);
            }
            "optimize" => self.optimize = parse_flag(name, value)?,
            "pedantic" => self.pedantic = parse_flag(name, value)?,
            "stack_size" => {
                let n: usize = parse_num(name, value)?;
                if n == 0 {
                    return Err("stack_size must be positive".into());
                }
                self.stack_size = n;
            }
            "max_instr" => self.max_instr = parse_num(name, value)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Build a config from variable settings, ignoring names that are not
    /// engine settings.
    pub fn from_vars<'a>(
        vars: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, String> {
        let mut config = EngineConfig::default();
        for (name, value) in vars {
            config.set(name, value)?;
        }
        Ok(config)
    }
}

fn parse_num<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("{name}: invalid number '{value}'"))
}

/// TF flag values: `on`/`off`, `1`/`0`.
fn parse_flag(name: &str, value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "1" => Ok(true),
        "off" | "0" => Ok(false),
        _ => Err(format!("{name}: invalid flag value '{value}'")),
    }
}

// ── rc file ───────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {message}")]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

/// Parsed rc file: engine settings, variables and macros, in file order.
#[derive(Debug, Default)]
pub struct Config {
    pub engine: EngineConfig,
    pub vars: Vec<(String, String)>,
    pub macros: Vec<(String, String)>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse rc text.
    ///
    /// Unknown directives are skipped so that a file shared with a full TF
    /// setup loads without error.  Returns the config and any errors on
    /// recognised lines.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = Config::new();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let Some(rest) = line.strip_prefix('/') else { continue };
            let (cmd, args_str) = rest
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((rest, ""));
            let args_str = args_str.trim();

            let result = match cmd {
                "set" => parse_set(&split_args(args_str)).and_then(|(name, value)| {
                    if !config.engine.set(&name, &value)? {
                        config.vars.push((name, value));
                    }
                    Ok(())
                }),
                "def" => parse_def(args_str).map(|m| config.macros.push(m)),
                _ => Ok(()),
            };
            if let Err(message) = result {
                errors.push(ConfigError { line: lineno, message });
            }
        }

        (config, errors)
    }

    /// Read and parse an rc file from disk.
    pub fn load_file(path: &Path) -> std::io::Result<(Self, Vec<ConfigError>)> {
        let s = std::fs::read_to_string(path)?;
        Ok(Self::load_str(&s))
    }
}

// ── Directive parsing ─────────────────────────────────────────────────────────

/// Split `s` into whitespace-delimited tokens, honouring double-quoted strings
/// and `\"` escapes within them.
fn split_args(s: &str) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    let mut cur = String::new();
    let mut in_quotes = false;
    let mut chars = s.chars();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    cur.push(escaped);
                }
            }
            c if c.is_ascii_whitespace() && !in_quotes => {
                if !cur.is_empty() {
                    args.push(std::mem::take(&mut cur));
                }
            }
            c => cur.push(c),
        }
    }
    if !cur.is_empty() {
        args.push(cur);
    }
    args
}

/// `/set name=value` or `/set name value`.
pub fn parse_set(tokens: &[String]) -> Result<(String, String), String> {
    let Some(first) = tokens.first() else {
        return Err("/set: requires an argument".into());
    };
    let (name, value) = if let Some((name, value)) = first.split_once('=') {
        let mut value = value.to_owned();
        for t in &tokens[1..] {
            value.push(' ');
            value.push_str(t);
        }
        (name.to_owned(), value)
    } else if tokens.len() >= 2 {
        (first.clone(), tokens[1..].join(" "))
    } else {
        return Err(format!("/set: missing value for '{first}'"));
    };
    if name.is_empty() {
        return Err("/set: variable name cannot be empty".into());
    }
    Ok((name, value))
}

/// `/def name=body`; the body is kept verbatim.
pub fn parse_def(args: &str) -> Result<(String, String), String> {
    let Some((name, body)) = args.split_once('=') else {
        return Err("/def: expected name=body".into());
    };
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(format!("/def: invalid macro name '{name}'"));
    }
    Ok((name.to_owned(), body.trim().to_owned()))
}

/// Tokenise and parse a `/set` argument string.
pub fn parse_set_line(args: &str) -> Result<(String, String), String> {
    parse_set(&split_args(args))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
