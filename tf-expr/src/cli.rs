//! Command-line argument parsing.
//!
//! Usage:
//!   tfexpr [-f[<file>]] [-e<expr>]... [-s<sigfigs>] [-pdO]

use std::path::PathBuf;

use directories::BaseDirs;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// rc-file specification.
    pub config: ConfigFile,
    /// Expressions to evaluate instead of reading stdin (`-e<expr>`).
    pub exprs: Vec<String>,
    /// Float precision override (`-s<n>`).
    pub sigfigs: Option<usize>,
    /// Pedantic warnings (`-p`).
    pub pedantic: bool,
    /// Debug logging and disassembly (`-d`).
    pub debug: bool,
    /// Disable constant folding (`-O`).
    pub no_optimize: bool,
}

/// How to choose the rc file.
#[derive(Debug, Default)]
pub enum ConfigFile {
    /// Search `~/.tfexprrc`, then `./.tfexprrc` (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip the rc file.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

pub const USAGE: &str = "Usage: tfexpr [-f[<file>]] [-e<expr>]... [-s<sigfigs>] [-pdO]";

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(raw.get(1..).unwrap_or_default())
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut i = 0;

    while i < argv.len() {
        let arg = argv[i].as_str();

        if !arg.starts_with('-') || arg == "-" {
            return Err(format!("unexpected argument: {arg}"));
        }

        // Flag argument: iterate over characters after the leading `-`.
        let chars: Vec<char> = arg[1..].chars().collect();
        let mut j = 0;
        while j < chars.len() {
            match chars[j] {
                'd' => args.debug = true,
                'p' => args.pedantic = true,
                'O' => args.no_optimize = true,

                // -f[<file>]
                'f' => {
                    if j + 1 < chars.len() {
                        let file: String = chars[j + 1..].iter().collect();
                        args.config = ConfigFile::Explicit(PathBuf::from(file));
                        j = chars.len();
                    } else if i + 1 < argv.len() && !argv[i + 1].starts_with('-') {
                        i += 1;
                        args.config = ConfigFile::Explicit(PathBuf::from(&argv[i]));
                    } else {
                        args.config = ConfigFile::Skip;
                    }
                }

                // -e<expr>
                'e' => {
                    let expr = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-e requires an expression argument".to_owned());
                    };
                    args.exprs.push(expr);
                }

                // -s<sigfigs>
                's' => {
                    let n = if j + 1 < chars.len() {
                        let s: String = chars[j + 1..].iter().collect();
                        j = chars.len();
                        s
                    } else if i + 1 < argv.len() {
                        i += 1;
                        argv[i].clone()
                    } else {
                        return Err("-s requires a number".to_owned());
                    };
                    let n = n
                        .parse()
                        .map_err(|_| format!("invalid sigfigs: {n}"))?;
                    args.sigfigs = Some(n);
                }

                c => return Err(format!("unknown option: -{c}")),
            }
            j += 1;
        }
        i += 1;
    }

    Ok(args)
}

// ── Path helpers ──────────────────────────────────────────────────────────────

/// Search for the rc file in the standard locations.
/// Returns the first path that exists, or `None`.
pub fn find_user_config() -> Option<PathBuf> {
    let home = BaseDirs::new().map(|d| d.home_dir().join(".tfexprrc"));
    home.into_iter()
        .chain(std::iter::once(PathBuf::from("./.tfexprrc")))
        .find(|p| p.exists())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn empty_args() {
        let a = parse_argv(&argv(&[])).unwrap();
        assert!(a.exprs.is_empty());
        assert!(matches!(a.config, ConfigFile::Search));
        assert_eq!(a.sigfigs, None);
    }

    #[test]
    fn bool_flags() {
        let a = parse_argv(&argv(&["-p", "-d", "-O"])).unwrap();
        assert!(a.pedantic && a.debug && a.no_optimize);
    }

    #[test]
    fn combined_bool_flags() {
        let a = parse_argv(&argv(&["-pdO"])).unwrap();
        assert!(a.pedantic && a.debug && a.no_optimize);
    }

    #[test]
    fn expressions_embedded_and_separate() {
        let a = parse_argv(&argv(&["-e1 + 2", "-e", "strlen(\"abc\")"])).unwrap();
        assert_eq!(a.exprs, ["1 + 2", "strlen(\"abc\")"]);
    }

    #[test]
    fn expression_may_start_with_dash() {
        let a = parse_argv(&argv(&["-e", "-5 * 2"])).unwrap();
        assert_eq!(a.exprs, ["-5 * 2"]);
    }

    #[test]
    fn sigfigs() {
        assert_eq!(parse_argv(&argv(&["-s6"])).unwrap().sigfigs, Some(6));
        assert_eq!(parse_argv(&argv(&["-s", "9"])).unwrap().sigfigs, Some(9));
        assert!(parse_argv(&argv(&["-sx"])).is_err());
        assert!(parse_argv(&argv(&["-s"])).is_err());
    }

    #[test]
    fn config_skip() {
        let a = parse_argv(&argv(&["-f"])).unwrap();
        assert!(matches!(a.config, ConfigFile::Skip));
    }

    #[test]
    fn config_explicit_embedded() {
        let a = parse_argv(&argv(&["-fmyrc"])).unwrap();
        assert!(matches!(&a.config, ConfigFile::Explicit(p) if p == &PathBuf::from("myrc")));
    }

    #[test]
    fn config_explicit_separate() {
        let a = parse_argv(&argv(&["-f", "myrc", "-d"])).unwrap();
        assert!(matches!(&a.config, ConfigFile::Explicit(p) if p == &PathBuf::from("myrc")));
        assert!(a.debug);
    }

    #[test]
    fn positional_and_unknown_are_errors() {
        assert!(parse_argv(&argv(&["1+2"])).is_err());
        assert!(parse_argv(&argv(&["-z"])).is_err());
    }
}
