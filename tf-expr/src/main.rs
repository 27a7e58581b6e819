use std::io::{self, BufRead, Write};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tfexpr::cli::{self, CliArgs, ConfigFile};
use tfexpr::config::Config;
use tfexpr::script::{Engine, EvalContext, ValueRef};
use tfexpr::session::{LineError, Session};

fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("tfexpr: {e}");
            eprintln!("{}", cli::USAGE);
            std::process::exit(1);
        }
    };

    let default_filter = if args.debug { "tfexpr=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let config = load_config(&args);
    let engine = Engine::new(config.engine.clone());
    let mut session = Session::from_config(&config);

    // ── One-shot expressions (-e) ─────────────────────────────────────────────
    if !args.exprs.is_empty() {
        let mut ok = true;
        for expr in &args.exprs {
            ok &= run_line(&engine, &mut session, expr, args.debug);
        }
        std::process::exit(if ok { 0 } else { 1 });
    }

    // ── Line-by-line from stdin ───────────────────────────────────────────────
    let interactive = unsafe { libc::isatty(libc::STDIN_FILENO) != 0 };
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        if interactive {
            print!("expr> ");
            let _ = io::stdout().flush();
        }
        let Some(line) = lines.next() else { break };
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("tfexpr: {e}");
                std::process::exit(1);
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') {
            continue;
        }
        if trimmed == "/quit" {
            break;
        }
        run_line(&engine, &mut session, trimmed, args.debug);
    }
}

/// rc file first, then command-line overrides.
fn load_config(args: &CliArgs) -> Config {
    let path = match &args.config {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(p) => Some(p.clone()),
        ConfigFile::Search => cli::find_user_config(),
    };
    let mut config = match path {
        Some(p) => match Config::load_file(&p) {
            Ok((config, errors)) => {
                for e in errors {
                    eprintln!("tfexpr: {}: {e}", p.display());
                }
                config
            }
            Err(e) => {
                eprintln!("tfexpr: warning: {}: {e}", p.display());
                Config::new()
            }
        },
        None => Config::new(),
    };
    if let Some(n) = args.sigfigs {
        config.engine.sigfigs = n.clamp(tfexpr::config::MIN_SIGFIGS, tfexpr::config::MAX_SIGFIGS);
    }
    config.engine.pedantic |= args.pedantic;
    if args.no_optimize {
        config.engine.optimize = false;
    }
    config
}

/// Run one line, print its value and any diagnostics.  Returns `false` if
/// the line failed.
fn run_line(engine: &Engine, session: &mut Session, line: &str, disassemble: bool) -> bool {
    let result = if disassemble && !line.starts_with('/') {
        disassemble_and_run(engine, session, line)
    } else {
        session.run_line(engine, line)
    };
    for text in session.take_output() {
        println!("{text}");
    }
    for d in session.take_diagnostics() {
        eprintln!("% {d}");
    }
    match result {
        Ok(Some(v)) => {
            println!("{}", v.as_string(session));
            true
        }
        Ok(None) => true,
        Err(LineError::Directive(msg)) => {
            eprintln!("% {msg}");
            false
        }
        Err(LineError::Eval(_)) => false,
    }
}

fn disassemble_and_run(
    engine: &Engine,
    session: &mut Session,
    line: &str,
) -> Result<Option<ValueRef>, LineError> {
    let prog = engine.compile(line, session).map_err(|e| {
        session.report_error(&e.message);
        LineError::Eval(e.into())
    })?;
    eprint!("{prog}");
    let v = engine
        .execute(&prog, session)
        .map_err(|e| LineError::Eval(e.into()))?;
    Ok(Some(v))
}
