use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use miette::{NamedSource, Report};

/// Run a scry program.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path of the program to run.
    filename: PathBuf,

    /// Print the token stream instead of running the program.
    #[arg(short, long)]
    tokens: bool,
}

/// Logs go to stderr and only when `RUST_LOG` is set, so program output stays clean.
fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr).with_target(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}

/// Reports `e` on stderr and exits with its status.
fn fail(e: scry::Error, source: Option<NamedSource<String>>) -> ! {
    let code = e.exit_code();
    tracing::debug!(code, line = e.line(), "program failed");
    // whatever was printed before the failure stays visible
    let _ = io::stdout().flush();
    let report = Report::new(e);
    let report = match source {
        Some(source) => report.with_source_code(source),
        None => report,
    };
    eprintln!("{report:?}");
    std::process::exit(code);
}

fn main() {
    init_tracing();
    let args = Args::parse();

    let source = match scry::read_source(&args.filename) {
        Ok(source) => source,
        Err(e) => fail(e, None),
    };

    let result = if args.tokens {
        scry::lex(&source).and_then(|tokens| {
            let mut out = io::stdout().lock();
            tokens
                .iter()
                .try_for_each(|token| writeln!(out, "{token}"))
                .map_err(scry::Error::Output)
        })
    } else {
        scry::run(&source, io::stdout().lock())
    };

    if let Err(e) = result {
        let name = args.filename.display().to_string();
        fail(e, Some(NamedSource::new(name, source)));
    }
}
