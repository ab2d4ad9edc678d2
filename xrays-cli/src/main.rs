//! analyze-repo - behavioral & architectural code intelligence CLI.

use clap::error::ErrorKind;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use xrays::cli::{self, Cli};

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    // Argument mistakes are user errors (exit 1), not internal ones.
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            e.print().expect("usage output");
            std::process::exit(code);
        }
    };

    if let Err(e) = cli::run(args) {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}
