use anyhow::{Context, Result};
use cache_dump::{plan, write_usage, Runner};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Dump statistics, raw entries or decoded keys of key-value cache files"
)]
struct Cli {
    /// Settings (`path=`, `revision=`, `map=`, `+values`, `-values`, `+dumpMap`,
    /// `-dumpMap`, `out=`) and store files, applied left to right.
    #[arg(allow_hyphen_values = true, trailing_var_arg = true)]
    args: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.args.is_empty() {
        write_usage(&mut std::io::stdout()).context("failed to print usage")?;
        return Ok(());
    }

    Runner::stdout()
        .run(plan(&cli.args))
        .context("dump aborted")
}
