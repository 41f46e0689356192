// Binary-only modules (not part of the library)
mod app;
mod cli;
mod logging;

use crate::cli::{Args, Mode};
use crate::logging::setup_logging;
use anyhow::Result;
use clap::Parser;
use relay_runner::RunnerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    dotenv::dotenv().ok();
    let args = Args::parse();
    setup_logging(args.verbose);

    let mut config = RunnerConfig::load(args.config.as_deref())?;

    match args.mode {
        Mode::Run {
            transcript,
            workdir,
            chunk_size,
            delay_ms,
            stream_id,
            shell,
            dry_run,
        } => {
            if let Some(workdir) = workdir {
                config.workdir = workdir;
            }
            if let Some(chunk_size) = chunk_size {
                config.chunk_size = chunk_size;
            }
            if let Some(delay_ms) = delay_ms {
                config.delay_ms = delay_ms;
            }
            if let Some(shell) = shell {
                config.shell = shell;
            }

            let text = app::read_transcript(&transcript)?;
            app::run::run(
                &text,
                app::run::RunOptions {
                    config,
                    stream_id,
                    dry_run,
                },
            )
            .await
        }
        Mode::Parse { transcript, stream_id } => {
            let text = app::read_transcript(&transcript)?;
            app::parse::run(&text, &stream_id, config.tags)
        }
    }
}
