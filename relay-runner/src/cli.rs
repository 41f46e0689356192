use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "relay", version, about = "Replay model transcripts and run the actions they contain")]
pub struct Args {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Config file (defaults to <config dir>/relay/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Stream a transcript through the parser and execute its actions
    Run {
        /// Transcript file, or `-` for stdin
        transcript: PathBuf,

        /// Directory actions run in
        #[arg(short, long)]
        workdir: Option<PathBuf>,

        /// Characters per streamed chunk (0 = all at once)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Milliseconds to wait between chunks
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Stream id used for action ids and placeholders
        #[arg(long, default_value = "msg")]
        stream_id: String,

        /// Shell used for shell actions
        #[arg(long)]
        shell: Option<String>,

        /// Log actions instead of executing them
        #[arg(long)]
        dry_run: bool,
    },

    /// Parse a transcript and print elements and actions as JSON
    Parse {
        /// Transcript file, or `-` for stdin
        transcript: PathBuf,

        /// Stream id used for action ids
        #[arg(long, default_value = "msg")]
        stream_id: String,
    },
}
