use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Base directory used when neither `--base-dir` nor `SNAPBACK_BASE_DIR` is set
pub const DEFAULT_BASE_DIR: &str = "/etc/snapback";

/// snapback - pull remote paths into btrfs snapshots with two-tier retention
#[derive(Parser, Debug)]
#[command(name = "snapback")]
#[command(about = "Incremental remote-to-local backups into btrfs snapshots")]
#[command(version)]
pub struct Cli {
    /// Profile to run (reads <BASE_DIR>/profiles/<PROFILE>.conf)
    pub profile: String,

    /// Directory holding default.conf, profiles/, keys/ and log/
    #[arg(long, env = "SNAPBACK_BASE_DIR", default_value = DEFAULT_BASE_DIR)]
    pub base_dir: PathBuf,

    /// Console verbosity: -v for progress, -vv for debug output.
    ///
    /// `RUST_LOG` overrides this for the console. The run log always
    /// records progress.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as Parser>::parse()
    }
}
