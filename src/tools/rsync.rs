//! Type-safe arguments for `rsync` pulls over ssh.
//!
//! # Field to Flag Mapping
//!
//! | Rust Field   | CLI Flag |
//! |--------------|----------|
//! | `options`    | passed through verbatim, first |
//! | `excludes`   | one `--exclude=<pattern>` each |
//! | `credential` | `--rsh=ssh -i '<key>' -o BatchMode=yes` |
//! | `remote`     | source operand (`user@host:path`) |
//! | `destination`| destination operand, always with a trailing `/` |

use std::path::PathBuf;

use crate::tool_args::ToolArgs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsyncArgs {
    pub options: Vec<String>,
    pub excludes: Vec<String>,
    pub credential: PathBuf,
    pub remote: String,
    pub destination: PathBuf,
}

impl RsyncArgs {
    /// The `--rsh` command. BatchMode makes ssh fail instead of prompting.
    ///
    /// rsync splits this string itself: inside a single-quoted word a
    /// doubled `''` stands for one literal quote.
    pub fn remote_shell(&self) -> String {
        let key = self.credential.to_string_lossy().replace('\'', "''");
        format!("ssh -i '{}' -o BatchMode=yes", key)
    }
}

impl ToolArgs for RsyncArgs {
    fn program(&self) -> &'static str {
        "rsync"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let mut args = self.options.clone();
        args.extend(self.excludes.iter().map(|p| format!("--exclude={}", p)));
        args.push(format!("--rsh={}", self.remote_shell()));
        args.push(self.remote.clone());

        let mut dest = self.destination.to_string_lossy().into_owned();
        if !dest.ends_with('/') {
            dest.push('/');
        }
        args.push(dest);
        args
    }
}
