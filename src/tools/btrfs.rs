//! Type-safe arguments for the `btrfs` command line tool.
//!
//! # Mapping
//!
//! | Variant           | Command |
//! |-------------------|---------|
//! | `CreateSubvolume` | `btrfs subvolume create <path>` |
//! | `ShowSubvolume`   | `btrfs subvolume show <path>` |
//! | `Snapshot`        | `btrfs subvolume snapshot [-r] <source> <dest>` |
//! | `SetReadOnly`     | `btrfs property set -ts <path> ro <true\|false>` |
//! | `DeleteSubvolume` | `btrfs subvolume delete <path>` |

use std::path::{Path, PathBuf};

use crate::tool_args::ToolArgs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BtrfsArgs {
    CreateSubvolume { path: PathBuf },
    ShowSubvolume { path: PathBuf },
    Snapshot { source: PathBuf, dest: PathBuf, readonly: bool },
    SetReadOnly { path: PathBuf, readonly: bool },
    DeleteSubvolume { path: PathBuf },
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn words(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

impl ToolArgs for BtrfsArgs {
    fn program(&self) -> &'static str {
        "btrfs"
    }

    fn to_cli_args(&self) -> Vec<String> {
        let (mut args, paths): (Vec<String>, Vec<&Path>) = match self {
            Self::CreateSubvolume { path } => {
                (words(&["subvolume", "create"]), vec![path.as_path()])
            }
            Self::ShowSubvolume { path } => (words(&["subvolume", "show"]), vec![path.as_path()]),
            Self::Snapshot { source, dest, readonly: true } => {
                (words(&["subvolume", "snapshot", "-r"]), vec![source.as_path(), dest.as_path()])
            }
            Self::Snapshot { source, dest, readonly: false } => {
                (words(&["subvolume", "snapshot"]), vec![source.as_path(), dest.as_path()])
            }
            Self::SetReadOnly { path, readonly } => {
                let mut args = words(&["property", "set", "-ts"]);
                args.extend([path_arg(path), "ro".to_string(), readonly.to_string()]);
                return args;
            }
            Self::DeleteSubvolume { path } => {
                (words(&["subvolume", "delete"]), vec![path.as_path()])
            }
        };
        args.extend(paths.into_iter().map(path_arg));
        args
    }
}
