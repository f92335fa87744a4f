//! Typed invocations of the external tools snapback drives.

pub mod btrfs;
pub mod rsync;
