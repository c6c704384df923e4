//! Filesystem inventory of leaf data directories.

mod scanner;

pub use scanner::{expand_roots, scan_root, DirectoryScanner, RootFailure, ScanInventory};
