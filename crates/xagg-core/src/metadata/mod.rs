//! JSON persistence helpers for settings files and the CMOR lookup cache.

mod atomic;

pub use atomic::{atomic_read_json, atomic_write_json};
