//! Output generation.
//!
//! # Submodules
//!
//! - [`json`]: writes the article snapshot consumed by the API layer and
//!   reads it back for offline ranking
//!
//! # Output Structure
//!
//! ```text
//! data/
//! └── latest.json   # replaced wholesale on every run
//! ```

pub mod json;
