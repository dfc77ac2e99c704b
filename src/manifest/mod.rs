//! Manifest object model
//!
//! In-memory representation of a resolved manifest: structured target
//! objects, opaque blobs, and the directory they were loaded from.

mod fs;
mod object;
mod parse;

pub use fs::*;
pub use object::*;
pub use parse::*;
