//! Tree mutations: insertion with node splits, deletion with borrowing and merging, and the
//! namespace-level operations built on them.

mod operations;
mod writer;

pub use operations::*;
pub use writer::*;
