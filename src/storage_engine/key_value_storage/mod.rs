mod memory;
mod range;
mod scan;
mod store;

pub use memory::*;
pub use range::*;
pub use scan::*;
pub use store::*;
