mod gc;
mod key;
mod mode;
mod mvcc;
mod own_serde;
mod scan;
mod snapshot;
mod status;
mod transaction;

pub use gc::*;
pub use key::*;
pub use mode::*;
pub use mvcc::*;
pub use own_serde::*;
pub use scan::*;
pub use snapshot::*;
pub use status::*;
pub use transaction::*;
