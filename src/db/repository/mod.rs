pub mod correction_log;
pub mod version;

pub use correction_log::*;
pub use version::*;
