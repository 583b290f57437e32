pub mod catalog;
pub mod message;
pub mod record;

pub use catalog::*;
pub use message::*;
pub use record::*;
