pub mod brand;
pub mod product;

pub use brand::*;
pub use product::*;
