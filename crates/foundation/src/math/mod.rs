pub mod geodesy;
pub mod mercator;
pub mod precision;
pub mod vec;

pub use geodesy::*;
pub use precision::*;
pub use vec::*;
