pub mod geometry;
pub mod geometry_handler;
pub mod layer;
pub mod line;
pub mod symbology;
pub mod tiles;
pub mod triangulate;
pub mod vector;

pub use geometry::*;
pub use geometry_handler::*;
pub use layer::*;
pub use symbology::*;
pub use tiles::*;
pub use vector::*;
