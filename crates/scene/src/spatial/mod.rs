pub mod node;
pub mod strategy;
pub mod tree;

pub use node::*;
pub use strategy::*;
pub use tree::*;
