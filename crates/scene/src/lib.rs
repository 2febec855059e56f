pub mod collection;
pub mod config;
pub mod entity;
pub mod spatial;
pub mod visibility;

pub use collection::*;
pub use config::*;
pub use entity::*;
pub use spatial::*;
pub use visibility::*;
