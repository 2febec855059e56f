pub mod deferred;

pub use deferred::*;
