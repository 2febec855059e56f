pub mod buffers;
pub mod headless;

pub use buffers::*;
pub use headless::*;
