pub mod scripted;
pub mod traits;

pub use scripted::*;
pub use traits::*;
