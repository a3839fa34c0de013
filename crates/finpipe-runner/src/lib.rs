pub mod check_runner;
pub mod collaborators;
pub mod config;
pub mod pipeline;
pub mod render;
pub mod transform;
pub mod util;
pub mod validator;

pub use check_runner::*;
pub use collaborators::*;
pub use config::*;
pub use pipeline::*;
pub use render::*;
pub use transform::*;
pub use util::*;
pub use validator::*;
