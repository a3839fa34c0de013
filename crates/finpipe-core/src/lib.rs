pub mod errors;
pub mod ids;
pub mod model;
pub mod report;
pub mod table;

pub use errors::*;
pub use ids::*;
pub use model::*;
pub use report::*;
pub use table::*;
