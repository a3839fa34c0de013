mod warehouse;

pub use warehouse::*;
