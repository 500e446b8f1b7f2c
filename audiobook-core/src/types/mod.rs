pub mod book;
pub mod ids;
pub mod operation;

pub use book::*;
pub use ids::*;
pub use operation::*;
