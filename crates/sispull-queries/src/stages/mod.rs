//! The stages of a pull, in execution order.

pub mod count;
pub mod data;
pub mod token;
pub mod yearid;

pub use count::CountStage;
pub use data::DataStage;
pub use token::TokenStage;
pub use yearid::YearIdStage;
