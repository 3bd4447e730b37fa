//! Strategy: profit evaluation, history statistics and the final
//! purchase verdict.

pub mod history;
pub mod money;
pub mod profit;
pub mod verdict;

pub use profit::evaluate;
