//! Appraisal engine: the resilience layer around quote sources, the
//! appraisal pipeline and its report.

pub mod appraiser;
pub mod report;
pub mod resilience;
