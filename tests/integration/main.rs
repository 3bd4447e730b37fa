//! Integration tests: the full appraisal pipeline against mock sources.

mod mock_source;
mod pipeline;
