// Step Filtering Module
// Selection criteria, per-step verdicts and filter previews

pub mod options;
pub mod preview;
pub mod step_filter;

pub use options::{parse_step_index, FilterError, FilterOptions, StepRange};
pub use preview::{FilterPreview, StepPreview};
pub use step_filter::{FilterResult, SkipReason, StepFilter};
