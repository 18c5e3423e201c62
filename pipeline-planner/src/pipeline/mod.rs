// Pipeline Model Module
// Jobs, steps and the loader for the provider-neutral model

pub mod models;
pub mod parser;

pub use models::{Job, Pipeline, Step};
pub use parser::PipelineParser;
