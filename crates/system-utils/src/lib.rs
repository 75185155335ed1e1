mod capture;
pub mod path;
pub mod pipeline;

pub use pipeline::{
    run_pipeline, run_pipeline_with_timeout, CommandSpec, PipelineError, PipelineFailure,
    PipelineOutput,
};
