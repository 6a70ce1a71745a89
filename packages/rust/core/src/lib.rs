//! Core pipeline orchestration and domain logic for tenderwatch.
//!
//! This crate ties together the tender source, the language model and the
//! notification sink into one run (see [`pipeline::run`]).

pub mod criteria;
pub mod enrichment;
pub mod model;
pub mod output;
pub mod pipeline;

pub use enrichment::{Enricher, build_prompt, compute_missing_info, enrich_function};
pub use model::{FunctionSpec, LanguageModel, OpenAiClient};
pub use output::{read_batch, write_batch};
pub use pipeline::{PipelineConfig, ProgressReporter, RunReport, SilentProgress, run};
