//! Relation graph consolidation and the batch pipeline.

pub mod consolidate;
pub use consolidate::{
    Consolidation, ConsolidationStats, EdgeAccumulator, consolidate, derive_official_relations,
};

pub mod pipeline;
pub use pipeline::{COVERAGE_FILE, EDGES_FILE, Pipeline, PipelineError, RunOutput, RunReport};
