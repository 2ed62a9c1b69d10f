pub mod config;
pub mod fiche;
pub mod norm_id;
pub mod relation;
pub mod schema;

pub use config::{ConfigError, PipelineConfig, RetryPolicy};
pub use fiche::{
    AnnexEntry, CoverageRow, DeepRecord, Fiche, FicheRelations, Publication, RelationLink,
    embedded_ids,
};
pub use norm_id::{NormId, normalize_id};
pub use relation::{
    ModificationPair, OfficialRelation, Provenance, RelationEdge, RelationKind, UnknownKind,
};
pub use schema::tables;
