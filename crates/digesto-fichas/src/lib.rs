//! Fiche retrieval: HTML extraction, live sources, the cache resolver and
//! cache coverage.

pub mod html;

pub mod extract;
pub use extract::{Classifier, Extractor, classify};

mod source;
#[cfg(feature = "http")]
pub use source::HttpSource;
pub use source::{DocumentSource, FetchError};

mod resolver;
pub use resolver::{CacheLayout, FicheResolver, ResolveError, ResolveStats};

mod coverage;
pub use coverage::scan_coverage;
