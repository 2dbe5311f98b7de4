// Disclosure pipeline: discovery, retrieval, parsing, catalog, enrichment

pub mod catalog;
pub mod columns;
pub mod diagnostics;
pub mod discovery;
pub mod enrich;
pub mod extract;
pub mod orchestrator;
pub mod parser;
pub mod retrieval;

// Re-export the stage entry points
pub use catalog::ReferenceCatalogLoader;
pub use discovery::PeriodDiscoverer;
pub use enrich::enrich;
pub use orchestrator::{Pipeline, RunSummary};
pub use parser::RecordParser;
pub use retrieval::ArchiveRetriever;
