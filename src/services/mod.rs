pub mod aggregation;
pub mod extraction;
pub mod llm_service;
pub mod result_writer;

pub use extraction::{Extraction, Extractor};
pub use llm_service::{LlmService, ScoringModel, ScoringRequest};
pub use result_writer::ResultWriter;
