pub mod heuristic;
pub mod input;
pub mod loaders;
pub mod page;
pub mod prompt;
pub mod review;
pub mod rubric;
pub mod submission;

pub use heuristic::Heuristic;
pub use input::{PageInput, SubmissionInput};
pub use loaders::{load_all_submissions, load_review_file, load_toml_to_submission, ReviewBundle};
pub use page::{ExtractionMethod, PageClassification, PageRecord, PageScore, Severity, Violation};
pub use prompt::PromptVersion;
pub use review::{
    AppliedOverride, Correction, CorrectionReport, FlaggedPage, OverrideRecord, RiskFlag,
    RiskFlagToggle,
};
pub use rubric::CriterionId;
pub use submission::{
    AggregateScore, AggregationWarning, CoverageMetrics, DegradedExtraction, DegradedKind,
    SubmissionResult, ViolationEntry,
};
