pub mod toml_loader;

pub use toml_loader::{load_all_submissions, load_review_file, load_toml_to_submission, ReviewBundle};
