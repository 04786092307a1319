//! Collaborator-facing input and output

pub mod report;
pub mod scene_source;

pub use report::{write_roc_csv, write_roc_csv_file, ROC_CSV_HEADER};
pub use scene_source::{fetch_with_retry, AcquisitionError, SceneCollection, SceneSource};
