pub mod digest;
pub mod report;
pub mod selective;

pub use report::{ExtractionProgress, ExtractionReport, FileOutcome, FileReport};
pub use selective::{ExtractionRequest, SelectiveExtractor};
