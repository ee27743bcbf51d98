pub mod analysis;

pub use analysis::{AnalysisResult, AnalyzeRequest, ImageUpload, DEFAULT_PROMPT};
