mod error;
mod outcome;

pub use error::AnalysisError;
pub use outcome::AnalysisOutcome;
