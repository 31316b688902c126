use crate::config::ConfigError;

/// Top-level pipeline failure taxonomy.
///
/// Recoverable problems (rejected CSV rows, skipped users) never become a
/// `PipelineError` — they are counted and logged where they occur. Anything
/// that reaches this enum aborts the batch and maps to a process exit code.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Invalid or missing configuration; detected before Ingest starts (exit 1)
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A master table is missing a row the job corpus references (exit 1)
    #[error("master data error: {0}")]
    MasterData(String),

    /// Ingest could not complete after retries (exit 2)
    #[error("ingest failed: {0}")]
    Ingest(String),

    /// Scoring or enrichment stage failed (exit 3)
    #[error("scoring failed: {0}")]
    Scoring(String),

    /// Matching, allocation or queue stage failed (exit 3)
    #[error("matching failed: {0}")]
    Matching(String),

    /// The hard wall-clock deadline elapsed before the batch finished (exit 4)
    #[error("hard deadline of {0}s exceeded")]
    DeadlineExceeded(u64),

    /// Database operation failed outside a stage wrapper (exit 3)
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// CSV transport failed before chunking began (exit 2)
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Process exit code per the daily-job contract:
    /// 0 success, 1 configuration, 2 ingest, 3 scoring/matching, 4 deadline.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) | PipelineError::MasterData(_) => 1,
            PipelineError::Ingest(_) | PipelineError::Csv(_) | PipelineError::Io(_) => 2,
            PipelineError::Scoring(_)
            | PipelineError::Matching(_)
            | PipelineError::Database(_) => 3,
            PipelineError::DeadlineExceeded(_) => 4,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_process_contract() {
        assert_eq!(
            PipelineError::Config(ConfigError::Missing("DATABASE_URL".into())).exit_code(),
            1
        );
        assert_eq!(PipelineError::MasterData("pref 99".into()).exit_code(), 1);
        assert_eq!(PipelineError::Ingest("chunk 3".into()).exit_code(), 2);
        assert_eq!(PipelineError::Scoring("area stats".into()).exit_code(), 3);
        assert_eq!(PipelineError::Matching("shard 2".into()).exit_code(), 3);
        assert_eq!(PipelineError::DeadlineExceeded(1800).exit_code(), 4);
    }
}
