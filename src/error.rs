use derive_more::derive::Display;

pub type DigestResult<T> = Result<T, DigestError>;

/// Stage-level failures of a digest run. Per-message summarization
/// problems are absorbed inside the summarizer and never surface here.
#[derive(Debug, Display)]
pub enum DigestError {
    /// The mailbox transport could not be reached or refused
    /// authentication after the bounded retries. Aborts the run.
    #[display("mailbox unavailable: {_0}")]
    SourceUnavailable(anyhow::Error),
    /// The outbound relay rejected the digest. The report was built
    /// but not delivered; the next scheduled firing is the retry.
    #[display("delivery failed: {_0}")]
    DeliveryFailed(anyhow::Error),
    /// The run exceeded its overall time budget and was abandoned.
    #[display("run exceeded {_0}s budget")]
    RunTimeout(u64),
    #[display("{_0}")]
    Internal(anyhow::Error),
}

impl std::error::Error for DigestError {}

impl From<anyhow::Error> for DigestError {
    fn from(error: anyhow::Error) -> Self {
        DigestError::Internal(error)
    }
}

impl DigestError {
    /// Short stage tag for run-failure log lines.
    pub fn stage(&self) -> &'static str {
        match self {
            DigestError::SourceUnavailable(_) => "fetch",
            DigestError::DeliveryFailed(_) => "send",
            DigestError::RunTimeout(_) => "run",
            DigestError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_display_includes_cause() {
        let err = DigestError::DeliveryFailed(anyhow!("relay refused recipient"));
        assert_eq!(err.to_string(), "delivery failed: relay refused recipient");
        assert_eq!(err.stage(), "send");
    }

    #[test]
    fn test_anyhow_converts_to_internal() {
        fn inner() -> DigestResult<()> {
            Err(anyhow!("boom"))?;
            Ok(())
        }
        assert!(matches!(inner(), Err(DigestError::Internal(_))));
    }
}
