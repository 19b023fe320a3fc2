use thiserror::Error;

/// Fatal conditions for a single stream's run.
///
/// Every variant aborts the current stream only; the coordinator catches it
/// and carries on with the remaining streams. An unresolved asset pair is
/// deliberately NOT here: enrichment degrades to a fallback value instead.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("pagination stalled: cursor {cursor} did not advance (floor {floor})")]
    Stall { cursor: f64, floor: f64 },

    #[error("storage failure: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl SyncError {
    /// Stable label for logs and run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Authentication(_) => "authentication",
            SyncError::Transport(_) => "transport",
            SyncError::Stall { .. } => "stall",
            SyncError::Storage(_) => "storage",
        }
    }
}

/// Kraken reports failures as an array of `E<category>:<detail>` strings in
/// an otherwise-200 response. Key problems are permanent for the run, so
/// they map to `Authentication`; everything else is transport-level.
pub fn classify_api_errors(errors: &[String]) -> SyncError {
    const AUTH_PREFIXES: [&str; 4] = [
        "EAPI:Invalid key",
        "EAPI:Invalid signature",
        "EAPI:Invalid nonce",
        "EGeneral:Permission denied",
    ];

    let joined = errors.join(", ");
    if errors
        .iter()
        .any(|e| AUTH_PREFIXES.iter().any(|p| e.starts_with(p)))
    {
        SyncError::Authentication(joined)
    } else {
        SyncError::Transport(joined)
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
