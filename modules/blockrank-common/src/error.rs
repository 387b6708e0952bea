use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BlockRankError>;

/// Failures acquiring a browser session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Remote pool exhausted and no local browser to fall back to.
    #[error("No browser available: remote pool failed after {attempts} attempt(s) ({last_error}) and no local fallback exists")]
    Unavailable { attempts: u32, last_error: String },

    #[error("Failed to launch local browser: {0}")]
    Launch(String),
}

impl SessionError {
    /// Only an exhausted pool without fallback aborts a whole invocation.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SessionError::Unavailable { .. })
    }
}

#[derive(Error, Debug)]
pub enum BlockRankError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Scrape error: {0}")]
    Scrape(String),

    #[error("Timed out after {0:?} waiting for result content")]
    SelectorTimeout(Duration),

    #[error("Search volume fetch failed: {0}")]
    VolumeFetch(String),

    #[error("Persist error: {0}")]
    Persist(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BlockRankError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, BlockRankError::Session(e) if e.is_fatal())
    }

    /// Errors that mean "no data" rather than a failed record.
    pub fn degrades_to_empty(&self) -> bool {
        matches!(
            self,
            BlockRankError::Scrape(_) | BlockRankError::SelectorTimeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_session_is_fatal() {
        let fatal: BlockRankError = SessionError::Unavailable {
            attempts: 5,
            last_error: "429".into(),
        }
        .into();
        assert!(fatal.is_fatal());

        let launch: BlockRankError = SessionError::Launch("no such file".into()).into();
        assert!(!launch.is_fatal());
        assert!(!launch.degrades_to_empty());
        assert!(!BlockRankError::Persist("x".into()).is_fatal());
    }

    #[test]
    fn scrape_failures_degrade() {
        assert!(BlockRankError::Scrape("nav".into()).degrades_to_empty());
        assert!(BlockRankError::SelectorTimeout(Duration::from_secs(1)).degrades_to_empty());
        assert!(!BlockRankError::Persist("db".into()).degrades_to_empty());
    }
}
