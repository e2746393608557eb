pub type ReelResult<T> = Result<T, ReelError>;

#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("empty script: no non-blank hook, segment, or conclusion to render")]
    EmptyScript,

    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("encode failure: {0}")]
    Encode(String),

    #[error("render cancelled before frame {0}")]
    Cancelled(u64),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Self::ResourceUnavailable(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Whether the pass this error came from can never produce a usable video.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::ResourceUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            ReelError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            ReelError::resource("x")
                .to_string()
                .contains("resource unavailable:")
        );
        assert!(
            ReelError::encode("x")
                .to_string()
                .contains("encode failure:")
        );
        assert!(ReelError::EmptyScript.to_string().contains("empty script"));
        assert!(ReelError::Cancelled(7).to_string().contains("frame 7"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ReelError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn only_resource_errors_are_recoverable() {
        assert!(!ReelError::resource("font").is_fatal());
        assert!(ReelError::EmptyScript.is_fatal());
        assert!(ReelError::encode("pipe closed").is_fatal());
    }
}
