/// Failures callers need to tell apart from a plain store error.
///
/// Raised through `anyhow` and recovered with `downcast_ref`, so context
/// added on the way up does not hide them.
#[derive(Debug, thiserror::Error)]
pub enum TrainerError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },
    #[error("{0}")]
    Invalid(String),
}

impl TrainerError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}

/// Whether an error chain carries `TrainerError::NotFound`.
#[must_use]
pub fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<TrainerError>(),
        Some(TrainerError::NotFound { .. })
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_not_found_survives_context() {
        let err: anyhow::Result<()> =
            Err(anyhow::Error::new(TrainerError::not_found("Video", "abc")))
                .context("loading video");
        let err = err.unwrap_err();
        assert!(is_not_found(&err));
        assert_eq!(
            err.downcast_ref::<TrainerError>().unwrap().to_string(),
            "Video 'abc' not found"
        );
    }

    #[test]
    fn test_invalid_is_not_not_found() {
        let err = anyhow::Error::new(TrainerError::invalid("bad rating"));
        assert!(!is_not_found(&err));
        assert_eq!(err.to_string(), "bad rating");
    }
}
