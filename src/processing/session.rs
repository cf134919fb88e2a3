use crate::processing::error::PipelineError;

/// Capability handed in by whatever authenticated the caller. The pipeline
/// never inspects credentials itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionGate {
    Authenticated,
    Anonymous,
}
impl SessionGate {
    pub fn from_flag(authenticated: bool) -> Self {
        if authenticated {
            SessionGate::Authenticated
        } else {
            SessionGate::Anonymous
        }
    }
    pub fn ensure_authenticated(self) -> Result<(), PipelineError> {
        match self {
            SessionGate::Authenticated => Ok(()),
            SessionGate::Anonymous => Err(PipelineError::NotAuthenticated),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_authenticated_sessions_pass() {
        assert!(SessionGate::from_flag(true).ensure_authenticated().is_ok());
        assert!(matches!(
            SessionGate::from_flag(false).ensure_authenticated(),
            Err(PipelineError::NotAuthenticated)
        ));
    }
}
