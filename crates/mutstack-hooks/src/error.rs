use crate::stage::CallbackStage;

/// Errors raised by callbacks.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    /// A callback failed while running.
    #[error("callback '{callback}' failed during {stage}: {message}")]
    Callback {
        stage: CallbackStage,
        callback: String,
        message: String,
    },
}

impl HookError {
    /// Create a callback error with a stage, name and message.
    pub fn callback(
        stage: CallbackStage,
        callback: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Callback {
            stage,
            callback: callback.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_compares_fields() {
        let a = HookError::callback(CallbackStage::PreMutate, "check", "boom");
        assert_eq!(a, HookError::callback(CallbackStage::PreMutate, "check", "boom"));
        assert_ne!(a, HookError::callback(CallbackStage::PostMutate, "check", "boom"));
        assert_ne!(a, HookError::callback(CallbackStage::PreMutate, "other", "boom"));
    }

    #[test]
    fn display_names_callback_and_stage() {
        let err = HookError::callback(CallbackStage::PreRevert, "guard", "denied");
        let text = err.to_string();
        assert!(text.contains("'guard'"));
        assert!(text.contains("denied"));
    }
}
