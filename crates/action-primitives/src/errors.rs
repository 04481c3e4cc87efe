use thiserror::Error;

/// Why a page primitive did not complete.
///
/// The registry turns these into failed action results; the message is what
/// the decision engine reads next step, so it names the element or tab.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("navigation did not finish: {0}")]
    NavTimeout(String),

    /// The action's deadline passed before the page answered.
    #[error("deadline exceeded: {0}")]
    WaitTimeout(String),

    /// The loop's cancel token fired mid-action.
    #[error("interrupted: {0}")]
    Interrupted(String),

    #[error("element cannot be clicked: {0}")]
    NotClickable(String),

    #[error("element is disabled: {0}")]
    NotEnabled(String),

    #[error("no matching option: {0}")]
    OptionNotFound(String),

    /// The locator recorded at observation time matches nothing now.
    #[error("element no longer on the page: {0}")]
    ElementNotFound(String),

    #[error("cannot scroll: {0}")]
    ScrollTargetInvalid(String),

    #[error("frame detached: {0}")]
    FrameDetached(String),

    #[error("unknown tab: {0}")]
    TabNotFound(String),

    /// Transport or protocol failure talking to the browser.
    #[error("browser connection error: {0}")]
    CdpIo(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ActionError {
    /// Whether the same action may succeed on the next step without the
    /// engine changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::WaitTimeout(_)
                | ActionError::NavTimeout(_)
                | ActionError::NotClickable(_)
                | ActionError::CdpIo(_)
        )
    }

    /// Whether the element addressed by index has gone from the live page,
    /// so only a fresh observation can name it again.
    pub fn is_stale_target(&self) -> bool {
        matches!(
            self,
            ActionError::ElementNotFound(_) | ActionError::FrameDetached(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(ActionError::CdpIo("socket closed".into()).is_retryable());
        assert!(!ActionError::Interrupted("stop".into()).is_retryable());
        assert!(ActionError::FrameDetached("/html[1]/body[1]/iframe[1]".into()).is_stale_target());
        assert!(!ActionError::OptionNotFound("XL".into()).is_stale_target());
    }

    #[test]
    fn messages_name_the_target() {
        assert_eq!(
            ActionError::TabNotFound("tab-9".into()).to_string(),
            "unknown tab: tab-9"
        );
    }
}
