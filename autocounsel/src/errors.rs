use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Element is not visible: {0}")]
    ElementNotVisible(String),

    #[error("Element is detached from DOM: {0}")]
    ElementDetached(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Platform-specific error: {0}")]
    PlatformError(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// The browser, page or transport behind the driver is gone.
    #[error("UI session lost: {0}")]
    SessionLost(String),
}

impl AutomationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AutomationError::Timeout(_))
    }

    /// Errors that describe a single control or wait, as opposed to the
    /// driver or session itself misbehaving.
    pub fn is_interaction(&self) -> bool {
        matches!(
            self,
            AutomationError::ElementNotFound(_)
                | AutomationError::Timeout(_)
                | AutomationError::ElementNotVisible(_)
                | AutomationError::ElementDetached(_)
                | AutomationError::InvalidSelector(_)
                | AutomationError::InvalidArgument(_)
        )
    }

    pub fn is_session_fatal(&self) -> bool {
        matches!(self, AutomationError::SessionLost(_))
    }
}
