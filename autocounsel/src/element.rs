use serde::{Deserialize, Serialize};
use std::fmt;

use crate::selector::Selector;

/// An opaque reference to a live element resolved by a [`crate::UiDriver`].
///
/// Handles are only meaningful to the driver that produced them. A handle can
/// go stale when the page navigates; drivers report that as
/// [`crate::AutomationError::ElementDetached`].
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    id: String,
    selector: Selector,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>, selector: Selector) -> Self {
        Self {
            id: id.into(),
            selector,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The selector this handle was resolved from.
    pub fn selector(&self) -> &Selector {
        &self.selector
    }
}

impl fmt::Debug for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementHandle({} <- {})", self.id, self.selector)
    }
}

/// The state a wait resolves on, mirroring Playwright's `wait_for(state=...)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitState {
    /// Present in the DOM
    Attached,
    /// Not present in the DOM
    Detached,
    /// Present with a non-empty box and not hidden by style
    Visible,
    /// Detached, or present but not visible
    Hidden,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
        }
    }
}

impl fmt::Display for WaitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
