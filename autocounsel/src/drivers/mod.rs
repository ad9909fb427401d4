use crate::element::{ElementHandle, WaitState};
use crate::errors::AutomationError;
use crate::selector::Selector;
use crate::signal::{SignalKind, SignalSubscription};
use std::path::Path;
use std::time::Duration;

#[cfg(feature = "browser")]
pub mod cdp;
pub mod scripted;

#[cfg(feature = "browser")]
pub use cdp::{BrowserSettings, CdpDriver};
pub use scripted::{DriverCall, SaveFeedback, ScriptedDriver};

/// The capability every UI backend must provide to the batch pipeline.
///
/// All lookups are lazy: a `selector` plus an optional `scope` (an element
/// whose subtree, or frame document, bounds the search). Implementations
/// report every failure as an [`AutomationError`]; the pipeline does not care
/// which backend produced it.
#[async_trait::async_trait]
pub trait UiDriver: Send + Sync {
    /// Load a URL in the session's single page
    async fn navigate(&self, url: &str) -> Result<(), AutomationError>;

    /// Resolve the first element matching `selector`, polling until `timeout`.
    async fn locate(
        &self,
        selector: &Selector,
        scope: Option<&ElementHandle>,
        timeout: Duration,
    ) -> Result<ElementHandle, AutomationError>;

    /// Replace the element's value with `text`
    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<(), AutomationError>;

    /// Select the `<option>` whose label equals `label`
    async fn select_option(
        &self,
        element: &ElementHandle,
        label: &str,
    ) -> Result<(), AutomationError>;

    async fn click(&self, element: &ElementHandle) -> Result<(), AutomationError>;

    /// Wait until the first match of `selector` reaches `state`. Returns
    /// [`AutomationError::Timeout`] when it does not within `timeout`.
    async fn wait_for(
        &self,
        selector: &Selector,
        scope: Option<&ElementHandle>,
        state: WaitState,
        timeout: Duration,
    ) -> Result<(), AutomationError>;

    /// Whether the first match is currently visible; no waiting
    async fn is_visible(
        &self,
        selector: &Selector,
        scope: Option<&ElementHandle>,
    ) -> Result<bool, AutomationError>;

    /// Text content of the page body
    async fn page_text(&self) -> Result<String, AutomationError>;

    /// Write a full-page capture of the current UI state to `path`
    async fn snapshot(&self, path: &Path) -> Result<(), AutomationError>;

    /// Press a named key (e.g. "Escape", "Enter") on the focused element
    async fn press_key(&self, key: &str) -> Result<(), AutomationError>;

    /// Start collecting signals of `kind`; collection stops when the returned
    /// subscription is dropped.
    fn subscribe(&self, kind: SignalKind) -> SignalSubscription;

    /// Tear the session down. Calling it again is a no-op.
    async fn close(&self) -> Result<(), AutomationError>;
}
