use tracing::{debug, instrument};

use crate::drivers::UiDriver;
use crate::element::{ElementHandle, WaitState};
use crate::errors::AutomationError;
use crate::selector::Selector;
use std::sync::Arc;
use std::time::Duration;

// Default timeout if none is specified on the locator itself
const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(10);

/// A high-level API for finding and interacting with UI elements
///
/// Locators are lazy: nothing is resolved until an action or wait runs, and
/// every action resolves afresh, so a locator survives page updates that
/// would invalidate an [`ElementHandle`].
#[derive(Clone)]
pub struct Locator {
    driver: Arc<dyn UiDriver>,
    selector: Selector,
    timeout: Duration, // Default timeout for this locator instance
    root: Option<ElementHandle>,
}

impl Locator {
    /// Create a new locator with the given selector
    pub fn new(driver: Arc<dyn UiDriver>, selector: impl Into<Selector>) -> Self {
        Self {
            driver,
            selector: selector.into(),
            timeout: DEFAULT_LOCATOR_TIMEOUT,
            root: None,
        }
    }

    /// Set a default timeout for waiting operations on this locator instance.
    /// This timeout is used if no specific timeout is passed to action/wait methods.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolve lookups inside `scope` (an element subtree or a frame).
    pub fn within(mut self, scope: ElementHandle) -> Self {
        self.root = Some(scope);
        self
    }

    pub fn within_opt(mut self, scope: Option<&ElementHandle>) -> Self {
        self.root = scope.cloned();
        self
    }

    /// Wait for an element matching the locator to appear, up to the specified timeout.
    /// If no timeout is provided, uses the locator's default timeout.
    #[instrument(level = "debug", skip(self, timeout))]
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<ElementHandle, AutomationError> {
        debug!("Waiting for element matching selector: {}", self.selector);
        self.selector
            .validate()
            .map_err(AutomationError::InvalidSelector)?;
        let effective_timeout = timeout.unwrap_or(self.timeout);

        self.driver
            .locate(&self.selector, self.root.as_ref(), effective_timeout)
            .await
            .map_err(|e| {
                // The driver returns ElementNotFound on timeout. We convert it to a more specific Timeout error here.
                if let AutomationError::ElementNotFound(inner_msg) = e {
                    AutomationError::Timeout(format!(
                        "Timed out after {effective_timeout:?} waiting for element {}. Original error: {inner_msg}",
                        self.selector
                    ))
                } else {
                    e
                }
            })
    }

    pub async fn first(&self, timeout: Option<Duration>) -> Result<ElementHandle, AutomationError> {
        self.wait(timeout).await
    }

    pub async fn fill(&self, text: &str) -> Result<(), AutomationError> {
        let element = self.wait(None).await?;
        self.driver.fill(&element, text).await
    }

    pub async fn click(&self) -> Result<(), AutomationError> {
        let element = self.wait(None).await?;
        self.driver.click(&element).await
    }

    pub async fn select_option(&self, label: &str) -> Result<(), AutomationError> {
        let element = self.wait(None).await?;
        self.driver.select_option(&element, label).await
    }

    /// Wait for the first match to reach `state`.
    #[instrument(level = "debug", skip(self, timeout))]
    pub async fn wait_for(
        &self,
        state: WaitState,
        timeout: Option<Duration>,
    ) -> Result<(), AutomationError> {
        self.selector
            .validate()
            .map_err(AutomationError::InvalidSelector)?;
        self.driver
            .wait_for(
                &self.selector,
                self.root.as_ref(),
                state,
                timeout.unwrap_or(self.timeout),
            )
            .await
    }

    pub async fn is_visible(&self) -> Result<bool, AutomationError> {
        self.driver
            .is_visible(&self.selector, self.root.as_ref())
            .await
    }

    /// Get a nested locator
    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        Locator {
            driver: self.driver.clone(),
            selector: self.selector.clone().then(selector.into()),
            timeout: self.timeout,
            root: self.root.clone(),
        }
    }

    /// Keep only matches that contain `text`.
    pub fn has_text(&self, text: &str) -> Locator {
        Locator {
            driver: self.driver.clone(),
            selector: self.selector.clone().has_text(text),
            timeout: self.timeout,
            root: self.root.clone(),
        }
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn selector_string(&self) -> String {
        self.selector.to_string()
    }
}
