//! Deciding whether a submitted entry form was persisted.
//!
//! The portal gives no reliable acknowledgement, so success is inferred from
//! weak signals in a fixed order: the form closing quickly, then a dialog seen
//! during the attempt, then nothing at all. Silence still counts as success
//! ([`SaveConfirmation::Assumed`]); a record is never failed on UI latency
//! alone. That can report a save that never happened; callers that need
//! certainty must check the portal separately.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::{PortalSelectors, Timeouts};
use crate::drivers::UiDriver;
use crate::element::{ElementHandle, WaitState};
use crate::errors::AutomationError;
use crate::locator::Locator;
use crate::selector::Selector;
use crate::signal::SignalKind;

/// How a save was judged successful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum SaveConfirmation {
    /// The form's defining control went away within the fast window
    FormClosed,
    /// A dialog was raised during the attempt
    Signal { message: String },
    /// No confirmation either way
    Assumed,
}

impl SaveConfirmation {
    pub fn is_confirmed(&self) -> bool {
        !matches!(self, SaveConfirmation::Assumed)
    }

    pub fn state(&self) -> VerifierState {
        match self {
            SaveConfirmation::FormClosed => VerifierState::ConfirmedByFormClose,
            SaveConfirmation::Signal { .. } => VerifierState::ConfirmedBySignal,
            SaveConfirmation::Assumed => VerifierState::AssumedSuccess,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierState {
    Submitted,
    ConfirmedByFormClose,
    ConfirmedBySignal,
    AssumedSuccess,
    Done,
}

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("Could not activate the save control: {0}")]
    Activate(#[source] AutomationError),

    #[error("Waiting for the entry form to close failed: {0}")]
    Confirm(#[source] AutomationError),
}

impl SaveError {
    pub fn automation(&self) -> &AutomationError {
        match self {
            SaveError::Activate(e) | SaveError::Confirm(e) => e,
        }
    }
}

pub struct SaveVerifier<'a> {
    driver: Arc<dyn UiDriver>,
    selectors: &'a PortalSelectors,
    timeouts: &'a Timeouts,
    snapshot_dir: &'a Path,
}

impl<'a> SaveVerifier<'a> {
    pub fn new(
        driver: Arc<dyn UiDriver>,
        selectors: &'a PortalSelectors,
        timeouts: &'a Timeouts,
        snapshot_dir: &'a Path,
    ) -> Self {
        Self {
            driver,
            selectors,
            timeouts,
            snapshot_dir,
        }
    }

    fn locator(&self, scope: &ElementHandle, raw: &str) -> Locator {
        Locator::new(self.driver.clone(), Selector::from(raw))
            .within(scope.clone())
            .set_default_timeout(self.timeouts.action())
    }

    /// Click save inside `scope` and judge the result. A failure snapshot is
    /// captured before any error is returned.
    #[instrument(skip(self, scope))]
    pub async fn save(
        &self,
        scope: &ElementHandle,
        student_id: &str,
    ) -> Result<SaveConfirmation, SaveError> {
        let result = self.submit_and_confirm(scope).await;
        if let Err(e) = &result {
            warn!(student_id, error = %e, "Save failed");
            self.capture_failure(student_id).await;
        }
        result
    }

    async fn submit_and_confirm(
        &self,
        scope: &ElementHandle,
    ) -> Result<SaveConfirmation, SaveError> {
        // Subscribed before the click so a dialog raised by it is not missed;
        // released when this function returns, on every path.
        let mut signals = self.driver.subscribe(SignalKind::Dialog);

        self.locator(scope, &self.selectors.save_button)
            .click()
            .await
            .map_err(SaveError::Activate)?;
        let mut state = VerifierState::Submitted;
        debug!(?state, "Save activated");

        let form = self.locator(scope, &self.selectors.form_marker);
        match form
            .wait_for(WaitState::Hidden, Some(self.timeouts.save_fast_confirm()))
            .await
        {
            Ok(()) => {
                let confirmation = SaveConfirmation::FormClosed;
                transition(&mut state, confirmation.state());
                info!("Entry form closed after save");
                transition(&mut state, VerifierState::Done);
                return Ok(confirmation);
            }
            Err(e) if e.is_timeout() => {
                debug!("Entry form still open after fast confirmation window");
            }
            Err(e) => return Err(SaveError::Confirm(e)),
        }

        tokio::time::sleep(self.timeouts.save_settle()).await;

        let confirmation = match signals.drain().into_iter().next() {
            Some(signal) => {
                info!(message = %signal.message, "Save confirmed by dialog");
                SaveConfirmation::Signal {
                    message: signal.message,
                }
            }
            None => {
                warn!("Save could not be confirmed from the UI; assuming success");
                SaveConfirmation::Assumed
            }
        };
        transition(&mut state, confirmation.state());
        transition(&mut state, VerifierState::Done);
        Ok(confirmation)
    }

    /// Look for the saved entry's title in the profile's counseling list.
    /// Evidence for the log only; the outcome has already been decided.
    pub async fn corroborate(&self, scope: &ElementHandle, title: &str) -> bool {
        let entry = Locator::new(self.driver.clone(), Selector::text(title)).within(scope.clone());
        match entry.is_visible().await {
            Ok(true) => {
                info!(title, "Saved entry found in the counseling list");
                true
            }
            Ok(false) => {
                warn!(title, "Saved entry not found in the counseling list");
                false
            }
            Err(e) => {
                debug!(title, error = %e, "Counseling list could not be checked");
                false
            }
        }
    }

    async fn capture_failure(&self, student_id: &str) {
        let safe_id: String = student_id
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        let path = self.snapshot_dir.join(format!(
            "fail_{safe_id}_{}.png",
            chrono::Utc::now().timestamp_millis()
        ));
        match self.driver.snapshot(&path).await {
            Ok(()) => info!(path = %path.display(), "Failure snapshot saved"),
            Err(e) => debug!(error = %e, "Failure snapshot could not be taken"),
        }
    }
}

fn transition(state: &mut VerifierState, next: VerifierState) {
    debug!(from = ?*state, to = ?next, "save verifier transition");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortalConfig;
    use crate::drivers::{DriverCall, SaveFeedback, ScriptedDriver};
    use std::time::Duration;

    fn fast_config() -> PortalConfig {
        PortalConfig {
            timeouts: Timeouts::fast(),
            ..PortalConfig::default()
        }
    }

    async fn open_form(driver: &Arc<ScriptedDriver>, config: &PortalConfig) -> ElementHandle {
        let scope = driver
            .locate(
                &Selector::from(config.selectors.profile_frame.as_str()),
                None,
                Duration::from_millis(50),
            )
            .await
            .unwrap();
        let entry = driver
            .locate(
                &Selector::from(config.selectors.entry_button.as_str()),
                Some(&scope),
                Duration::from_millis(50),
            )
            .await
            .unwrap();
        driver.click(&entry).await.unwrap();
        scope
    }

    async fn run(feedback: SaveFeedback) -> (Arc<ScriptedDriver>, Result<SaveConfirmation, SaveError>) {
        let config = fast_config();
        let driver = Arc::new(ScriptedDriver::new(&config.selectors));
        driver.set_save_feedback(feedback);
        let scope = open_form(&driver, &config).await;
        let dir = tempfile::tempdir().unwrap();
        let verifier = SaveVerifier::new(
            driver.clone(),
            &config.selectors,
            &config.timeouts,
            dir.path(),
        );
        let result = verifier.save(&scope, "20230001").await;
        (driver, result)
    }

    #[tokio::test]
    async fn test_fast_close_confirms_without_further_checks() {
        let (driver, result) = run(SaveFeedback::CloseForm).await;
        assert_eq!(result.unwrap(), SaveConfirmation::FormClosed);
        // exactly one wait: the fast confirmation
        let waits = driver.count(|c| matches!(c, DriverCall::WaitFor { .. }));
        assert_eq!(waits, 1);
        assert_eq!(driver.signal_subscribers(), 0);
    }

    #[tokio::test]
    async fn test_dialog_confirms_when_form_stays_open() {
        let (driver, result) = run(SaveFeedback::DialogOnly).await;
        match result.unwrap() {
            SaveConfirmation::Signal { message } => assert!(!message.is_empty()),
            other => panic!("expected Signal confirmation, got {other:?}"),
        }
        assert_eq!(driver.signal_subscribers(), 0);
    }

    #[tokio::test]
    async fn test_silence_is_assumed_success() {
        // Known limitation: nothing proves the record was stored here.
        let (_driver, result) = run(SaveFeedback::Silent).await;
        let confirmation = result.unwrap();
        assert_eq!(confirmation, SaveConfirmation::Assumed);
        assert!(!confirmation.is_confirmed());
        assert_eq!(confirmation.state(), VerifierState::AssumedSuccess);
    }

    #[tokio::test]
    async fn test_missing_save_control_fails_and_snapshots() {
        let config = fast_config();
        let driver = Arc::new(ScriptedDriver::new(&config.selectors));
        let save = Selector::from(config.selectors.save_button.as_str());
        driver.fail_when(move |call| match call {
            DriverCall::Locate { selector, .. } if *selector == save => Some(
                AutomationError::ElementNotFound("save button".to_string()),
            ),
            _ => None,
        });
        let scope = open_form(&driver, &config).await;
        let dir = tempfile::tempdir().unwrap();
        let verifier =
            SaveVerifier::new(driver.clone(), &config.selectors, &config.timeouts, dir.path());

        let err = verifier.save(&scope, "2023/0001").await.unwrap_err();
        assert!(matches!(err, SaveError::Activate(_)));
        assert_eq!(driver.signal_subscribers(), 0);

        let snapshots: Vec<_> = driver
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Snapshot(path) => Some(path),
                _ => None,
            })
            .collect();
        assert_eq!(snapshots.len(), 1);
        let name = snapshots[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("fail_2023_0001_"), "{name}");
        assert!(snapshots[0].starts_with(dir.path()));
    }

    #[tokio::test]
    async fn test_broken_close_wait_fails_confirm_and_snapshots() {
        let config = fast_config();
        let driver = Arc::new(ScriptedDriver::new(&config.selectors));
        driver.set_save_feedback(SaveFeedback::DialogOnly);
        driver.fail_when(|call| match call {
            DriverCall::WaitFor { .. } => {
                Some(AutomationError::PlatformError("renderer crashed".to_string()))
            }
            _ => None,
        });
        let scope = open_form(&driver, &config).await;
        let dir = tempfile::tempdir().unwrap();
        let verifier =
            SaveVerifier::new(driver.clone(), &config.selectors, &config.timeouts, dir.path());

        let err = verifier.save(&scope, "20230001").await.unwrap_err();
        assert!(matches!(err, SaveError::Confirm(AutomationError::PlatformError(_))));
        assert_eq!(driver.count(|c| matches!(c, DriverCall::Snapshot(_))), 1);
        assert_eq!(driver.signal_subscribers(), 0);
    }

    #[tokio::test]
    async fn test_corroborate_only_reports() {
        let config = fast_config();
        let driver = Arc::new(ScriptedDriver::new(&config.selectors));
        let scope = open_form(&driver, &config).await;
        let dir = tempfile::tempdir().unwrap();
        let verifier =
            SaveVerifier::new(driver.clone(), &config.selectors, &config.timeouts, dir.path());
        assert!(verifier.corroborate(&scope, "진로 상담").await);

        driver.fail_when(|call| match call {
            DriverCall::IsVisible { .. } => Some(AutomationError::Timeout("list".to_string())),
            _ => None,
        });
        assert!(!verifier.corroborate(&scope, "진로 상담").await);
        assert_eq!(
            driver.count(|c| matches!(c, DriverCall::IsVisible { selector } if *selector == Selector::text("진로 상담"))),
            2
        );
    }

    #[tokio::test]
    async fn test_snapshot_failure_is_swallowed() {
        let config = fast_config();
        let driver = Arc::new(ScriptedDriver::new(&config.selectors));
        driver.fail_when(|call| match call {
            DriverCall::Click { .. } | DriverCall::Snapshot(_) => {
                Some(AutomationError::Internal("boom".to_string()))
            }
            _ => None,
        });
        let scope = driver
            .locate(&Selector::from("css:iframe"), None, Duration::from_millis(10))
            .await
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let verifier =
            SaveVerifier::new(driver.clone(), &config.selectors, &config.timeouts, dir.path());

        let err = verifier.save(&scope, "1").await.unwrap_err();
        assert!(matches!(err.automation(), AutomationError::Internal(_)));
    }
}
