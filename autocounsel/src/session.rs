//! Session lifecycle around a batch: manual login and teardown.

use std::io::{self, BufRead, Write};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{info, instrument, warn};

use crate::config::PortalConfig;
use crate::drivers::UiDriver;
use crate::element::WaitState;
use crate::errors::AutomationError;
use crate::locator::Locator;
use crate::selector::Selector;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Automation(#[from] AutomationError),

    #[error("Login could not be confirmed: {0}")]
    LoginNotConfirmed(#[source] AutomationError),

    #[error("Failed to read from the terminal: {0}")]
    Prompt(#[from] io::Error),
}

/// Load the login page, let the operator sign in by hand, then confirm.
#[instrument(skip_all, fields(url = %config.login_url))]
pub async fn login(driver: Arc<dyn UiDriver>, config: &PortalConfig) -> Result<(), SessionError> {
    driver.navigate(&config.login_url).await?;
    info!("Login page opened");

    wait_for_enter(
        "Sign in to the portal in the browser window, open the advisee list, \
         then press Enter here to start...",
    )
    .await?;

    confirm_login(driver, config).await
}

/// Check that the logged-in landing marker is on screen.
pub async fn confirm_login(
    driver: Arc<dyn UiDriver>,
    config: &PortalConfig,
) -> Result<(), SessionError> {
    Locator::new(driver, Selector::from(config.selectors.login_marker.as_str()))
        .wait_for(WaitState::Visible, Some(config.timeouts.login_confirm()))
        .await
        .map_err(|e| {
            if e.is_session_fatal() {
                SessionError::Automation(e)
            } else {
                SessionError::LoginNotConfirmed(e)
            }
        })?;
    info!("Login confirmed");
    Ok(())
}

/// Print `message` and wait until a line is read from stdin.
///
/// The read happens on a detached thread: dropping this future must not leave
/// runtime shutdown waiting on a pending `read_line`.
pub async fn wait_for_enter(message: &str) -> Result<(), SessionError> {
    println!("{message}");
    io::stdout().flush()?;
    let (tx, rx) = oneshot::channel();
    std::thread::spawn(move || {
        let mut line = String::new();
        tx.send(io::stdin().lock().read_line(&mut line).map(|_| ())).ok();
    });
    rx.await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;
    Ok(())
}

/// Close the driver, logging instead of failing.
pub async fn teardown(driver: &dyn UiDriver) {
    match driver.close().await {
        Ok(()) => info!("UI session closed"),
        Err(e) => warn!(error = %e, "UI session did not close cleanly"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{DriverCall, ScriptedDriver};

    fn config() -> PortalConfig {
        PortalConfig {
            timeouts: crate::config::Timeouts::fast(),
            ..PortalConfig::default()
        }
    }

    #[tokio::test]
    async fn test_confirm_login_sees_landing_marker() {
        let config = config();
        let driver = Arc::new(ScriptedDriver::new(&config.selectors));
        confirm_login(driver.clone(), &config).await.unwrap();
        assert_eq!(
            driver.count(|c| matches!(c, DriverCall::WaitFor { .. })),
            1
        );
    }

    #[tokio::test]
    async fn test_missing_marker_is_login_not_confirmed() {
        let config = config();
        let driver = Arc::new(ScriptedDriver::new(&config.selectors));
        driver.fail_when(|call| match call {
            DriverCall::WaitFor { .. } => Some(AutomationError::Timeout("marker".to_string())),
            _ => None,
        });
        let err = confirm_login(driver, &config).await.unwrap_err();
        assert!(matches!(err, SessionError::LoginNotConfirmed(_)));
    }

    #[tokio::test]
    async fn test_teardown_twice_is_harmless() {
        let driver = ScriptedDriver::new(&config().selectors);
        teardown(&driver).await;
        teardown(&driver).await;
        assert_eq!(driver.count(|c| matches!(c, DriverCall::Close)), 2);
    }
}
