use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::{PortalSelectors, Timeouts};
use crate::drivers::UiDriver;
use crate::element::{ElementHandle, WaitState};
use crate::errors::AutomationError;
use crate::locator::Locator;
use crate::mapper::{FieldAction, FieldTarget, FieldValue};
use crate::selector::Selector;

/// A form could not be (fully) filled. Whatever was already typed is abandoned.
#[derive(Error, Debug)]
#[error("Form filling failed for student {student_id} at {step}: {source}")]
pub struct FormError {
    pub student_id: String,
    pub step: String,
    #[source]
    pub source: AutomationError,
}

/// Applies mapper output to the entry form inside an opened profile.
pub struct FormFiller<'a> {
    driver: Arc<dyn UiDriver>,
    selectors: &'a PortalSelectors,
    timeouts: &'a Timeouts,
}

impl<'a> FormFiller<'a> {
    pub fn new(
        driver: Arc<dyn UiDriver>,
        selectors: &'a PortalSelectors,
        timeouts: &'a Timeouts,
    ) -> Self {
        Self {
            driver,
            selectors,
            timeouts,
        }
    }

    fn locator(&self, scope: &ElementHandle, selector: Selector) -> Locator {
        Locator::new(self.driver.clone(), selector)
            .within(scope.clone())
            .set_default_timeout(self.timeouts.action())
    }

    /// Open the entry dialog, wait for the form, then apply `actions` in order.
    #[instrument(skip(self, scope, actions), fields(actions = actions.len()))]
    pub async fn fill(
        &self,
        scope: &ElementHandle,
        student_id: &str,
        actions: &[FieldAction],
    ) -> Result<(), FormError> {
        let fail = |step: String| {
            move |source: AutomationError| FormError {
                student_id: student_id.to_string(),
                step,
                source,
            }
        };

        debug!("Opening entry form");
        self.locator(scope, Selector::from(self.selectors.entry_button.as_str()))
            .click()
            .await
            .map_err(fail("open entry form".to_string()))?;

        self.locator(scope, Selector::from(self.selectors.form_marker.as_str()))
            .wait_for(WaitState::Visible, Some(self.timeouts.form_open()))
            .await
            .map_err(fail("wait for entry form".to_string()))?;

        for action in actions {
            self.apply(scope, action)
                .await
                .map_err(fail(format!("control {}", action.target)))?;
        }

        info!(student_id, "Entry form filled");
        Ok(())
    }

    async fn apply(&self, scope: &ElementHandle, action: &FieldAction) -> Result<(), AutomationError> {
        match &action.value {
            FieldValue::Text(text) => {
                debug!(control = %action.target, "fill");
                self.locator(scope, self.control_selector(action.target))
                    .fill(text)
                    .await
            }
            FieldValue::SelectLabel(label) => {
                debug!(control = %action.target, %label, "select");
                self.locator(scope, self.control_selector(action.target))
                    .select_option(label)
                    .await
            }
            FieldValue::Choice(code) => {
                debug!(control = %action.target, %code, "choose");
                self.locator(scope, self.selectors.choice(action.target.control(), code))
                    .click()
                    .await
            }
            FieldValue::Toggle(true) => {
                debug!(control = %action.target, "toggle on");
                self.locator(scope, self.control_selector(action.target))
                    .click()
                    .await
            }
            FieldValue::Toggle(false) => Ok(()),
        }
    }

    /// Selector for a single-control target. Radio groups are addressed per
    /// value through [`PortalSelectors::choice`] instead.
    pub fn control_selector(&self, target: FieldTarget) -> Selector {
        let raw = match target {
            FieldTarget::Date => &self.selectors.date_input,
            FieldTarget::Hour => &self.selectors.hour_input,
            FieldTarget::Minute => &self.selectors.minute_input,
            FieldTarget::Category => &self.selectors.category_select,
            FieldTarget::Title => &self.selectors.title_input,
            FieldTarget::Content => &self.selectors.content_input,
            FieldTarget::Privacy => &self.selectors.privacy_toggle,
            FieldTarget::Mode | FieldTarget::Status(_) | FieldTarget::Referral => {
                return Selector::Css(format!("input[name='{}']", target.control()));
            }
        };
        Selector::from(raw.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PortalConfig;
    use crate::drivers::{DriverCall, ScriptedDriver};

    fn config() -> PortalConfig {
        PortalConfig {
            timeouts: Timeouts::fast(),
            ..PortalConfig::default()
        }
    }

    fn scope() -> ElementHandle {
        ElementHandle::new("frame", Selector::from("css:iframe"))
    }

    #[tokio::test]
    async fn test_actions_applied_in_order_after_form_opens() {
        let config = config();
        let driver = Arc::new(ScriptedDriver::new(&config.selectors));
        let filler = FormFiller::new(driver.clone(), &config.selectors, &config.timeouts);
        let actions = vec![
            FieldAction {
                target: FieldTarget::Title,
                value: FieldValue::Text("진로 상담".to_string()),
            },
            FieldAction {
                target: FieldTarget::Privacy,
                value: FieldValue::Toggle(false),
            },
            FieldAction {
                target: FieldTarget::Content,
                value: FieldValue::Text("학업 계획 논의".to_string()),
            },
        ];

        filler.fill(&scope(), "20230001", &actions).await.unwrap();

        assert!(driver.is_form_open());
        let fills: Vec<String> = driver
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                DriverCall::Fill { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(fills, vec!["진로 상담", "학업 계획 논의"]);
        // Toggle(false) touches nothing
        assert_eq!(driver.count(|c| matches!(c, DriverCall::Click { .. })), 1);
    }

    #[tokio::test]
    async fn test_failure_is_tagged_with_student_and_control() {
        let config = config();
        let driver = Arc::new(ScriptedDriver::new(&config.selectors));
        driver.fail_when(|call| match call {
            DriverCall::Fill { text, .. } if text == "boom" => {
                Some(AutomationError::ElementNotVisible("#Content".to_string()))
            }
            _ => None,
        });
        let filler = FormFiller::new(driver.clone(), &config.selectors, &config.timeouts);
        let actions = vec![FieldAction {
            target: FieldTarget::Content,
            value: FieldValue::Text("boom".to_string()),
        }];

        let err = filler.fill(&scope(), "20230009", &actions).await.unwrap_err();
        assert_eq!(err.student_id, "20230009");
        assert!(err.step.contains("Content"), "step was {}", err.step);
        assert!(err.source.is_interaction());
    }
}
