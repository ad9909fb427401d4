//! An in-memory stand-in for the portal.
//!
//! `ScriptedDriver` models just enough of the portal to drive the pipeline
//! end to end: a search box whose results contain the searched id, an entry
//! form that opens and closes, and configurable feedback when save is
//! clicked. Every call is recorded, and failures can be injected per call.
//! It backs `--dry-run` and the test suite.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use super::UiDriver;
use crate::config::PortalSelectors;
use crate::element::{ElementHandle, WaitState};
use crate::errors::AutomationError;
use crate::selector::Selector;
use crate::signal::{SignalHub, SignalKind, SignalSubscription, UiSignal};

const SAVE_DIALOG_MESSAGE: &str = "저장되었습니다.";

#[derive(Debug, Clone, PartialEq)]
pub enum DriverCall {
    Navigate(String),
    Locate { selector: Selector, scoped: bool },
    Fill { selector: Selector, text: String },
    SelectOption { selector: Selector, label: String },
    Click { selector: Selector },
    WaitFor { selector: Selector, state: WaitState },
    IsVisible { selector: Selector },
    PageText,
    Snapshot(PathBuf),
    PressKey(String),
    Close,
}

/// What the simulated portal does when save is clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SaveFeedback {
    #[default]
    CloseForm,
    CloseFormWithDialog,
    /// Raise a dialog but leave the form on screen
    DialogOnly,
    /// Nothing visible happens
    Silent,
}

type FailureRule = Box<dyn Fn(&DriverCall) -> Option<AutomationError> + Send + Sync>;

#[derive(Default)]
struct PortalState {
    form_open: bool,
    last_search: Option<String>,
    closed: bool,
    save_feedback: SaveFeedback,
    unknown_students: HashSet<String>,
}

struct Known {
    search_box: Selector,
    entry_button: Selector,
    form_marker: Selector,
    save_button: Selector,
    student_item: Selector,
    login_marker: Selector,
    dismiss_key: String,
}

pub struct ScriptedDriver {
    known: Known,
    calls: Mutex<Vec<DriverCall>>,
    rules: Mutex<Vec<FailureRule>>,
    state: Mutex<PortalState>,
    signals: SignalHub,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedDriver {
    pub fn new(selectors: &PortalSelectors) -> Self {
        Self {
            known: Known {
                search_box: Selector::from(selectors.search_box.as_str()),
                entry_button: Selector::from(selectors.entry_button.as_str()),
                form_marker: Selector::from(selectors.form_marker.as_str()),
                save_button: Selector::from(selectors.save_button.as_str()),
                student_item: Selector::from(selectors.student_item.as_str()),
                login_marker: Selector::from(selectors.login_marker.as_str()),
                dismiss_key: selectors.dismiss_key.clone(),
            },
            calls: Mutex::new(Vec::new()),
            rules: Mutex::new(Vec::new()),
            state: Mutex::new(PortalState::default()),
            signals: SignalHub::new(),
        }
    }

    pub fn set_save_feedback(&self, feedback: SaveFeedback) {
        lock(&self.state).save_feedback = feedback;
    }

    /// Searches for `student_id` come back empty.
    pub fn forget_student(&self, student_id: &str) {
        lock(&self.state)
            .unknown_students
            .insert(student_id.to_string());
    }

    /// Fail any call for which `rule` returns an error. Rules are checked in
    /// registration order, after the call is recorded.
    pub fn fail_when<F>(&self, rule: F)
    where
        F: Fn(&DriverCall) -> Option<AutomationError> + Send + Sync + 'static,
    {
        lock(&self.rules).push(Box::new(rule));
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, predicate: impl Fn(&DriverCall) -> bool) -> usize {
        lock(&self.calls).iter().filter(|c| predicate(c)).count()
    }

    pub fn is_form_open(&self) -> bool {
        lock(&self.state).form_open
    }

    pub fn signal_subscribers(&self) -> usize {
        self.signals.subscriber_count()
    }

    fn record(&self, call: DriverCall) -> Result<(), AutomationError> {
        debug!(?call, "scripted driver call");
        if lock(&self.state).closed && call != DriverCall::Close {
            lock(&self.calls).push(call);
            return Err(AutomationError::SessionLost(
                "scripted session was closed".to_string(),
            ));
        }
        let failure = lock(&self.rules).iter().find_map(|rule| rule(&call));
        lock(&self.calls).push(call);
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Whether `selector` is the student list entry for a student the portal
    /// does not know.
    fn is_unknown_student_item(&self, selector: &Selector) -> bool {
        let Selector::Chain(parts) = selector else {
            return false;
        };
        if parts.first() != Some(&self.known.student_item) {
            return false;
        }
        let state = lock(&self.state);
        parts.iter().any(|part| match part {
            Selector::Has(inner) => match inner.as_ref() {
                Selector::Text { text, .. } => state.unknown_students.contains(text),
                _ => false,
            },
            _ => false,
        })
    }

    fn currently_visible(&self, selector: &Selector) -> bool {
        if *selector == self.known.form_marker {
            return lock(&self.state).form_open;
        }
        !self.is_unknown_student_item(selector)
    }
}

#[async_trait::async_trait]
impl UiDriver for ScriptedDriver {
    async fn navigate(&self, url: &str) -> Result<(), AutomationError> {
        self.record(DriverCall::Navigate(url.to_string()))
    }

    async fn locate(
        &self,
        selector: &Selector,
        scope: Option<&ElementHandle>,
        _timeout: Duration,
    ) -> Result<ElementHandle, AutomationError> {
        self.record(DriverCall::Locate {
            selector: selector.clone(),
            scoped: scope.is_some(),
        })?;
        if !self.currently_visible(selector) {
            return Err(AutomationError::ElementNotFound(selector.to_string()));
        }
        Ok(ElementHandle::new(Uuid::new_v4().to_string(), selector.clone()))
    }

    async fn fill(&self, element: &ElementHandle, text: &str) -> Result<(), AutomationError> {
        self.record(DriverCall::Fill {
            selector: element.selector().clone(),
            text: text.to_string(),
        })?;
        if *element.selector() == self.known.search_box {
            lock(&self.state).last_search = Some(text.to_string());
        }
        Ok(())
    }

    async fn select_option(
        &self,
        element: &ElementHandle,
        label: &str,
    ) -> Result<(), AutomationError> {
        self.record(DriverCall::SelectOption {
            selector: element.selector().clone(),
            label: label.to_string(),
        })
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), AutomationError> {
        self.record(DriverCall::Click {
            selector: element.selector().clone(),
        })?;

        let selector = element.selector();
        if *selector == self.known.entry_button {
            lock(&self.state).form_open = true;
        } else if *selector == self.known.save_button {
            let feedback = lock(&self.state).save_feedback;
            let (close, dialog) = match feedback {
                SaveFeedback::CloseForm => (true, false),
                SaveFeedback::CloseFormWithDialog => (true, true),
                SaveFeedback::DialogOnly => (false, true),
                SaveFeedback::Silent => (false, false),
            };
            if dialog {
                let accepted = self.signals.has_subscribers(SignalKind::Dialog);
                self.signals
                    .publish(UiSignal::dialog(SAVE_DIALOG_MESSAGE, accepted));
            }
            if close {
                lock(&self.state).form_open = false;
            }
        }
        Ok(())
    }

    async fn wait_for(
        &self,
        selector: &Selector,
        _scope: Option<&ElementHandle>,
        state: WaitState,
        timeout: Duration,
    ) -> Result<(), AutomationError> {
        self.record(DriverCall::WaitFor {
            selector: selector.clone(),
            state,
        })?;
        let visible = self.currently_visible(selector);
        let reached = match state {
            WaitState::Visible | WaitState::Attached => visible,
            WaitState::Hidden | WaitState::Detached => !visible,
        };
        if reached {
            return Ok(());
        }
        tokio::time::sleep(timeout).await;
        Err(AutomationError::Timeout(format!(
            "{selector} did not become {state} within {timeout:?}"
        )))
    }

    async fn is_visible(
        &self,
        selector: &Selector,
        _scope: Option<&ElementHandle>,
    ) -> Result<bool, AutomationError> {
        self.record(DriverCall::IsVisible {
            selector: selector.clone(),
        })?;
        Ok(self.currently_visible(selector))
    }

    async fn page_text(&self) -> Result<String, AutomationError> {
        self.record(DriverCall::PageText)?;
        let state = lock(&self.state);
        let mut text = match &self.known.login_marker {
            Selector::Text { text, .. } => format!("{text}\n"),
            _ => String::new(),
        };
        if let Some(search) = &state.last_search {
            if !state.unknown_students.contains(search) {
                text.push_str(search);
            }
        }
        Ok(text)
    }

    async fn snapshot(&self, path: &Path) -> Result<(), AutomationError> {
        self.record(DriverCall::Snapshot(path.to_path_buf()))
    }

    async fn press_key(&self, key: &str) -> Result<(), AutomationError> {
        self.record(DriverCall::PressKey(key.to_string()))?;
        if key == self.known.dismiss_key {
            lock(&self.state).form_open = false;
        }
        Ok(())
    }

    fn subscribe(&self, kind: SignalKind) -> SignalSubscription {
        self.signals.subscribe(kind)
    }

    async fn close(&self) -> Result<(), AutomationError> {
        self.record(DriverCall::Close)?;
        lock(&self.state).closed = true;
        Ok(())
    }
}
