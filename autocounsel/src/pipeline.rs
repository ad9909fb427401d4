//! Sequential batch processing: one record at a time through search, open,
//! fill and save, with the profile closed after every attempt.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::config::PortalConfig;
use crate::drivers::UiDriver;
use crate::element::{ElementHandle, WaitState};
use crate::errors::AutomationError;
use crate::form::{FormError, FormFiller};
use crate::locator::Locator;
use crate::mapper::map_record;
use crate::outcome::{Outcome, OutcomeAggregator, OutcomeStatus};
use crate::record::{CounselingRecord, RecordRow, ValidationError};
use crate::selector::Selector;
use crate::verifier::{SaveConfirmation, SaveError, SaveVerifier};

/// Where a record is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStage {
    Idle,
    Searching,
    Opening,
    Filling,
    Saving,
    Closed,
}

/// Why a single record did not succeed.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error("search failed: {0}")]
    Search(#[source] AutomationError),

    #[error("open failed: {0}")]
    Open(#[source] AutomationError),

    #[error("fill failed: {0}")]
    Fill(#[from] FormError),

    #[error("save failed: {0}")]
    Save(#[from] SaveError),
}

impl RecordError {
    fn automation(&self) -> Option<&AutomationError> {
        match self {
            RecordError::Validation(_) => None,
            RecordError::Search(e) | RecordError::Open(e) => Some(e),
            RecordError::Fill(e) => Some(&e.source),
            RecordError::Save(e) => Some(e.automation()),
        }
    }

    /// FAILED for validation and interaction problems, ERROR for the rest.
    pub fn status(&self) -> OutcomeStatus {
        match self.automation() {
            None => OutcomeStatus::Failed,
            Some(e) if e.is_interaction() => OutcomeStatus::Failed,
            Some(_) => OutcomeStatus::Error,
        }
    }

    pub fn is_session_fatal(&self) -> bool {
        self.automation().is_some_and(AutomationError::is_session_fatal)
    }

    /// The text recorded in the outcome's `error_message`.
    pub fn message(&self) -> String {
        match (self.status(), self.automation()) {
            (OutcomeStatus::Error, Some(cause)) => format!("unexpected error: {cause}"),
            _ => self.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("UI session lost at record {index} ({student_id}); batch aborted: {source}")]
    SessionFatal {
        index: usize,
        student_id: String,
        #[source]
        source: AutomationError,
    },
}

/// Drives every row through the portal in source order and collects one
/// outcome per attempted row.
pub struct BatchRunner {
    driver: Arc<dyn UiDriver>,
    config: PortalConfig,
    outcomes: OutcomeAggregator,
    echo_progress: bool,
}

impl BatchRunner {
    pub fn new(driver: Arc<dyn UiDriver>, config: PortalConfig) -> Self {
        Self {
            driver,
            config,
            outcomes: OutcomeAggregator::new(),
            echo_progress: true,
        }
    }

    /// Print `[i/N]` progress lines to stdout (on by default).
    pub fn with_progress(mut self, echo: bool) -> Self {
        self.echo_progress = echo;
        self
    }

    pub fn outcomes(&self) -> &OutcomeAggregator {
        &self.outcomes
    }

    pub fn into_outcomes(self) -> OutcomeAggregator {
        self.outcomes
    }

    fn progress(&self, line: String) {
        if self.echo_progress {
            println!("{line}");
        }
    }

    fn locator(&self, raw: &str) -> Locator {
        Locator::new(self.driver.clone(), Selector::from(raw))
            .set_default_timeout(self.config.timeouts.action())
    }

    /// Process all rows. Stops early only when the UI session is lost; the
    /// outcome for that record is recorded before returning.
    #[instrument(skip(self, rows), fields(total = rows.len()))]
    pub async fn run(&mut self, rows: &[RecordRow]) -> Result<(), PipelineError> {
        let total = rows.len();
        info!(total, "Starting batch");

        for (position, row) in rows.iter().enumerate() {
            self.progress(format!(
                "[{}/{}] {}({})",
                position + 1,
                total,
                row.student_name,
                row.student_id
            ));

            let result = match &row.record {
                Ok(record) => {
                    let result = self.process(record).await;
                    self.close_profile().await;
                    result
                }
                Err(e) => Err(RecordError::Validation(e.clone())),
            };

            match result {
                Ok(confirmation) => {
                    self.progress(format!("  -> SUCCESS ({})", describe(&confirmation)));
                    self.outcomes.push(Outcome::success(
                        row.index,
                        &row.student_id,
                        &row.student_name,
                    ));
                }
                Err(e) => {
                    let status = e.status();
                    let message = e.message();
                    self.progress(format!("  -> {status}: {message}"));
                    if status == OutcomeStatus::Error {
                        error!(index = row.index, student_id = %row.student_id, %message, "Record errored");
                    } else {
                        warn!(index = row.index, student_id = %row.student_id, %message, "Record failed");
                    }
                    self.outcomes.push(Outcome::new(
                        row.index,
                        &row.student_id,
                        &row.student_name,
                        status,
                        message,
                    ));

                    if let Some(source) = e.automation().filter(|c| c.is_session_fatal()).cloned() {
                        error!(index = row.index, "UI session lost; aborting batch");
                        return Err(PipelineError::SessionFatal {
                            index: row.index,
                            student_id: row.student_id.clone(),
                            source,
                        });
                    }
                }
            }

            if position + 1 < total {
                tokio::time::sleep(self.config.timeouts.between_records()).await;
            }
        }

        info!(processed = self.outcomes.len(), "Batch finished");
        Ok(())
    }

    /// One attempt at one record, without the trailing profile close.
    #[instrument(skip(self, record), fields(student_id = %record.student_id))]
    pub async fn process(&self, record: &CounselingRecord) -> Result<SaveConfirmation, RecordError> {
        let mut stage = RecordStage::Idle;
        advance(&mut stage, RecordStage::Searching);
        self.search(&record.student_id)
            .await
            .map_err(RecordError::Search)?;

        advance(&mut stage, RecordStage::Opening);
        let scope = self
            .open_profile(&record.student_id)
            .await
            .map_err(RecordError::Open)?;

        advance(&mut stage, RecordStage::Filling);
        let actions = map_record(record, &self.config.codes);
        FormFiller::new(
            self.driver.clone(),
            &self.config.selectors,
            &self.config.timeouts,
        )
        .fill(&scope, &record.student_id, &actions)
        .await?;

        advance(&mut stage, RecordStage::Saving);
        let verifier = SaveVerifier::new(
            self.driver.clone(),
            &self.config.selectors,
            &self.config.timeouts,
            &self.config.output.snapshot_dir,
        );
        let confirmation = verifier.save(&scope, &record.student_id).await?;
        // a dialog already said it was saved
        if !matches!(confirmation, SaveConfirmation::Signal { .. }) {
            if let Some(title) = record.title.as_deref() {
                verifier.corroborate(&scope, title).await;
            }
        }

        advance(&mut stage, RecordStage::Closed);
        Ok(confirmation)
    }

    async fn search(&self, student_id: &str) -> Result<(), AutomationError> {
        let selectors = &self.config.selectors;
        self.locator(&selectors.search_box).fill(student_id).await?;
        self.locator(&selectors.search_button).click().await?;
        tokio::time::sleep(self.config.timeouts.search_settle()).await;

        let text = self.driver.page_text().await?;
        if !text.contains(student_id) {
            return Err(AutomationError::ElementNotFound(format!(
                "student {student_id} not in search results"
            )));
        }
        debug!("Student found in search results");
        Ok(())
    }

    /// Open the student's profile and return the frame that contains it.
    async fn open_profile(&self, student_id: &str) -> Result<ElementHandle, AutomationError> {
        let selectors = &self.config.selectors;
        let item = self.locator(&selectors.student_item).has_text(student_id);
        if !item.is_visible().await? {
            return Err(AutomationError::ElementNotVisible(format!(
                "list entry for student {student_id}"
            )));
        }
        item.click().await?;
        tokio::time::sleep(self.config.timeouts.profile_settle()).await;

        let frame = self
            .locator(&selectors.profile_frame)
            .set_default_timeout(self.config.timeouts.profile_open());
        frame.wait_for(WaitState::Visible, None).await?;
        frame.first(None).await
    }

    /// Dismiss whatever profile or dialog is open. Never fails; safe to call
    /// when nothing is open.
    pub async fn close_profile(&self) {
        if let Err(e) = self.driver.press_key(&self.config.selectors.dismiss_key).await {
            debug!(error = %e, "Closing profile failed; ignoring");
        }
        tokio::time::sleep(self.config.timeouts.close_settle()).await;
    }
}

fn advance(stage: &mut RecordStage, next: RecordStage) {
    debug!(from = ?*stage, to = ?next, "record stage");
    *stage = next;
}

fn describe(confirmation: &SaveConfirmation) -> String {
    match confirmation {
        SaveConfirmation::FormClosed => "form closed".to_string(),
        SaveConfirmation::Signal { message } => format!("dialog: {message}"),
        SaveConfirmation::Assumed => "assumed, not confirmed".to_string(),
    }
}
