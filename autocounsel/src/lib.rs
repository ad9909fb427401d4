//! Batch entry of counseling records into a web advising portal
//!
//! Records are read from CSV, translated into the portal's form codes and
//! submitted one at a time through a [`UiDriver`], in a Playwright-like
//! model of lazy [`Locator`]s over string [`Selector`]s. Each record ends as
//! exactly one [`Outcome`], and a batch ends with a summary and a CSV report.

pub mod config;
pub mod drivers;
pub mod element;
pub mod errors;
pub mod form;
pub mod locator;
pub mod mapper;
pub mod outcome;
pub mod pipeline;
pub mod record;
pub mod selector;
#[cfg(test)]
mod selector_tests;
pub mod session;
pub mod signal;
pub mod verifier;

pub use config::{ConfigError, PortalConfig, PortalSelectors, Timeouts};
pub use drivers::{DriverCall, SaveFeedback, ScriptedDriver, UiDriver};
#[cfg(feature = "browser")]
pub use drivers::{BrowserSettings, CdpDriver};
pub use element::{ElementHandle, WaitState};
pub use errors::AutomationError;
pub use form::{FormError, FormFiller};
pub use locator::Locator;
pub use mapper::{map_record, FieldAction, FieldCodeTable, FieldTarget, FieldValue};
pub use outcome::{BatchSummary, Outcome, OutcomeAggregator, OutcomeStatus, ReportError};
pub use pipeline::{BatchRunner, PipelineError, RecordError, RecordStage};
pub use record::{load_records, read_records, CounselingRecord, LoadError, RecordRow, ValidationError};
pub use selector::Selector;
pub use session::SessionError;
pub use signal::{SignalHub, SignalKind, SignalSubscription, UiSignal};
pub use verifier::{SaveConfirmation, SaveError, SaveVerifier, VerifierState};
