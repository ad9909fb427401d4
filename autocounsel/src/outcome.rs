//! Per-record results and the batch report built from them.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutcomeStatus {
    Success,
    /// A validation or interaction failure scoped to the record
    Failed,
    /// Anything unexpected
    Error,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeStatus::Success => "SUCCESS",
            OutcomeStatus::Failed => "FAILED",
            OutcomeStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The final result of one record. Field order is the report's column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub index: usize,
    pub student_id: String,
    pub student_name: String,
    pub status: OutcomeStatus,
    pub error_message: String,
    pub timestamp: String,
}

impl Outcome {
    pub fn new(
        index: usize,
        student_id: impl Into<String>,
        student_name: impl Into<String>,
        status: OutcomeStatus,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            index,
            student_id: student_id.into(),
            student_name: student_name.into(),
            status,
            error_message: error_message.into(),
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
        }
    }

    pub fn success(index: usize, student_id: &str, student_name: &str) -> Self {
        Self::new(index, student_id, student_name, OutcomeStatus::Success, "")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errored: usize,
    pub success_rate: f64,
    pub failure_rate: f64,
    pub error_rate: f64,
    /// Non-SUCCESS outcomes in source order
    pub problems: Vec<Outcome>,
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to encode report: {0}")]
    Csv(#[from] csv::Error),
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(50);
        writeln!(f, "{rule}")?;
        writeln!(f, "Batch summary")?;
        writeln!(f, "{rule}")?;
        writeln!(f, "Total:   {}", self.total)?;
        writeln!(f, "Success: {} ({:.1}%)", self.succeeded, self.success_rate)?;
        writeln!(f, "Failed:  {} ({:.1}%)", self.failed, self.failure_rate)?;
        writeln!(f, "Error:   {} ({:.1}%)", self.errored, self.error_rate)?;

        if self.problems.is_empty() {
            return Ok(());
        }
        writeln!(f, "{}", "-".repeat(50))?;
        writeln!(f, "Records needing attention:")?;
        for outcome in &self.problems {
            let marker = match outcome.status {
                OutcomeStatus::Failed => "✗",
                _ => "!",
            };
            writeln!(
                f,
                "  {marker} [{}] {}({}): {}",
                outcome.index, outcome.student_name, outcome.student_id, outcome.error_message
            )?;
        }
        Ok(())
    }
}

/// Collects outcomes for one run, in the order they were finalized.
#[derive(Debug, Default)]
pub struct OutcomeAggregator {
    outcomes: Vec<Outcome>,
}

impl OutcomeAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, outcome: Outcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn summary(&self) -> BatchSummary {
        let count = |status| self.outcomes.iter().filter(|o| o.status == status).count();
        let total = self.outcomes.len();
        let succeeded = count(OutcomeStatus::Success);
        let failed = count(OutcomeStatus::Failed);
        let errored = count(OutcomeStatus::Error);
        BatchSummary {
            total,
            succeeded,
            failed,
            errored,
            success_rate: percent(succeeded, total),
            failure_rate: percent(failed, total),
            error_rate: percent(errored, total),
            problems: self
                .outcomes
                .iter()
                .filter(|o| o.status != OutcomeStatus::Success)
                .cloned()
                .collect(),
        }
    }

    pub fn render_summary(&self) -> String {
        self.summary().to_string()
    }

    /// Write `autocounsel_report_<YYYYmmdd_HHMMSS>.csv` into `dir` and return
    /// its path.
    pub fn write_report(&self, dir: &Path, now: DateTime<Local>) -> Result<PathBuf, ReportError> {
        let path = dir.join(report_file_name(now));
        let io_err = |source| ReportError::Io {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(dir).map_err(io_err)?;
        let mut file = std::fs::File::create(&path).map_err(io_err)?;
        file.write_all(UTF8_BOM).map_err(io_err)?;

        let mut writer = csv::Writer::from_writer(file);
        for outcome in &self.outcomes {
            writer.serialize(outcome)?;
        }
        // no rows still gets a header
        if self.outcomes.is_empty() {
            writer.write_record([
                "index",
                "student_id",
                "student_name",
                "status",
                "error_message",
                "timestamp",
            ])?;
        }
        writer.flush().map_err(io_err)?;

        info!(path = %path.display(), rows = self.outcomes.len(), "Report written");
        Ok(path)
    }
}

pub fn report_file_name(now: DateTime<Local>) -> String {
    format!("autocounsel_report_{}.csv", now.format("%Y%m%d_%H%M%S"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample() -> OutcomeAggregator {
        let mut agg = OutcomeAggregator::new();
        agg.push(Outcome::success(1, "20230001", "김하나"));
        agg.push(Outcome::new(
            2,
            "20230002",
            "이둘",
            OutcomeStatus::Failed,
            "required field '상담내용' is missing",
        ));
        agg.push(Outcome::success(3, "20230003", "박셋"));
        agg
    }

    #[test]
    fn test_summary_counts_and_rates() {
        let summary = sample().summary();
        assert_eq!(summary.total, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.errored, 0);
        assert_eq!(format!("{:.1}", summary.success_rate), "66.7");
        assert_eq!(format!("{:.1}", summary.failure_rate), "33.3");
        assert_eq!(summary.problems.len(), 1);
        assert_eq!(summary.problems[0].index, 2);
    }

    #[test]
    fn test_empty_batch_has_zero_rates() {
        let summary = OutcomeAggregator::new().summary();
        assert_eq!(summary.total, 0);
        assert_eq!(summary.success_rate, 0.0);
        assert!(OutcomeAggregator::new().render_summary().contains("(0.0%)"));
    }

    #[test]
    fn test_render_marks_failed_and_error_differently() {
        let mut agg = sample();
        agg.push(Outcome::new(
            4,
            "20230004",
            "최넷",
            OutcomeStatus::Error,
            "unexpected error: boom",
        ));
        let text = agg.render_summary();
        assert!(text.contains("✗ [2] 이둘(20230002)"), "{text}");
        assert!(text.contains("! [4] 최넷(20230004): unexpected error: boom"), "{text}");
        assert!(text.contains("Success: 2 (50.0%)"), "{text}");
    }

    #[test]
    fn test_clean_batch_summary_has_no_attention_section() {
        let mut agg = OutcomeAggregator::new();
        agg.push(Outcome::success(1, "20230001", "김하나"));
        let summary = agg.summary();
        let text = summary.to_string();
        assert_eq!(text, agg.render_summary());
        assert!(text.contains("Success: 1 (100.0%)"), "{text}");
        assert!(!text.contains("Records needing attention"), "{text}");
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_report_file_has_bom_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let now = Local.with_ymd_and_hms(2024, 3, 2, 14, 5, 9).unwrap();
        let path = sample().write_report(dir.path(), now).unwrap();

        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "autocounsel_report_20240302_140509.csv"
        );
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("index,student_id,student_name,status,error_message,timestamp")
        );
        let second: Vec<_> = text.lines().nth(2).unwrap().split(',').collect();
        assert_eq!(second[0], "2");
        assert_eq!(second[3], "FAILED");
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_empty_report_still_has_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = OutcomeAggregator::new()
            .write_report(dir.path(), Local::now())
            .unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.trim_start_matches('\u{feff}').starts_with("index,"));
    }
}
