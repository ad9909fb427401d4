//! Counseling records and the CSV source they are read from.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Input column names, as they appear in the header row.
pub mod columns {
    pub const STUDENT_ID: &str = "학번";
    pub const STUDENT_NAME: &str = "이름";
    pub const DATE: &str = "상담일자";
    pub const CONTENT: &str = "상담내용";
    pub const HOUR: &str = "상담시간_시";
    pub const MINUTE: &str = "상담시간_분";
    pub const CATEGORY: &str = "상담분야";
    pub const MODE: &str = "상담구분";
    pub const TITLE: &str = "제목";
    pub const CAREER_STATUS: &str = "진로상태";
    pub const EMPLOYMENT_STATUS: &str = "취업상태";
    pub const STUDY_STATUS: &str = "학습상태";
    pub const MENTAL_STATUS: &str = "심리상태";
    pub const REFERRAL: &str = "전문상담의뢰";
    pub const PRIVACY: &str = "비공개설정";

    pub const REQUIRED: [&str; 4] = [STUDENT_ID, STUDENT_NAME, DATE, CONTENT];
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("required field '{column}' is missing")]
    MissingField { column: &'static str },

    #[error("field '{column}' has invalid value '{value}': {reason}")]
    InvalidValue {
        column: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to open record source {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("Malformed CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Required columns are missing: {0:?}")]
    MissingColumns(Vec<String>),
}

/// One counseling entry to submit. Optional fields stay `None` when the cell
/// is blank; the portal's own default then applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounselingRecord {
    pub student_id: String,
    pub student_name: String,
    pub date: String,
    pub content: String,
    pub title: Option<String>,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub category: Option<String>,
    /// Individual vs. group counseling, as written in the source
    pub mode: Option<String>,
    pub career_status: Option<String>,
    pub employment_status: Option<String>,
    pub study_status: Option<String>,
    pub mental_status: Option<String>,
    pub referral: Option<String>,
    pub privacy: Option<String>,
}

impl CounselingRecord {
    /// Build a record from `column -> cell` pairs. Cells are trimmed and blank
    /// cells count as absent.
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, ValidationError> {
        let get = |column: &str| -> Option<String> {
            fields
                .get(column)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };
        let required = |column: &'static str| -> Result<String, ValidationError> {
            get(column).ok_or(ValidationError::MissingField { column })
        };

        Ok(Self {
            student_id: required(columns::STUDENT_ID)?,
            student_name: required(columns::STUDENT_NAME)?,
            date: required(columns::DATE)?,
            content: required(columns::CONTENT)?,
            title: get(columns::TITLE),
            hour: parse_clock(columns::HOUR, get(columns::HOUR), 23)?,
            minute: parse_clock(columns::MINUTE, get(columns::MINUTE), 59)?,
            category: get(columns::CATEGORY),
            mode: get(columns::MODE),
            career_status: get(columns::CAREER_STATUS),
            employment_status: get(columns::EMPLOYMENT_STATUS),
            study_status: get(columns::STUDY_STATUS),
            mental_status: get(columns::MENTAL_STATUS),
            referral: get(columns::REFERRAL),
            privacy: get(columns::PRIVACY),
        })
    }
}

/// Accepts whole numbers, including spreadsheet exports like "9.0".
fn parse_clock(
    column: &'static str,
    raw: Option<String>,
    max: u32,
) -> Result<Option<u32>, ValidationError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let invalid = |reason: &str| ValidationError::InvalidValue {
        column,
        value: raw.clone(),
        reason: reason.to_string(),
    };

    let value = match raw.parse::<u32>() {
        Ok(v) => v,
        Err(_) => match raw.parse::<f64>() {
            Ok(f) if f.fract() == 0.0 && f >= 0.0 && f <= max as f64 => f as u32,
            Ok(_) => return Err(invalid("not a whole number in range")),
            Err(_) => return Err(invalid("not a number")),
        },
    };
    if value > max {
        return Err(invalid(&format!("must be at most {max}")));
    }
    Ok(Some(value))
}

/// One row of the source, in source order. Rows that fail validation are
/// kept so the batch can report them.
#[derive(Debug, Clone)]
pub struct RecordRow {
    /// 1-based position in the source
    pub index: usize,
    pub student_id: String,
    pub student_name: String,
    pub record: Result<CounselingRecord, ValidationError>,
}

impl RecordRow {
    pub fn valid(index: usize, record: CounselingRecord) -> Self {
        Self {
            index,
            student_id: record.student_id.clone(),
            student_name: record.student_name.clone(),
            record: Ok(record),
        }
    }

    pub fn from_fields(index: usize, fields: &HashMap<String, String>) -> Self {
        let label = |column: &str| {
            fields
                .get(column)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .unwrap_or("Unknown")
                .to_string()
        };
        Self {
            index,
            student_id: label(columns::STUDENT_ID),
            student_name: label(columns::STUDENT_NAME),
            record: CounselingRecord::from_fields(fields),
        }
    }
}

pub fn load_records(path: &Path) -> Result<Vec<RecordRow>, LoadError> {
    let file = std::fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let rows = read_records(file)?;
    info!(
        path = %path.display(),
        rows = rows.len(),
        "Loaded counseling records"
    );
    Ok(rows)
}

pub fn read_records<R: io::Read>(reader: R) -> Result<Vec<RecordRow>, LoadError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let missing: Vec<String> = columns::REQUIRED
        .iter()
        .filter(|c| !headers.iter().any(|h| h == *c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::MissingColumns(missing));
    }

    let mut rows = Vec::new();
    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let fields: HashMap<String, String> = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        rows.push(RecordRow::from_fields(i + 1, &fields));
    }

    for column in columns::REQUIRED {
        let blanks = rows
            .iter()
            .filter(|row| {
                matches!(&row.record, Err(ValidationError::MissingField { column: c }) if *c == column)
            })
            .count();
        if blanks > 0 {
            warn!(column, blanks, "Required column has blank cells");
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "학번,이름,상담일자,상담내용,상담시간_시,상담시간_분,제목,비고";

    #[test]
    fn test_reads_rows_in_order_and_ignores_unknown_columns() {
        let csv = format!(
            "{HEADER}\n20230001,김하나,2024-03-02,진로 상담,14,30,첫 상담,x\n20230002,이둘,2024-03-03,학습 상담,,,,\n"
        );
        let rows = read_records(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);

        let first = rows[0].record.as_ref().unwrap();
        assert_eq!(rows[0].index, 1);
        assert_eq!(first.student_id, "20230001");
        assert_eq!(first.hour, Some(14));
        assert_eq!(first.minute, Some(30));
        assert_eq!(first.title.as_deref(), Some("첫 상담"));

        let second = rows[1].record.as_ref().unwrap();
        assert_eq!(rows[1].index, 2);
        assert_eq!(second.hour, None);
        assert_eq!(second.title, None);
    }

    #[test]
    fn test_missing_required_column_fails_load() {
        let csv = "학번,이름,상담일자\n1,a,2024-01-01\n";
        match read_records(csv.as_bytes()) {
            Err(LoadError::MissingColumns(cols)) => assert_eq!(cols, vec!["상담내용".to_string()]),
            other => panic!("expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn test_blank_required_cell_is_a_row_level_validation_error() {
        let csv = format!("{HEADER}\n20230003,박셋,2024-03-04,,,,,\n");
        let rows = read_records(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].student_id, "20230003");
        assert_eq!(rows[0].student_name, "박셋");
        assert_eq!(
            rows[0].record,
            Err(ValidationError::MissingField { column: "상담내용" })
        );
    }

    #[test]
    fn test_blank_id_reports_unknown_label() {
        let csv = format!("{HEADER}\n,,2024-03-04,내용,,,,\n");
        let rows = read_records(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].student_id, "Unknown");
        assert!(rows[0].record.is_err());
    }

    #[test]
    fn test_spreadsheet_float_hours_and_bad_values() {
        assert_eq!(parse_clock("h", Some("9.0".into()), 23), Ok(Some(9)));
        assert_eq!(parse_clock("h", Some("09".into()), 23), Ok(Some(9)));
        assert!(parse_clock("h", Some("9.5".into()), 23).is_err());
        assert!(parse_clock("h", Some("24".into()), 23).is_err());
        assert!(parse_clock("h", Some("오후".into()), 23).is_err());
        assert_eq!(parse_clock("h", None, 23), Ok(None));
    }

    #[test]
    fn test_bom_prefixed_header_is_recognized() {
        let csv = format!("\u{feff}{HEADER}\n1,a,2024-01-01,c,,,,\n");
        let rows = read_records(csv.as_bytes()).unwrap();
        assert!(rows[0].record.is_ok());
    }

    #[test]
    fn test_load_records_reports_missing_file() {
        let err = load_records(Path::new("/definitely/not/here.csv")).unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }
}
