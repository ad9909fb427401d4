//! Pure translation of a [`CounselingRecord`] into the portal's controls and codes.
//!
//! Unrecognized status or yes/no text never fails a record; it resolves to the
//! table's default code so one malformed cell cannot abort a batch.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::record::{columns, CounselingRecord};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FieldCodeTable {
    /// Status level text -> code
    pub status_codes: BTreeMap<String, String>,
    /// Code for any status text not in `status_codes`
    pub status_default: String,
    /// Affirmative spellings, compared after trimming and upper-casing
    pub affirmatives: Vec<String>,
    pub affirmative_code: String,
    pub negative_code: String,
    /// Exact text marking group counseling
    pub group_marker: String,
    pub group_code: String,
    pub individual_code: String,
    /// Privacy cell value that turns the private toggle on
    pub privacy_marker: String,
}

impl Default for FieldCodeTable {
    fn default() -> Self {
        let status_codes = [("일반", "1"), ("관심", "2"), ("중점", "3")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self {
            status_codes,
            status_default: "1".to_string(),
            affirmatives: vec!["Y".to_string(), "예".to_string(), "1".to_string()],
            affirmative_code: "1".to_string(),
            negative_code: "2".to_string(),
            group_marker: "집단상담".to_string(),
            group_code: "2".to_string(),
            individual_code: "1".to_string(),
            privacy_marker: "Y".to_string(),
        }
    }
}

impl FieldCodeTable {
    pub fn status_code(&self, text: &str) -> &str {
        self.status_codes
            .get(text.trim())
            .unwrap_or(&self.status_default)
    }

    pub fn yes_no_code(&self, text: &str) -> &str {
        let normalized = text.trim().to_uppercase();
        if self
            .affirmatives
            .iter()
            .any(|a| a.to_uppercase() == normalized)
        {
            &self.affirmative_code
        } else {
            &self.negative_code
        }
    }

    pub fn mode_code(&self, text: &str) -> &str {
        if text.trim() == self.group_marker {
            &self.group_code
        } else {
            &self.individual_code
        }
    }

    pub fn privacy_enabled(&self, text: &str) -> bool {
        text.trim().to_uppercase() == self.privacy_marker.to_uppercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusDimension {
    Career,
    Employment,
    Study,
    Mental,
}

impl StatusDimension {
    pub const ALL: [StatusDimension; 4] = [
        StatusDimension::Career,
        StatusDimension::Employment,
        StatusDimension::Study,
        StatusDimension::Mental,
    ];

    /// Radio group name on the entry form
    pub fn control(&self) -> &'static str {
        match self {
            StatusDimension::Career => "P",
            StatusDimension::Employment => "J",
            StatusDimension::Study => "C",
            StatusDimension::Mental => "M",
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            StatusDimension::Career => columns::CAREER_STATUS,
            StatusDimension::Employment => columns::EMPLOYMENT_STATUS,
            StatusDimension::Study => columns::STUDY_STATUS,
            StatusDimension::Mental => columns::MENTAL_STATUS,
        }
    }

    fn value<'a>(&self, record: &'a CounselingRecord) -> Option<&'a str> {
        match self {
            StatusDimension::Career => record.career_status.as_deref(),
            StatusDimension::Employment => record.employment_status.as_deref(),
            StatusDimension::Study => record.study_status.as_deref(),
            StatusDimension::Mental => record.mental_status.as_deref(),
        }
    }
}

/// A control on the entry form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldTarget {
    Date,
    Hour,
    Minute,
    Category,
    /// Individual vs. group
    Mode,
    Title,
    Content,
    Status(StatusDimension),
    Referral,
    Privacy,
}

impl FieldTarget {
    /// The portal's name for the control
    pub fn control(&self) -> &'static str {
        match self {
            FieldTarget::Date => "Pdate",
            FieldTarget::Hour => "Hour",
            FieldTarget::Minute => "Min",
            FieldTarget::Category => "Cntype",
            FieldTarget::Mode => "CnPer",
            FieldTarget::Title => "Title",
            FieldTarget::Content => "Content",
            FieldTarget::Status(dimension) => dimension.control(),
            FieldTarget::Referral => "CounReq",
            FieldTarget::Privacy => "Private",
        }
    }
}

impl fmt::Display for FieldTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.control())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Typed into an input or textarea
    Text(String),
    /// Chosen from a `<select>` by its visible label
    SelectLabel(String),
    /// A coded radio value
    Choice(String),
    /// Checkbox state to ensure; `false` leaves the portal default alone
    Toggle(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldAction {
    pub target: FieldTarget,
    pub value: FieldValue,
}

impl FieldAction {
    fn new(target: FieldTarget, value: FieldValue) -> Self {
        Self { target, value }
    }
}

/// Ordered actions for one record: date, hour, minute, category, mode, title,
/// content, the four statuses, referral, privacy. Absent fields are skipped.
pub fn map_record(record: &CounselingRecord, codes: &FieldCodeTable) -> Vec<FieldAction> {
    let mut actions = vec![FieldAction::new(
        FieldTarget::Date,
        FieldValue::Text(record.date.clone()),
    )];

    if let Some(hour) = record.hour {
        actions.push(FieldAction::new(
            FieldTarget::Hour,
            FieldValue::Text(hour.to_string()),
        ));
    }
    if let Some(minute) = record.minute {
        actions.push(FieldAction::new(
            FieldTarget::Minute,
            FieldValue::Text(minute.to_string()),
        ));
    }
    if let Some(category) = &record.category {
        actions.push(FieldAction::new(
            FieldTarget::Category,
            FieldValue::SelectLabel(category.clone()),
        ));
    }
    if let Some(mode) = &record.mode {
        actions.push(FieldAction::new(
            FieldTarget::Mode,
            FieldValue::Choice(codes.mode_code(mode).to_string()),
        ));
    }
    if let Some(title) = &record.title {
        actions.push(FieldAction::new(
            FieldTarget::Title,
            FieldValue::Text(title.clone()),
        ));
    }
    actions.push(FieldAction::new(
        FieldTarget::Content,
        FieldValue::Text(record.content.clone()),
    ));

    for dimension in StatusDimension::ALL {
        if let Some(status) = dimension.value(record) {
            actions.push(FieldAction::new(
                FieldTarget::Status(dimension),
                FieldValue::Choice(codes.status_code(status).to_string()),
            ));
        }
    }

    if let Some(referral) = &record.referral {
        actions.push(FieldAction::new(
            FieldTarget::Referral,
            FieldValue::Choice(codes.yes_no_code(referral).to_string()),
        ));
    }
    if let Some(privacy) = &record.privacy {
        actions.push(FieldAction::new(
            FieldTarget::Privacy,
            FieldValue::Toggle(codes.privacy_enabled(privacy)),
        ));
    }

    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> CounselingRecord {
        CounselingRecord {
            student_id: "20230001".into(),
            student_name: "김하나".into(),
            date: "2024-03-02".into(),
            content: "진로 상담".into(),
            ..Default::default()
        }
    }

    fn full() -> CounselingRecord {
        CounselingRecord {
            title: Some("첫 상담".into()),
            hour: Some(14),
            minute: Some(5),
            category: Some("진로".into()),
            mode: Some("집단상담".into()),
            career_status: Some("관심".into()),
            employment_status: Some("중점".into()),
            study_status: Some("일반".into()),
            mental_status: Some("모름".into()),
            referral: Some("y".into()),
            privacy: Some("Y".into()),
            ..minimal()
        }
    }

    fn targets(actions: &[FieldAction]) -> Vec<FieldTarget> {
        actions.iter().map(|a| a.target).collect()
    }

    #[test]
    fn test_absent_fields_produce_no_actions() {
        let actions = map_record(&minimal(), &FieldCodeTable::default());
        assert_eq!(targets(&actions), vec![FieldTarget::Date, FieldTarget::Content]);
    }

    #[test]
    fn test_every_present_field_maps_once_in_fixed_order() {
        let actions = map_record(&full(), &FieldCodeTable::default());
        assert_eq!(
            targets(&actions),
            vec![
                FieldTarget::Date,
                FieldTarget::Hour,
                FieldTarget::Minute,
                FieldTarget::Category,
                FieldTarget::Mode,
                FieldTarget::Title,
                FieldTarget::Content,
                FieldTarget::Status(StatusDimension::Career),
                FieldTarget::Status(StatusDimension::Employment),
                FieldTarget::Status(StatusDimension::Study),
                FieldTarget::Status(StatusDimension::Mental),
                FieldTarget::Referral,
                FieldTarget::Privacy,
            ]
        );
        assert_eq!(actions[1].value, FieldValue::Text("14".into()));
        assert_eq!(actions[2].value, FieldValue::Text("5".into()));
        assert_eq!(actions[3].value, FieldValue::SelectLabel("진로".into()));
        assert_eq!(actions[4].value, FieldValue::Choice("2".into()));
        assert_eq!(actions[7].value, FieldValue::Choice("2".into()));
        assert_eq!(actions[8].value, FieldValue::Choice("3".into()));
        assert_eq!(actions[9].value, FieldValue::Choice("1".into()));
        assert_eq!(actions[12].value, FieldValue::Toggle(true));
    }

    #[test]
    fn test_unrecognized_status_falls_back_to_default_code() {
        let codes = FieldCodeTable::default();
        for text in ["모름", "", "GENERAL", "일 반"] {
            assert_eq!(codes.status_code(text), "1", "status {text:?}");
        }
        let actions = map_record(&full(), &codes);
        assert_eq!(actions[10].value, FieldValue::Choice("1".into()));
    }

    #[test]
    fn test_only_the_group_marker_maps_to_group_code() {
        let codes = FieldCodeTable::default();
        assert_eq!(codes.mode_code("집단상담"), "2");
        assert_eq!(codes.mode_code(" 집단상담 "), "2");
        for text in ["개인상담", "집단", "2", ""] {
            assert_eq!(codes.mode_code(text), "1", "mode {text:?}");
        }
    }

    #[test]
    fn test_referral_affirmative_variants() {
        let codes = FieldCodeTable::default();
        for text in ["Y", "y", " y ", "예", "1"] {
            assert_eq!(codes.yes_no_code(text), "1", "referral {text:?}");
        }
        for text in ["N", "아니오", "0", "yes", ""] {
            assert_eq!(codes.yes_no_code(text), "2", "referral {text:?}");
        }
    }

    #[test]
    fn test_privacy_other_values_keep_default() {
        let record = CounselingRecord {
            privacy: Some("N".into()),
            ..minimal()
        };
        let actions = map_record(&record, &FieldCodeTable::default());
        assert_eq!(
            actions.last().map(|a| &a.value),
            Some(&FieldValue::Toggle(false))
        );
    }

    #[test]
    fn test_mapping_is_deterministic() {
        let codes = FieldCodeTable::default();
        assert_eq!(map_record(&full(), &codes), map_record(&full(), &codes));
    }
}
