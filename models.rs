use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_with::{serde_as, DeserializeAs, SerializeAs};
use std::fmt;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `NaiveDateTime` as `YYYY-MM-DD HH:MM:SS`, the format shown in reports.
pub struct ReportTimestamp;

impl SerializeAs<NaiveDateTime> for ReportTimestamp {
    fn serialize_as<S>(source: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&source.format(TIMESTAMP_FORMAT))
    }
}

impl<'de> DeserializeAs<'de, NaiveDateTime> for ReportTimestamp {
    fn deserialize_as<D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

/// One object reported by the detector, before weapon classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub label: String,
    pub score: f32,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Risk {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertLevel {
    #[serde(rename = "🔴 Red")]
    Red,
    #[serde(rename = "🟡 Yellow")]
    Yellow,
    #[serde(rename = "🟢 Green")]
    Green,
}

impl AlertLevel {
    pub fn label(self) -> &'static str {
        match self {
            Self::Red => "🔴 Red",
            Self::Yellow => "🟡 Yellow",
            Self::Green => "🟢 Green",
        }
    }

    /// Label without the emoji, for outputs whose fonts cannot draw it.
    pub fn plain_label(self) -> &'static str {
        match self {
            Self::Red => "Red",
            Self::Yellow => "Yellow",
            Self::Green => "Green",
        }
    }

    /// Marker and box color.
    pub fn color_name(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Yellow => "orange",
            Self::Green => "green",
        }
    }

    pub fn rgb(self) -> [u8; 3] {
        match self {
            Self::Red => [255, 0, 0],
            Self::Yellow => [255, 165, 0],
            Self::Green => [0, 128, 0],
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    #[serde(rename = "SERIOUS-URGENT")]
    SeriousUrgent,
    #[serde(rename = "SERIOUS")]
    Serious,
    #[serde(rename = "LOW")]
    Low,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Self::SeriousUrgent => "SERIOUS-URGENT",
            Self::Serious => "SERIOUS",
            Self::Low => "LOW",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A raw detection whose label matched a weapon keyword.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub weapon: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub severity: Severity,
    pub alert_level: AlertLevel,
    pub risk: Risk,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatAssessment {
    pub alert_level: AlertLevel,
    pub severity: Severity,
    pub risk_assessment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub county: String,
    pub sub_county: String,
    pub ward: String,
    /// Free-text area description.
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IncidentStatus {
    #[default]
    Active,
    Resolved,
    #[serde(rename = "Under Investigation")]
    UnderInvestigation,
}

impl IncidentStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Resolved => "Resolved",
            Self::UnderInvestigation => "Under Investigation",
        }
    }
}

impl fmt::Display for IncidentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: String,
    pub score: f32,
}

#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    #[serde_as(as = "ReportTimestamp")]
    pub timestamp: NaiveDateTime,
    pub detected_weapons: Vec<Detection>,
    pub alert_level: AlertLevel,
    pub severity: Severity,
    pub risk_assessment: String,
    pub location: Location,
    pub status: IncidentStatus,
    pub recommendations: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes_sentiment: Option<Sentiment>,
}

impl Incident {
    /// Builds an active incident; the alert fields and recommendation are
    /// always derived from `detections`.
    pub fn new(
        id: String,
        timestamp: NaiveDateTime,
        detections: Vec<Detection>,
        location: Location,
    ) -> Self {
        let mut incident = Self {
            id,
            timestamp,
            detected_weapons: detections,
            alert_level: AlertLevel::Green,
            severity: Severity::Low,
            risk_assessment: String::new(),
            location,
            status: IncidentStatus::Active,
            recommendations: String::new(),
            notes: None,
            notes_sentiment: None,
        };
        incident.apply_assessment();
        incident
    }

    fn apply_assessment(&mut self) {
        let assessment = crate::threat::assess(&self.detected_weapons);
        self.alert_level = assessment.alert_level;
        self.severity = assessment.severity;
        self.risk_assessment = assessment.risk_assessment;
        self.recommendations = crate::threat::recommendations(assessment.severity).to_string();
    }

    /// Recomputes every alert field from the weapon table, keeping status and
    /// notes. Fails on a weapon the table does not know.
    pub fn rederived(mut self) -> crate::error::Result<Self> {
        for detection in &mut self.detected_weapons {
            let profile = crate::weapons::lookup(&detection.weapon).ok_or_else(|| {
                crate::error::Error::Validation(format!(
                    "Incident {} lists unknown weapon '{}'",
                    self.id, detection.weapon
                ))
            })?;
            detection.severity = profile.severity;
            detection.alert_level = profile.alert_level;
            detection.risk = profile.risk;
        }
        self.apply_assessment();
        Ok(self)
    }

    pub fn with_notes(mut self, notes: String, sentiment: Option<Sentiment>) -> Self {
        self.notes = Some(notes);
        self.notes_sentiment = sentiment;
        self
    }

    pub fn weapon_names(&self) -> Vec<&str> {
        self.detected_weapons.iter().map(|d| d.weapon.as_str()).collect()
    }
}

/// History-page filter; `None` means "All".
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IncidentFilter {
    pub county: Option<String>,
    pub severity: Option<Severity>,
    pub status: Option<IncidentStatus>,
}

impl IncidentFilter {
    pub fn matches(&self, incident: &Incident) -> bool {
        self.county
            .as_ref()
            .map_or(true, |county| &incident.location.county == county)
            && self.severity.map_or(true, |s| incident.severity == s)
            && self.status.map_or(true, |s| incident.status == s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn nairobi() -> Location {
        Location {
            county: "Nairobi".into(),
            sub_county: "Westlands".into(),
            ward: "Parklands".into(),
            location: "Nairobi CBD".into(),
            latitude: -1.2921,
            longitude: 36.8219,
        }
    }

    #[test]
    fn incident_serializes_with_report_field_names() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 5, 0)
            .unwrap();
        let incident = Incident::new("INC_20240301_090500".into(), ts, Vec::new(), nairobi());
        let value = serde_json::to_value(&incident).unwrap();
        assert_eq!(value["timestamp"], "2024-03-01 09:05:00");
        assert_eq!(value["alert_level"], "🟢 Green");
        assert_eq!(value["severity"], "LOW");
        assert_eq!(value["status"], "Active");
        assert_eq!(value["location"]["sub_county"], "Westlands");
        assert!(value.get("notes").is_none());
    }

    #[test]
    fn status_and_box_use_display_names() {
        let status = serde_json::to_string(&IncidentStatus::UnderInvestigation).unwrap();
        assert_eq!(status, "\"Under Investigation\"");
        let raw: RawDetection = serde_json::from_str(
            r#"{"label":"knife","score":0.4,"box":{"xmin":1,"ymin":2,"xmax":3,"ymax":4}}"#,
        )
        .unwrap();
        assert_eq!(raw.bbox.xmax, 3.0);
    }

    #[test]
    fn filter_combines_criteria() {
        let ts = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let incident = Incident::new("INC_1".into(), ts, Vec::new(), nairobi());
        let mut filter = IncidentFilter::default();
        assert!(filter.matches(&incident));
        filter.county = Some("Nairobi".into());
        filter.severity = Some(Severity::Low);
        assert!(filter.matches(&incident));
        filter.status = Some(IncidentStatus::Resolved);
        assert!(!filter.matches(&incident));
    }
}
