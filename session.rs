//! One reporting session: the latest image analysis waiting for a location,
//! plus every incident submitted so far. Everything here lives only as long
//! as the session object.

use crate::detection::Detector;
use crate::error::{Error, Result};
use crate::location::{self, LocationInput};
use crate::models::{Detection, Incident, IncidentFilter, Sentiment, ThreatAssessment};
use crate::sentiment::SentimentAnalyzer;
use crate::store::IncidentStore;
use crate::{threat, weapons};
use chrono::{Local, NaiveDateTime, Timelike};
use image::DynamicImage;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub detections: Vec<Detection>,
    pub assessment: ThreatAssessment,
    /// Problems that were degraded to an empty result rather than failing.
    pub warnings: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ReportingSession {
    store: IncidentStore,
    pending: Option<Analysis>,
}

impl ReportingSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs detection, weapon classification and threat aggregation, and keeps
    /// the result as the analysis to submit next. A missing or failing
    /// detector yields no detections plus a warning.
    pub fn analyze(&mut self, image: &DynamicImage, detector: Option<&dyn Detector>) -> Analysis {
        let mut warnings = Vec::new();
        let raw = match detector {
            Some(detector) => detector.detect(image).unwrap_or_else(|err| {
                log::warn!("Weapon detection failed: {err}");
                warnings.push(format!("Error in weapon detection: {err}"));
                Vec::new()
            }),
            None => {
                warnings.push("Object detection model is not loaded".to_string());
                Vec::new()
            }
        };
        let detections = weapons::classify(&raw);
        let assessment = threat::assess(&detections);
        log::info!(
            "Analysis found {} weapon(s) among {} objects: {}",
            detections.len(),
            raw.len(),
            assessment.alert_level.plain_label()
        );
        let analysis = Analysis {
            detections,
            assessment,
            warnings,
        };
        self.pending = Some(analysis.clone());
        analysis
    }

    pub fn pending(&self) -> Option<&Analysis> {
        self.pending.as_ref()
    }

    pub fn submit(
        &mut self,
        location: LocationInput,
        notes: Option<String>,
        sentiment: Option<&SentimentAnalyzer>,
    ) -> Result<Incident> {
        let now = Local::now().naive_local();
        self.submit_at(now, location, notes, sentiment)
    }

    /// Turns the pending analysis into an incident stamped `now`. The pending
    /// analysis is consumed only when the incident is recorded.
    pub fn submit_at(
        &mut self,
        now: NaiveDateTime,
        location: LocationInput,
        notes: Option<String>,
        sentiment: Option<&SentimentAnalyzer>,
    ) -> Result<Incident> {
        if self.pending.is_none() {
            return Err(Error::NoPendingAnalysis);
        }
        let location = location::resolve(location)?;
        let analysis = self.pending.take().ok_or(Error::NoPendingAnalysis)?;

        let now = now.with_nanosecond(0).unwrap_or(now);
        let id = format!("INC_{}", now.format("%Y%m%d_%H%M%S"));
        let mut incident = Incident::new(id, now, analysis.detections, location);

        if let Some(notes) = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()) {
            let mood = sentiment.and_then(|analyzer| notes_sentiment(analyzer, &notes));
            incident = incident.with_notes(notes, mood);
        }

        let id = self.store.append(incident);
        self.store
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(id))
    }

    pub fn incidents(&self) -> &[Incident] {
        self.store.all()
    }

    pub fn filter(&self, filter: &IncidentFilter) -> Vec<Incident> {
        self.store.filter(filter)
    }

    pub fn incident(&self, id: &str) -> Result<&Incident> {
        self.store
            .get(id)
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

fn notes_sentiment(analyzer: &SentimentAnalyzer, notes: &str) -> Option<Sentiment> {
    match analyzer.analyze(notes) {
        Ok(sentiment) => Some(sentiment),
        Err(err) => {
            log::warn!("Sentiment analysis failed: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertLevel, BoundingBox, IncidentStatus, RawDetection, Severity};
    use chrono::NaiveDate;

    struct FixedDetector(Vec<RawDetection>);

    impl Detector for FixedDetector {
        fn detect(&self, _image: &DynamicImage) -> Result<Vec<RawDetection>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenDetector;

    impl Detector for BrokenDetector {
        fn detect(&self, _image: &DynamicImage) -> Result<Vec<RawDetection>> {
            Err(Error::Inference("model exploded".into()))
        }
    }

    fn image() -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::new(32, 32))
    }

    fn raw(label: &str, score: f32) -> RawDetection {
        RawDetection {
            label: label.into(),
            score,
            bbox: BoundingBox::default(),
        }
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    #[test]
    fn analysis_then_submit_records_incident() {
        let mut session = ReportingSession::new();
        let detector = FixedDetector(vec![raw("person", 0.99), raw("rifle", 0.91), raw("knife", 0.4)]);
        let analysis = session.analyze(&image(), Some(&detector));
        assert_eq!(analysis.detections.len(), 2);
        assert_eq!(analysis.assessment.alert_level, AlertLevel::Red);
        assert!(analysis.warnings.is_empty());

        let incident = session
            .submit_at(at(14, 3, 9), LocationInput::SimulatedGps, None, None)
            .unwrap();
        assert_eq!(incident.id, "INC_20240601_140309");
        assert_eq!(incident.severity, Severity::SeriousUrgent);
        assert_eq!(incident.status, IncidentStatus::Active);
        assert!(incident.recommendations.starts_with("Immediate dispatch"));
        assert_eq!(session.incidents().len(), 1);
        assert!(session.pending().is_none());
    }

    #[test]
    fn reanalysis_replaces_pending_result() {
        let mut session = ReportingSession::new();
        session.analyze(&image(), Some(&FixedDetector(vec![raw("rifle", 0.95)])));
        session.analyze(&image(), Some(&FixedDetector(vec![raw("stick", 0.7)])));

        let incident = session
            .submit_at(at(8, 30, 0), LocationInput::SimulatedGps, None, None)
            .unwrap();
        assert_eq!(incident.alert_level, AlertLevel::Green);
        assert_eq!(incident.severity, Severity::Low);
        assert_eq!(incident.weapon_names(), vec!["stick"]);
        assert_eq!(session.incidents().len(), 1);
    }

    #[test]
    fn submit_without_analysis_fails() {
        let mut session = ReportingSession::new();
        let err = session
            .submit_at(at(1, 0, 0), LocationInput::SimulatedGps, None, None)
            .unwrap_err();
        assert!(matches!(err, Error::NoPendingAnalysis));
    }

    #[test]
    fn detector_failure_degrades_to_no_threat() {
        let mut session = ReportingSession::new();
        let analysis = session.analyze(&image(), Some(&BrokenDetector));
        assert!(analysis.detections.is_empty());
        assert_eq!(analysis.assessment.risk_assessment, "No immediate threat detected");
        assert_eq!(analysis.warnings.len(), 1);

        let analysis = session.analyze(&image(), None);
        assert!(analysis.detections.is_empty());
        assert!(session.pending().is_some());
    }

    #[test]
    fn bad_location_keeps_pending_analysis() {
        let mut session = ReportingSession::new();
        session.analyze(&image(), Some(&FixedDetector(vec![raw("stone", 0.3)])));
        let bad = LocationInput::Manual {
            county: "Gotham".into(),
            sub_county: String::new(),
            ward: String::new(),
            location: String::new(),
            latitude: 0.0,
            longitude: 0.0,
        };
        assert!(session.submit_at(at(2, 0, 0), bad, None, None).is_err());
        assert!(session.pending().is_some());
    }

    #[test]
    fn same_second_submissions_get_distinct_ids() {
        let mut session = ReportingSession::new();
        let detector = FixedDetector(vec![raw("club", 0.5)]);
        for _ in 0..2 {
            session.analyze(&image(), Some(&detector));
            session
                .submit_at(at(9, 0, 0), LocationInput::SimulatedGps, Some("  ".into()), None)
                .unwrap();
        }
        let ids: Vec<_> = session.incidents().iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["INC_20240601_090000", "INC_20240601_090000_2"]);
        assert!(session.incidents()[0].notes.is_none());
        assert!(session.incident("INC_20240601_090000_2").is_ok());
        assert!(session.incident("nope").is_err());
    }

    #[test]
    fn notes_are_kept_without_a_sentiment_model() {
        let mut session = ReportingSession::new();
        session.analyze(&image(), None);
        let incident = session
            .submit_at(at(10, 0, 0), LocationInput::SimulatedGps, Some("Crowd dispersing".into()), None)
            .unwrap();
        assert_eq!(incident.notes.as_deref(), Some("Crowd dispersing"));
        assert!(incident.notes_sentiment.is_none());
    }
}
