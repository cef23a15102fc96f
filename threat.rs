use crate::models::{AlertLevel, Detection, Risk, Severity, ThreatAssessment};

pub const NO_THREAT: &str = "No immediate threat detected";
const HIGH_RISK: &str = "Immediate action required - High-risk weapons detected";
const MEDIUM_RISK: &str = "Caution advised - Medium-risk weapons detected";
const LOW_RISK: &str = "Monitor situation - Low-risk items detected";

/// Reduces detections to one overall assessment, High > Medium > Low.
pub fn assess(detections: &[Detection]) -> ThreatAssessment {
    let (alert_level, severity, text) = match detections.iter().map(|d| d.risk).max() {
        None => (AlertLevel::Green, Severity::Low, NO_THREAT),
        Some(Risk::High) => (AlertLevel::Red, Severity::SeriousUrgent, HIGH_RISK),
        Some(Risk::Medium) => (AlertLevel::Yellow, Severity::Serious, MEDIUM_RISK),
        Some(Risk::Low) => (AlertLevel::Green, Severity::Low, LOW_RISK),
    };
    ThreatAssessment {
        alert_level,
        severity,
        risk_assessment: text.to_string(),
    }
}

pub fn recommendations(severity: Severity) -> &'static str {
    match severity {
        Severity::SeriousUrgent => "Immediate dispatch of armed response unit. Establish perimeter. Evacuate civilians if necessary. Contact emergency services.",
        Severity::Serious => "Dispatch patrol unit for investigation. Increase surveillance in the area. Consider community alert.",
        Severity::Low => "Monitor situation. Routine patrol check recommended. Document for trend analysis.",
    }
}
