//! Weapon keyword table and the classifier that maps raw detector labels onto it.

use crate::models::{AlertLevel, Detection, RawDetection, Risk, Severity};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeaponProfile {
    pub keyword: &'static str,
    pub severity: Severity,
    pub alert_level: AlertLevel,
    pub risk: Risk,
}

const fn profile(keyword: &'static str, risk: Risk) -> WeaponProfile {
    let (severity, alert_level) = match risk {
        Risk::High => (Severity::SeriousUrgent, AlertLevel::Red),
        Risk::Medium => (Severity::Serious, AlertLevel::Yellow),
        Risk::Low => (Severity::Low, AlertLevel::Green),
    };
    WeaponProfile {
        keyword,
        severity,
        alert_level,
        risk,
    }
}

/// Matched in this order; the first keyword found in a label wins.
pub static WEAPON_TABLE: [WeaponProfile; 10] = [
    profile("gun", Risk::High),
    profile("pistol", Risk::High),
    profile("rifle", Risk::High),
    profile("knife", Risk::Medium),
    profile("machete", Risk::Medium),
    profile("sword", Risk::Medium),
    profile("stick", Risk::Low),
    profile("stone", Risk::Low),
    profile("club", Risk::Low),
    profile("baseball bat", Risk::Low),
];

pub fn lookup(keyword: &str) -> Option<&'static WeaponProfile> {
    WEAPON_TABLE.iter().find(|p| p.keyword == keyword)
}

/// Finds the weapon profile whose keyword occurs in `label`, ignoring case.
pub fn match_label(label: &str) -> Option<&'static WeaponProfile> {
    let label = label.to_lowercase();
    WEAPON_TABLE.iter().find(|p| label.contains(p.keyword))
}

/// Emits one detection per raw item whose label names a weapon. Every match is
/// kept regardless of score, and overlapping boxes are not merged.
pub fn classify(raw: &[RawDetection]) -> Vec<Detection> {
    raw.iter()
        .filter_map(|item| {
            let profile = match_label(&item.label)?;
            Some(Detection {
                weapon: profile.keyword.to_string(),
                confidence: item.score,
                bbox: item.bbox,
                severity: profile.severity,
                alert_level: profile.alert_level,
                risk: profile.risk,
            })
        })
        .collect()
}
