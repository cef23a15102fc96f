//! Dashboard and map data. The web view draws the charts and markers; this
//! module only shapes incidents into what it needs.

use crate::location::{NAIROBI_LATITUDE, NAIROBI_LONGITUDE};
use crate::models::{AlertLevel, Incident, IncidentStatus, Severity, TIMESTAMP_FORMAT};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountEntry {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct IncidentRow {
    pub id: String,
    pub timestamp: String,
    pub alert_level: AlertLevel,
    pub severity: Severity,
    pub status: IncidentStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub total: usize,
    pub high_risk: usize,
    pub medium_risk: usize,
    pub low_risk: usize,
    /// Pie chart slices, in order of first appearance.
    pub alert_distribution: Vec<CountEntry>,
    /// Bar chart bars, in order of first appearance.
    pub county_distribution: Vec<CountEntry>,
    pub recent: Vec<IncidentRow>,
}

impl DashboardSummary {
    pub fn from_incidents(incidents: &[Incident]) -> Self {
        let count_level = |level: AlertLevel| {
            incidents
                .iter()
                .filter(|i| i.alert_level == level)
                .count()
        };
        Self {
            total: incidents.len(),
            high_risk: count_level(AlertLevel::Red),
            medium_risk: count_level(AlertLevel::Yellow),
            low_risk: count_level(AlertLevel::Green),
            alert_distribution: tally(incidents.iter().map(|i| i.alert_level.label())),
            county_distribution: tally(incidents.iter().map(|i| i.location.county.as_str())),
            recent: incidents
                .iter()
                .map(|i| IncidentRow {
                    id: i.id.clone(),
                    timestamp: i.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    alert_level: i.alert_level,
                    severity: i.severity,
                    status: i.status,
                })
                .collect(),
        }
    }
}

fn tally<'a>(names: impl Iterator<Item = &'a str>) -> Vec<CountEntry> {
    let mut out: Vec<CountEntry> = Vec::new();
    for name in names {
        match out.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.count += 1,
            None => out.push(CountEntry {
                name: name.to_string(),
                count: 1,
            }),
        }
    }
    out
}

#[derive(Debug, Clone, Serialize)]
pub struct MapMarker {
    pub latitude: f64,
    pub longitude: f64,
    pub radius: u32,
    pub color: &'static str,
    pub popup: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MapView {
    pub center: [f64; 2],
    pub zoom: u8,
    pub markers: Vec<MapMarker>,
}

impl MapView {
    /// `None` when there is nothing to plot.
    pub fn from_incidents(incidents: &[Incident]) -> Option<Self> {
        if incidents.is_empty() {
            return None;
        }
        let markers = incidents
            .iter()
            .map(|i| MapMarker {
                latitude: i.location.latitude,
                longitude: i.location.longitude,
                radius: 8,
                color: i.alert_level.color_name(),
                popup: format!(
                    "ID: {}<br>Alert: {}<br>Time: {}",
                    i.id,
                    i.alert_level,
                    i.timestamp.format(TIMESTAMP_FORMAT)
                ),
            })
            .collect();
        Some(Self {
            center: [NAIROBI_LATITUDE, NAIROBI_LONGITUDE],
            zoom: 6,
            markers,
        })
    }
}
