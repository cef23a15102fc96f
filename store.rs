use crate::models::{Incident, IncidentFilter};

/// Append-only list of submitted incidents, oldest first.
#[derive(Debug, Default)]
pub struct IncidentStore {
    incidents: Vec<Incident>,
}

impl IncidentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `incident`, suffixing its id with `_2`, `_3`, ... when an
    /// incident with the same id was already recorded. Returns the stored id.
    pub fn append(&mut self, mut incident: Incident) -> String {
        if self.contains(&incident.id) {
            let base = incident.id.clone();
            let mut n = 2;
            while self.contains(&format!("{base}_{n}")) {
                n += 1;
            }
            incident.id = format!("{base}_{n}");
        }
        let id = incident.id.clone();
        log::info!(
            "Recorded incident {} ({}, {})",
            id,
            incident.alert_level.plain_label(),
            incident.location.county
        );
        self.incidents.push(incident);
        id
    }

    pub fn all(&self) -> &[Incident] {
        &self.incidents
    }

    pub fn len(&self) -> usize {
        self.incidents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Incident> {
        self.incidents.iter().find(|i| i.id == id)
    }

    pub fn filter(&self, filter: &IncidentFilter) -> Vec<Incident> {
        self.incidents
            .iter()
            .filter(|i| filter.matches(i))
            .cloned()
            .collect()
    }

    fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }
}
