use crate::error::Result;
use crate::models::Incident;
use chrono::NaiveDateTime;
use std::path::Path;

pub fn export_file_name(now: NaiveDateTime) -> String {
    format!("incidents_export_{}.json", now.format("%Y%m%d_%H%M%S"))
}

/// Pretty-printed JSON array of every incident, in submission order.
pub fn export_json(incidents: &[Incident]) -> Result<String> {
    Ok(serde_json::to_string_pretty(incidents)?)
}

/// Parses an export. Alert fields are re-derived from each incident's weapons,
/// so a hand-edited file cannot contradict its own detections.
pub fn import_json(raw: &str) -> Result<Vec<Incident>> {
    let incidents: Vec<Incident> = serde_json::from_str(raw)?;
    incidents
        .into_iter()
        .map(|incident| {
            let rederived = incident.clone().rederived()?;
            if rederived != incident {
                log::warn!("Corrected alert fields of imported incident {}", incident.id);
            }
            Ok(rederived)
        })
        .collect()
}

pub fn write_export(incidents: &[Incident], dest: &Path) -> Result<()> {
    std::fs::write(dest, export_json(incidents)?)?;
    log::info!("Exported {} incidents to {}", incidents.len(), dest.display());
    Ok(())
}
