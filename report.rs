//! Per-incident PDF report.
//!
//! Rendering goes through `genpdf`, which embeds a TrueType family found in
//! one of the configured font directories.

use crate::config::ReportConfig;
use crate::error::{Error, Result};
use crate::models::{Incident, TIMESTAMP_FORMAT};
use genpdf::elements::{Break, FrameCellDecorator, Paragraph, TableLayout};
use genpdf::fonts::{self, FontData, FontFamily};
use genpdf::style::{Color, Style};
use genpdf::{Alignment, Document, Element, PaperSize, SimplePageDecorator};

pub const REPORT_TITLE: &str = "AI - INCIDENT REPORTING";

pub fn report_file_name(incident: &Incident) -> String {
    format!("incident_report_{}.pdf", incident.id)
}

/// The label/value pairs of the report's incident table.
pub fn report_rows(incident: &Incident) -> Vec<(&'static str, String)> {
    let loc = &incident.location;
    vec![
        ("Incident ID:", incident.id.clone()),
        (
            "Date & Time:",
            incident.timestamp.format(TIMESTAMP_FORMAT).to_string(),
        ),
        ("Alert Level:", incident.alert_level.plain_label().to_string()),
        ("Severity:", incident.severity.to_string()),
        ("Location:", format!("{}, {}", loc.county, loc.ward)),
        (
            "Coordinates:",
            format!("Lat: {}, Lon: {}", loc.latitude, loc.longitude),
        ),
        ("Detected Weapons:", incident.weapon_names().join(", ")),
        ("Risk Assessment:", incident.risk_assessment.clone()),
        ("Status:", incident.status.to_string()),
    ]
}

fn load_fonts(config: &ReportConfig) -> Result<FontFamily<FontData>> {
    config
        .font_dirs
        .iter()
        .filter(|dir| dir.exists())
        .find_map(|dir| fonts::from_files(dir, &config.font_family, None).ok())
        .ok_or_else(|| {
            Error::Init(format!(
                "No {} fonts found in {:?}",
                config.font_family, config.font_dirs
            ))
        })
}

pub fn render_incident_pdf(incident: &Incident, config: &ReportConfig) -> Result<Vec<u8>> {
    let mut doc = Document::new(load_fonts(config)?);
    doc.set_title(format!("Incident Report {}", incident.id));
    doc.set_paper_size(PaperSize::A4);
    doc.set_minimal_conformance();
    doc.set_line_spacing(1.25);
    let mut decorator = SimplePageDecorator::new();
    decorator.set_margins(25);
    doc.set_page_decorator(decorator);

    doc.push(
        Paragraph::new(REPORT_TITLE)
            .aligned(Alignment::Center)
            .styled(
                Style::new()
                    .bold()
                    .with_font_size(18)
                    .with_color(Color::Rgb(0, 0, 139)),
            ),
    );
    doc.push(Break::new(1.5));

    let mut table = TableLayout::new(vec![2, 4]);
    table.set_cell_decorator(FrameCellDecorator::new(true, true, false));
    for (label, value) in report_rows(incident) {
        table
            .row()
            .element(Paragraph::new(label).styled(Style::new().bold()).padded(1))
            .element(Paragraph::new(value).padded(1))
            .push()?;
    }
    doc.push(table);
    doc.push(Break::new(1.0));

    doc.push(Paragraph::new("Recommended Actions:").styled(Style::new().bold()));
    doc.push(Paragraph::new(incident.recommendations.clone()));

    let mut buffer = Vec::new();
    doc.render(&mut buffer)?;
    log::info!("Rendered PDF report for {} ({} bytes)", incident.id, buffer.len());
    Ok(buffer)
}
