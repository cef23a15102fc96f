// Prevents additional console window on Windows in release, DO NOT REMOVE!!
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use marque_ai::config::{AppPaths, Settings};
use marque_ai::dashboard::{DashboardSummary, MapView};
use marque_ai::engine::{DetectionEngine, ModelStatus};
use marque_ai::error::{Error, Result};
use marque_ai::location::{self, GpsFix, LocationInput, KENYA_COUNTIES};
use marque_ai::models::{Incident, IncidentFilter};
use marque_ai::session::{Analysis, ReportingSession};
use marque_ai::{annotate, export, report};
use ab_glyph::FontVec;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, OnceLock};
use tauri::Manager;

pub struct AppState {
    session: Mutex<ReportingSession>,
    engine: OnceLock<DetectionEngine>,
    paths: AppPaths,
    settings: Settings,
    caption_font: Option<FontVec>,
}

impl AppState {
    /// Models load on first use and are never reloaded.
    fn engine(&self) -> &DetectionEngine {
        self.engine
            .get_or_init(|| DetectionEngine::load(&self.settings.detection, &self.paths))
    }

    fn session(&self) -> Result<MutexGuard<'_, ReportingSession>> {
        self.session.lock().map_err(|_| Error::Lock)
    }
}

#[derive(Debug, Serialize)]
struct AnalysisView {
    #[serde(flatten)]
    analysis: Analysis,
    annotated_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct ExportNames {
    json: String,
    pdf: Option<String>,
}

#[tauri::command]
async fn model_status(app: tauri::AppHandle) -> Result<ModelStatus> {
    tauri::async_runtime::spawn_blocking(move || app.state::<AppState>().engine().status())
        .await
        .map_err(|e| Error::Init(format!("Task join error: {e}")))
}

#[tauri::command]
fn kenya_counties() -> Vec<&'static str> {
    KENYA_COUNTIES.to_vec()
}

#[tauri::command]
fn current_location() -> GpsFix {
    location::current_location()
}

fn analyze_file(state: &AppState, path: &Path) -> Result<AnalysisView> {
    let bytes = std::fs::read(path)?;
    let image = image::load_from_memory(&bytes)?;
    let engine = state.engine();
    let analysis = state.session()?.analyze(&image, engine.detector());
    let annotated_path = if analysis.detections.is_empty() {
        None
    } else {
        let hash = annotate::content_hash(&bytes);
        match annotate::save_annotated(
            &image,
            &analysis.detections,
            state.caption_font.as_ref(),
            &hash,
            &state.paths.annotated_dir,
        ) {
            Ok(out) => Some(out.to_string_lossy().to_string()),
            Err(err) => {
                log::warn!("Annotation failed for {}: {}", path.display(), err);
                None
            }
        }
    };
    Ok(AnalysisView {
        analysis,
        annotated_path,
    })
}

#[tauri::command]
async fn analyze_image(path: String, app: tauri::AppHandle) -> Result<AnalysisView> {
    tauri::async_runtime::spawn_blocking(move || {
        let state = app.state::<AppState>();
        analyze_file(&state, Path::new(&path))
    })
    .await
    .map_err(|e| Error::Init(format!("Task join error: {e}")))?
}

#[tauri::command]
fn submit_incident(
    state: tauri::State<AppState>,
    location: LocationInput,
    notes: Option<String>,
) -> Result<Incident> {
    let engine = state.engine();
    let mut session = state.session()?;
    session.submit(location, notes, engine.sentiment())
}

#[tauri::command]
fn dashboard(state: tauri::State<AppState>) -> Result<DashboardSummary> {
    Ok(DashboardSummary::from_incidents(state.session()?.incidents()))
}

#[tauri::command]
fn incident_map(state: tauri::State<AppState>) -> Result<Option<MapView>> {
    Ok(MapView::from_incidents(state.session()?.incidents()))
}

#[tauri::command]
fn list_incidents(state: tauri::State<AppState>, filter: IncidentFilter) -> Result<Vec<Incident>> {
    Ok(state.session()?.filter(&filter))
}

#[tauri::command]
fn export_incident_pdf(state: tauri::State<AppState>, id: String, dest: String) -> Result<()> {
    let incident = state.session()?.incident(&id)?.clone();
    let bytes = report::render_incident_pdf(&incident, &state.settings.report)?;
    std::fs::write(PathBuf::from(&dest), bytes)?;
    log::info!("Saved PDF report for {} to {}", id, dest);
    Ok(())
}

#[tauri::command]
fn export_all_json(state: tauri::State<AppState>, dest: String) -> Result<()> {
    let incidents = state.session()?.incidents().to_vec();
    export::write_export(&incidents, Path::new(&dest))
}

#[tauri::command]
fn export_file_names(state: tauri::State<AppState>, id: Option<String>) -> Result<ExportNames> {
    let pdf = match id {
        Some(id) => Some(report::report_file_name(state.session()?.incident(&id)?)),
        None => None,
    };
    Ok(ExportNames {
        json: export::export_file_name(chrono::Local::now().naive_local()),
        pdf,
    })
}

fn main() {
    env_logger::init();

    let context = tauri::generate_context!();
    let root = tauri::api::path::app_data_dir(context.config())
        .expect("Failed to resolve app data dir");
    let paths = AppPaths::at(root).expect("Failed to prepare app directories");
    let settings = Settings::load(&paths);
    let caption_font = annotate::load_caption_font(&settings.report);
    log::info!("App data: {}", paths.root.display());

    tauri::Builder::default()
        .manage(AppState {
            session: Mutex::new(ReportingSession::new()),
            engine: OnceLock::new(),
            paths,
            settings,
            caption_font,
        })
        .invoke_handler(tauri::generate_handler![
            model_status,
            kenya_counties,
            current_location,
            analyze_image,
            submit_incident,
            dashboard,
            incident_map,
            list_incidents,
            export_incident_pdf,
            export_all_json,
            export_file_names
        ])
        .run(context)
        .expect("error while running tauri application");
}
