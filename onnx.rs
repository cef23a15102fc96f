use crate::error::{Error, Result};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;

#[cfg(target_os = "windows")]
use ort::execution_providers::{DirectMLExecutionProvider, ExecutionProvider};

#[cfg(target_os = "windows")]
const ORT_DYLIB_NAME: &str = "onnxruntime.dll";
#[cfg(target_os = "macos")]
const ORT_DYLIB_NAME: &str = "libonnxruntime.dylib";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const ORT_DYLIB_NAME: &str = "libonnxruntime.so";

lazy_static! {
    static ref ORT_ENVIRONMENT: std::result::Result<(), String> = init_environment();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InferenceProvider {
    Cpu,
    DirectML { device_id: u32 },
}

impl InferenceProvider {
    pub fn label(self) -> &'static str {
        match self {
            Self::Cpu => "CPU",
            Self::DirectML { .. } => "GPU (DirectML)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderChoice {
    Auto,
    CpuOnly,
    DirectMlOnly,
}

#[derive(Debug, Clone, Copy)]
pub struct OrtRuntimeConfig {
    pub provider: ProviderChoice,
    pub device_id: Option<u32>,
}

impl OrtRuntimeConfig {
    fn resolved_device_id(self) -> u32 {
        self.device_id.unwrap_or(0)
    }
}

fn ort_candidate_paths() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            candidates.push(parent.join("onnxruntime").join(ORT_DYLIB_NAME));
            candidates.push(parent.join(ORT_DYLIB_NAME));
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            candidates.push(
                Path::new(&manifest_dir)
                    .join("onnxruntime")
                    .join("win-x64-directml")
                    .join(ORT_DYLIB_NAME),
            );
        }
    }
    candidates
}

fn pick_ort_dylib(candidates: Vec<PathBuf>) -> Option<(PathBuf, PathBuf)> {
    for candidate in candidates {
        if candidate.is_file() {
            let dir = candidate.parent()?.to_path_buf();
            return Some((candidate, dir));
        }
    }
    None
}

#[cfg(target_os = "windows")]
fn prepend_path_dir(dir: &Path) {
    let paths = std::env::var_os("PATH").unwrap_or_default();
    let mut new_paths = std::ffi::OsString::new();
    new_paths.push(dir);
    new_paths.push(";");
    new_paths.push(&paths);
    std::env::set_var("PATH", new_paths);
}

#[cfg(not(target_os = "windows"))]
fn prepend_path_dir(_dir: &Path) {}

fn set_ort_dylib_path(dylib_path: &Path, dylib_dir: &Path) {
    std::env::set_var("ORT_DYLIB_PATH", dylib_path);
    prepend_path_dir(dylib_dir);
}

/// Locates the runtime library `ort` will load. An explicit `ORT_DYLIB_PATH`
/// must name an existing file; otherwise a library shipped next to the
/// executable is preferred, and `None` leaves the system search to `ort`.
fn resolve_ort_dylib_path() -> Result<Option<PathBuf>> {
    if let Some(path) = std::env::var_os("ORT_DYLIB_PATH") {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(Some(path));
        }
        return Err(Error::Path(format!(
            "ONNX Runtime library not found at {}",
            path.display()
        )));
    }
    match pick_ort_dylib(ort_candidate_paths()) {
        Some((path, dir)) => {
            set_ort_dylib_path(&path, &dir);
            Ok(Some(path))
        }
        None => Ok(None),
    }
}

// `ort` panics when load-dynamic cannot open the library, so the commit runs
// under catch_unwind and the outcome is remembered for the whole process.
fn init_environment() -> std::result::Result<(), String> {
    let commit = || ort::init().with_name("marque-ai").commit();
    match std::panic::catch_unwind(commit) {
        Ok(Ok(committed)) => {
            if committed {
                if let Ok(env) = ort::environment::get_environment() {
                    env.set_log_level(ort::logging::LogLevel::Warning);
                }
            }
            Ok(())
        }
        Ok(Err(e)) => Err(format!("Failed to init ORT environment: {e}")),
        Err(_) => Err(format!(
            "ONNX Runtime library could not be loaded ({ORT_DYLIB_NAME})"
        )),
    }
}

fn ensure_environment() -> Result<()> {
    match resolve_ort_dylib_path()? {
        Some(path) => log::debug!("Using ONNX Runtime at {}", path.display()),
        None => log::debug!("Searching system paths for {ORT_DYLIB_NAME}"),
    }
    match ORT_ENVIRONMENT.as_ref() {
        Ok(()) => Ok(()),
        Err(msg) => Err(Error::Init(msg.clone())),
    }
}

/// Inference stays on unless `MARQUE_ENABLE_ONNX` switches it off.
pub fn onnx_enabled() -> bool {
    match std::env::var("MARQUE_ENABLE_ONNX")
        .ok()
        .map(|v| v.to_ascii_lowercase())
        .as_deref()
    {
        Some("0") | Some("false") | Some("off") => false,
        _ => true,
    }
}

pub fn build_session(model_path: &Path, cfg: OrtRuntimeConfig) -> Result<(Session, InferenceProvider)> {
    if !model_path.exists() {
        return Err(Error::Init(format!(
            "Model not found: {}",
            model_path.display()
        )));
    }
    ensure_environment()?;
    let device_id = cfg.resolved_device_id();

    let try_build = |use_dml: bool| -> Result<Session> {
        let build = || -> Result<Session> {
            #[allow(unused_mut)]
            let mut builder = Session::builder()
                .map_err(|e| Error::Init(format!("{e}")))?
                .with_optimization_level(GraphOptimizationLevel::Level1)
                .map_err(|e| Error::Init(format!("{e}")))?
                .with_parallel_execution(false)
                .map_err(|e| Error::Init(format!("{e}")))?;
            if use_dml {
                #[cfg(target_os = "windows")]
                {
                    builder = builder
                        .with_memory_pattern(false)
                        .map_err(|e| Error::Init(format!("{e}")))?;
                    let ep = DirectMLExecutionProvider::default()
                        .with_device_id(device_id as i32)
                        .build();
                    builder = builder
                        .with_execution_providers([ep])
                        .map_err(|e| Error::Init(format!("{e}")))?;
                }
            }
            builder
                .commit_from_file(model_path)
                .map_err(|e| Error::Init(format!("{e}")))
        };
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(build)) {
            Ok(res) => res,
            Err(_) => Err(Error::Init(
                "ONNX Runtime panicked while building session".into(),
            )),
        }
    };

    let wants_dml = matches!(cfg.provider, ProviderChoice::Auto | ProviderChoice::DirectMlOnly);
    #[cfg(target_os = "windows")]
    {
        let dml_available = std::panic::catch_unwind(|| {
            DirectMLExecutionProvider::default()
                .is_available()
                .unwrap_or(false)
        })
        .unwrap_or(false);
        if wants_dml && dml_available {
            if let Ok(session) = try_build(true) {
                return Ok((session, InferenceProvider::DirectML { device_id }));
            }
        }
    }
    #[cfg(not(target_os = "windows"))]
    let _ = device_id;

    if wants_dml {
        log::warn!(
            "DirectML execution provider unavailable; falling back to CPU for {}",
            model_path.display()
        );
    }

    let session = try_build(false)?;
    Ok((session, InferenceProvider::Cpu))
}

/// Runs `f`, turning a panic inside the runtime into an inference error.
pub fn safe_run<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(res) => res,
        Err(_) => Err(Error::Inference("ONNX runtime panic".into())),
    }
}

/// Reads a `<model>.<suffix>` sidecar, falling back to `models/<stem>.<suffix>`.
pub fn resolve_sidecar(model_path: &Path, suffix: &str) -> Option<std::path::PathBuf> {
    let sidecar = model_path.with_extension(suffix);
    if sidecar.exists() {
        return Some(sidecar);
    }
    let stem = model_path.file_stem().and_then(|s| s.to_str())?;
    let fallback = Path::new("models").join(format!("{stem}.{suffix}"));
    fallback.exists().then_some(fallback)
}

/// One entry per line; blank lines are kept so line numbers stay class ids.
pub fn load_lines(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(contents.lines().map(|line| line.trim().to_string()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_model_is_init_error() {
        let cfg = OrtRuntimeConfig {
            provider: ProviderChoice::CpuOnly,
            device_id: None,
        };
        let err = build_session(Path::new("does/not/exist.onnx"), cfg).unwrap_err();
        assert!(matches!(err, Error::Init(msg) if msg.contains("Model not found")));
    }

    #[test]
    fn missing_runtime_library_is_an_error_not_a_panic() {
        let dir = std::env::temp_dir().join("marque_missing_runtime");
        std::fs::create_dir_all(&dir).unwrap();
        let model = dir.join("detector.onnx");
        std::fs::write(&model, b"not a model").unwrap();
        std::env::set_var("ORT_DYLIB_PATH", dir.join("no-such-onnxruntime.lib"));

        let cfg = OrtRuntimeConfig {
            provider: ProviderChoice::CpuOnly,
            device_id: None,
        };
        let err = build_session(&model, cfg).unwrap_err();
        assert!(matches!(err, Error::Path(msg) if msg.contains("ONNX Runtime library not found")));
    }

    #[test]
    fn dylib_candidates_must_exist() {
        let dir = std::env::temp_dir().join("marque_dylib_pick");
        std::fs::create_dir_all(&dir).unwrap();
        let present = dir.join(ORT_DYLIB_NAME);
        std::fs::write(&present, b"").unwrap();

        let picked = pick_ort_dylib(vec![dir.join("absent").join(ORT_DYLIB_NAME), present.clone()]);
        assert_eq!(picked, Some((present, dir.clone())));
        assert_eq!(pick_ort_dylib(vec![dir.join("absent.so")]), None);
    }

    #[test]
    fn sidecar_lines_keep_positions() {
        let dir = std::env::temp_dir().join("marque_sidecar_test");
        std::fs::create_dir_all(&dir).unwrap();
        let model = dir.join("detector.onnx");
        let labels = dir.join("detector.labels.txt");
        std::fs::write(&labels, "N/A\nperson\n\nknife\n").unwrap();

        let found = resolve_sidecar(&model, "labels.txt").unwrap();
        assert_eq!(found, labels);
        let lines = load_lines(&found).unwrap();
        assert_eq!(lines, vec!["N/A", "person", "", "knife"]);
    }

    #[test]
    fn panics_become_inference_errors() {
        let res: Result<u8> = safe_run(|| panic!("boom"));
        assert!(matches!(res, Err(Error::Inference(_))));
    }
}
