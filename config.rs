use crate::error::Result;
use crate::onnx::ProviderChoice;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub detection_model_path: PathBuf,
    pub sentiment_model_path: PathBuf,
    pub detection_score_threshold: f32,
    pub detection_short_side: u32,
    pub detection_long_side: u32,
    pub provider: ProviderChoice,
    pub device_id: Option<u32>,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            detection_model_path: PathBuf::from("detr-resnet-50.onnx"),
            sentiment_model_path: PathBuf::from("distilbert-sst2.onnx"),
            detection_score_threshold: 0.5,
            detection_short_side: 800,
            detection_long_side: 1333,
            provider: default_provider(),
            device_id: None,
        }
    }
}

fn default_provider() -> ProviderChoice {
    ProviderChoice::Auto
}

fn default_font_dirs() -> Vec<PathBuf> {
    [
        "fonts",
        "/usr/share/fonts/truetype/liberation",
        "/usr/share/fonts/liberation",
        "/usr/share/fonts/TTF",
        "C:\\Windows\\Fonts",
        "/Library/Fonts",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub font_dirs: Vec<PathBuf>,
    pub font_family: String,
}

impl ReportConfig {
    /// First `<family>-<style>.ttf` found in the font directories, the same
    /// naming `genpdf` expects.
    pub fn font_file(&self, style: &str) -> Option<PathBuf> {
        let file = format!("{}-{}.ttf", self.font_family, style);
        self.font_dirs
            .iter()
            .map(|dir| dir.join(&file))
            .find(|path| path.is_file())
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            font_dirs: default_font_dirs(),
            font_family: default_font_family(),
        }
    }
}

fn default_font_family() -> String {
    "LiberationSans".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

impl Settings {
    /// Reads `settings.json` from the app root, falling back to defaults when it
    /// is absent or unreadable.
    pub fn load(paths: &AppPaths) -> Self {
        let path = paths.root.join(SETTINGS_FILE);
        if !path.exists() {
            log::info!("No settings file at {}; using defaults", path.display());
            return Self::default();
        }
        match std::fs::read_to_string(&path)
            .map_err(crate::error::Error::from)
            .and_then(|raw| serde_json::from_str(&raw).map_err(Into::into))
        {
            Ok(settings) => settings,
            Err(err) => {
                log::warn!("Ignoring settings file {}: {}", path.display(), err);
                Self::default()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppPaths {
    pub root: PathBuf,
    pub models_dir: PathBuf,
    pub annotated_dir: PathBuf,
}

impl AppPaths {
    pub fn at(root: PathBuf) -> Result<Self> {
        let models_dir = root.join("models");
        let annotated_dir = root.join("annotated");

        std::fs::create_dir_all(&models_dir)?;
        std::fs::create_dir_all(&annotated_dir)?;

        // Seed bundled models from a local dev folder when present.
        let _ = copy_dir_recursive(Path::new("./models"), &models_dir);

        Ok(Self {
            root,
            models_dir,
            annotated_dir,
        })
    }

    pub fn resolve_model(&self, name: &Path) -> PathBuf {
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.models_dir.join(name)
        }
    }
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dest)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dest_path = dest.join(entry.file_name());
        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dest_path)?;
        } else if !dest_path.exists() {
            std::fs::copy(&src_path, &dest_path)?;
        }
    }
    Ok(())
}
