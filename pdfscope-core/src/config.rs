use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::geometry::FitPolicy;

pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Viewer tunables. Every field may be omitted from the TOML file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ViewerConfig {
    pub base_scale: f64,
    pub fallback_zoom: f64,
    pub scrollbar_allowance: f64,
    pub min_fit_width: f64,
    pub zoom_step: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Upper bound on presentation bitmap area; zoom is reduced to stay under it.
    pub max_presentation_pixels: u64,
    pub max_views: usize,
    pub scroll_step: f64,
    pub toast_millis: u64,
    pub hit_grid_cell: f64,
    pub pdfium_library: Option<PathBuf>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            base_scale: 3.0,
            fallback_zoom: 0.3,
            scrollbar_allowance: 30.0,
            min_fit_width: 100.0,
            zoom_step: 0.1,
            min_zoom: 0.05,
            max_zoom: 4.0,
            max_presentation_pixels: 16 * 1024 * 1024,
            max_views: 2,
            scroll_step: 40.0,
            toast_millis: 1000,
            hit_grid_cell: 32.0,
            pdfium_library: None,
        }
    }
}

impl ViewerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: ViewerConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn load_or_default(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            debug!(?path, "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("base_scale", self.base_scale),
            ("fallback_zoom", self.fallback_zoom),
            ("zoom_step", self.zoom_step),
            ("min_zoom", self.min_zoom),
            ("max_zoom", self.max_zoom),
            ("scroll_step", self.scroll_step),
            ("hit_grid_cell", self.hit_grid_cell),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if self.zoom_step >= 1.0 {
            return Err(ConfigError::Invalid(format!(
                "zoom_step must be below 1.0, got {}",
                self.zoom_step
            )));
        }
        if self.min_zoom > self.max_zoom {
            return Err(ConfigError::Invalid(format!(
                "min_zoom {} exceeds max_zoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.max_presentation_pixels == 0 {
            return Err(ConfigError::Invalid(
                "max_presentation_pixels must be at least 1".into(),
            ));
        }
        if self.max_views == 0 {
            return Err(ConfigError::Invalid("max_views must be at least 1".into()));
        }
        if self.scrollbar_allowance < 0.0 || self.min_fit_width < 0.0 {
            return Err(ConfigError::Invalid(
                "scrollbar_allowance and min_fit_width must not be negative".into(),
            ));
        }
        Ok(())
    }

    pub fn fit_policy(&self) -> FitPolicy {
        FitPolicy {
            allowance: self.scrollbar_allowance,
            min_width: self.min_fit_width,
            fallback_zoom: self.fallback_zoom,
        }
    }

    pub fn zoom_in_factor(&self) -> f64 {
        1.0 + self.zoom_step
    }

    pub fn zoom_out_factor(&self) -> f64 {
        1.0 - self.zoom_step
    }

    pub fn clamp_zoom(&self, zoom: f64) -> f64 {
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    /// Like [`clamp_zoom`](Self::clamp_zoom), but also keeps a `width`×`height` raster under
    /// `max_presentation_pixels` once scaled. `min_zoom` still wins over the pixel budget.
    pub fn clamp_zoom_for(&self, zoom: f64, width: u32, height: u32) -> f64 {
        let area = f64::from(width) * f64::from(height);
        let ceiling = if area > 0.0 {
            (self.max_presentation_pixels as f64 / area)
                .sqrt()
                .min(self.max_zoom)
        } else {
            self.max_zoom
        };
        zoom.min(ceiling).max(self.min_zoom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = ViewerConfig::from_toml_str("base_scale = 2.0\nmax_views = 3\n").unwrap();
        assert_eq!(config.base_scale, 2.0);
        assert_eq!(config.max_views, 3);
        assert_eq!(config.fallback_zoom, 0.3);
        assert_eq!(config.zoom_in_factor(), 1.1);
    }

    #[test]
    fn rejects_unknown_keys_and_bad_values() {
        assert!(matches!(
            ViewerConfig::from_toml_str("colour = \"red\""),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            ViewerConfig::from_toml_str("base_scale = 0.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ViewerConfig::from_toml_str("min_zoom = 5.0\nmax_zoom = 1.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ViewerConfig::from_toml_str("max_presentation_pixels = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            ViewerConfig::from_toml_str("max_views = 0"),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn default_zoom_ceiling_fits_pixel_budget() {
        let config = ViewerConfig::default();
        // US Letter at base scale 3.
        let (width, height) = (1836, 2376);
        let zoom = config.clamp_zoom_for(config.max_zoom, width, height);
        let (w, h) = crate::raster::presentation_size(width, height, zoom);
        assert!(u64::from(w) * u64::from(h) <= config.max_presentation_pixels);
        assert!(u64::from(w) * u64::from(h) * 4 < 512 * 1024 * 1024);
        assert!(zoom < config.max_zoom);
    }

    #[test]
    fn pixel_budget_never_overrides_min_zoom() {
        let config = ViewerConfig {
            max_presentation_pixels: 1,
            ..ViewerConfig::default()
        };
        assert_eq!(config.clamp_zoom_for(1.0, 1000, 1000), config.min_zoom);
        assert_eq!(config.clamp_zoom_for(2.0, 0, 0), 2.0);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = ViewerConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config, ViewerConfig::default());
    }

    #[test]
    fn loads_file_from_directory() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "zoom_step = 0.25\npdfium_library = \"/opt/pdfium/libpdfium.so\"\n",
        )
        .unwrap();
        let config = ViewerConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(config.zoom_step, 0.25);
        assert_eq!(
            config.pdfium_library.as_deref(),
            Some(Path::new("/opt/pdfium/libpdfium.so"))
        );
        assert!(ViewerConfig::load(&dir.path().join("absent.toml")).is_err());
    }
}
