//! Pipeline configuration.
//!
//! [`PipelineConfig`] gathers everything needed to start a
//! [`RefreshService`](crate::service::RefreshService). It can be built in
//! code with the `with_*` methods or loaded from an INI file:
//!
//! ```ini
//! [pipeline]
//! refresh_cadence = 1.0
//!
//! [entities]
//! ids = 25338, 28654, 33591
//!
//! [projection]
//! base_radius = 1.086
//! altitude_exaggeration = 0.0
//!
//! [synthetic]
//! batch_size = 60
//! step_secs = 1
//! ```
//!
//! Missing sections and keys keep their defaults. An `[entities]` section
//! without `ids` is an error, since an empty entity list is never intended.

mod error;

pub use error::{ConfigError, ConfigResult};

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::{Ini, Properties};
use tracing::{debug, info};

use crate::entity::EntityId;
use crate::fetch::SyntheticOrbitConfig;
use crate::projection::WorldProjection;

/// Default seconds between coordinator ticks.
pub const DEFAULT_REFRESH_CADENCE_SECS: f64 = 1.0;

/// Default tracked set: the NOAA POES weather satellites.
pub const DEFAULT_ENTITIES: [EntityId; 3] = [
    EntityId::new(25338),
    EntityId::new(28654),
    EntityId::new(33591),
];

const CONFIG_DIR_NAME: &str = "orbitstream";
const CONFIG_FILE_NAME: &str = "config.ini";

const SECTION_PIPELINE: &str = "pipeline";
const SECTION_ENTITIES: &str = "entities";
const SECTION_PROJECTION: &str = "projection";
const SECTION_SYNTHETIC: &str = "synthetic";

/// Path of the per-user config file.
pub fn default_config_path() -> ConfigResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
        .ok_or(ConfigError::NoConfigDir)
}

/// Everything needed to run the refresh pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Seconds between coordinator ticks.
    pub refresh_cadence_secs: f64,
    /// Tracked identities, in pipeline order.
    pub entities: Vec<EntityId>,
    pub projection: WorldProjection,
    /// Settings for the built-in synthetic orbit source.
    pub synthetic: SyntheticOrbitConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            refresh_cadence_secs: DEFAULT_REFRESH_CADENCE_SECS,
            entities: DEFAULT_ENTITIES.to_vec(),
            projection: WorldProjection::default(),
            synthetic: SyntheticOrbitConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn with_refresh_cadence(mut self, secs: f64) -> Self {
        self.refresh_cadence_secs = secs;
        self
    }

    pub fn with_entities<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = EntityId>,
    {
        self.entities = ids.into_iter().collect();
        self
    }

    pub fn with_projection(mut self, projection: WorldProjection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_synthetic(mut self, synthetic: SyntheticOrbitConfig) -> Self {
        self.synthetic = synthetic;
        self
    }

    /// Load from `path`.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_ini_str(&text)?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Load from `path`, or return defaults if it does not exist.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse INI text.
    pub fn from_ini_str(text: &str) -> ConfigResult<Self> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::default();

        if let Some(section) = ini.section(Some(SECTION_PIPELINE)) {
            if let Some(secs) = parse_key::<f64>(section, SECTION_PIPELINE, "refresh_cadence")? {
                require(
                    secs.is_finite() && secs > 0.0,
                    SECTION_PIPELINE,
                    "refresh_cadence",
                    secs,
                    "must be a positive number of seconds",
                )?;
                config.refresh_cadence_secs = secs;
            }
        }

        if let Some(section) = ini.section(Some(SECTION_ENTITIES)) {
            let raw = section.get("ids").ok_or_else(|| ConfigError::MissingKey {
                section: SECTION_ENTITIES.to_string(),
                key: "ids".to_string(),
            })?;
            config.entities = parse_entity_list(raw)?;
        }

        if let Some(section) = ini.section(Some(SECTION_PROJECTION)) {
            if let Some(radius) = parse_key::<f64>(section, SECTION_PROJECTION, "base_radius")? {
                require(
                    radius.is_finite() && radius > 0.0,
                    SECTION_PROJECTION,
                    "base_radius",
                    radius,
                    "must be positive",
                )?;
                config.projection.base_radius = radius;
            }
            if let Some(factor) =
                parse_key::<f64>(section, SECTION_PROJECTION, "altitude_exaggeration")?
            {
                require(
                    factor.is_finite() && factor >= 0.0,
                    SECTION_PROJECTION,
                    "altitude_exaggeration",
                    factor,
                    "must be zero or positive",
                )?;
                config.projection.altitude_exaggeration = factor;
            }
        }

        if let Some(section) = ini.section(Some(SECTION_SYNTHETIC)) {
            if let Some(batch) = parse_key::<usize>(section, SECTION_SYNTHETIC, "batch_size")? {
                config.synthetic.batch_size = batch;
            }
            if let Some(step) = parse_key::<u32>(section, SECTION_SYNTHETIC, "step_secs")? {
                require(step > 0, SECTION_SYNTHETIC, "step_secs", step, "must be at least 1")?;
                config.synthetic.step_secs = step;
            }
        }

        Ok(config)
    }

    /// Render as INI text in the same layout [`from_ini_str`](Self::from_ini_str) reads.
    pub fn to_ini_string(&self) -> String {
        let ini = self.to_ini();
        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = ini.write_to(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Write to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(path, self.to_ini_string()).map_err(io_err)?;
        info!(path = %path.display(), "Saved config");
        Ok(())
    }

    fn to_ini(&self) -> Ini {
        let ids = self
            .entities
            .iter()
            .map(|id| id.get().to_string())
            .collect::<Vec<_>>()
            .join(", ");

        let mut ini = Ini::new();
        ini.with_section(Some(SECTION_PIPELINE))
            .set("refresh_cadence", self.refresh_cadence_secs.to_string());
        ini.with_section(Some(SECTION_ENTITIES)).set("ids", ids);
        ini.with_section(Some(SECTION_PROJECTION))
            .set("base_radius", self.projection.base_radius.to_string())
            .set(
                "altitude_exaggeration",
                self.projection.altitude_exaggeration.to_string(),
            );
        ini.with_section(Some(SECTION_SYNTHETIC))
            .set("batch_size", self.synthetic.batch_size.to_string())
            .set("step_secs", self.synthetic.step_secs.to_string());
        ini
    }
}

fn parse_key<T>(section: &Properties, name: &str, key: &str) -> ConfigResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = section.get(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::invalid(name, key, raw, e.to_string()))
}

fn require<V: ToString>(
    ok: bool,
    section: &str,
    key: &str,
    value: V,
    reason: &str,
) -> ConfigResult<()> {
    if ok {
        Ok(())
    } else {
        Err(ConfigError::invalid(section, key, &value.to_string(), reason))
    }
}

/// Parse a comma- or whitespace-separated list of catalog numbers.
pub fn parse_entity_list(raw: &str) -> ConfigResult<Vec<EntityId>> {
    let ids = raw
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(|token| {
            token
                .parse::<EntityId>()
                .map_err(|e| ConfigError::invalid(SECTION_ENTITIES, "ids", token, e.to_string()))
        })
        .collect::<ConfigResult<Vec<_>>>()?;

    if ids.is_empty() {
        return Err(ConfigError::invalid(
            SECTION_ENTITIES,
            "ids",
            raw,
            "at least one entity is required",
        ));
    }
    Ok(ids)
}
