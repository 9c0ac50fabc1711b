// SPDX-License-Identifier: GPL-3.0-only

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bridge::{DeliveryMode, OverflowPolicy};
use crate::constants::{self, FrameRate};
use crate::errors::{BridgeError, BridgeResult};

/// Directory under the user config dir
pub const CONFIG_DIR: &str = "depth-bridge";
pub const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Frame-rate key used when none is given (5, 10 or 15)
    pub frame_rate: u32,
    /// Manual exposure time applied by `set_exposure`, in microseconds
    pub exposure_time_us: u32,
    /// Frame buffer capacity in points
    pub max_points: usize,
    /// Handling of frames larger than the buffer
    pub overflow_policy: OverflowPolicy,
    /// Run the host handler on the driver thread or on a dispatch thread
    pub delivery: DeliveryMode,
    /// Frame slots between driver and dispatch thread in queued delivery
    pub handoff_depth: usize,
    /// Name driver threads get inside the host runtime
    pub attach_thread_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            frame_rate: FrameRate::default().key(),
            exposure_time_us: constants::EXPOSURE_TIME_US,
            max_points: constants::MAX_POINTS,
            overflow_policy: OverflowPolicy::default(),
            delivery: DeliveryMode::default(),
            handoff_depth: constants::DEFAULT_HANDOFF_DEPTH,
            attach_thread_name: constants::DEFAULT_ATTACH_THREAD_NAME.to_string(),
        }
    }
}

impl BridgeConfig {
    /// `<config dir>/depth-bridge/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load from the default location, falling back to defaults
    pub fn load_default() -> BridgeResult<Self> {
        match Self::default_path() {
            Some(path) => Self::load(&path),
            None => {
                debug!("No config directory, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load and validate a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> BridgeResult<Self> {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> BridgeResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if FrameRate::from_key(self.frame_rate).is_none() {
            return Err(BridgeError::Config(format!(
                "unsupported frame_rate {}",
                self.frame_rate
            )));
        }
        if self.max_points == 0 || self.max_points > constants::MAX_POINTS {
            return Err(BridgeError::Config(format!(
                "max_points {} outside 1..={}",
                self.max_points,
                constants::MAX_POINTS
            )));
        }
        if self.exposure_time_us == 0 || self.exposure_time_us > constants::MAX_EXPOSURE_TIME_US {
            return Err(BridgeError::Config(format!(
                "exposure_time_us {} outside 1..={}",
                self.exposure_time_us,
                constants::MAX_EXPOSURE_TIME_US
            )));
        }
        if self.handoff_depth == 0 {
            return Err(BridgeError::Config("handoff_depth must be positive".to_string()));
        }
        Ok(())
    }
}
