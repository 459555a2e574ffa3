use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use crate::features::TILE_COUNT;
use crate::training::{MAX_HIDDEN, MAX_WINDOW, WINDOW};

const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Set to `1` or `true` to train on every move.
pub const DEBUG_ENV: &str = "ADAPTIVE_MINES_DEBUG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineSettings {
    pub window: usize,
    pub top_k: usize,
    pub epochs: usize,
    pub learning_rate: f32,
    pub hidden_size: usize,
    pub jitter: f32,
    /// Train when the log length is a multiple of this. `None` means
    /// `window + 1`.
    pub train_every: Option<usize>,
    pub max_train_windows: usize,
    pub seed: Option<u64>,
    pub queue_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            window: WINDOW,
            top_k: 3,
            epochs: 3,
            learning_rate: 0.05,
            hidden_size: 24,
            jitter: 0.01,
            train_every: None,
            max_train_windows: 256,
            seed: None,
            queue_capacity: 64,
        }
    }
}

impl PipelineSettings {
    pub fn train_every(&self) -> usize {
        self.train_every.unwrap_or(self.window + 1)
    }

    /// Replaces every out-of-range value with its default.
    pub fn validated(mut self) -> Self {
        let defaults = Self::default();

        if self.window == 0 || self.window > MAX_WINDOW {
            log_warn!(
                "window {} must be in 1..={MAX_WINDOW}, using {}",
                self.window,
                defaults.window
            );
            self.window = defaults.window;
        }
        if self.top_k > TILE_COUNT {
            log_warn!("top_k {} exceeds the board, using {}", self.top_k, defaults.top_k);
            self.top_k = defaults.top_k;
        }
        if self.epochs == 0 {
            log_warn!("epochs must be at least 1, using {}", defaults.epochs);
            self.epochs = defaults.epochs;
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            log_warn!(
                "learning rate {} is invalid, using {}",
                self.learning_rate,
                defaults.learning_rate
            );
            self.learning_rate = defaults.learning_rate;
        }
        if self.hidden_size == 0 || self.hidden_size > MAX_HIDDEN {
            log_warn!(
                "hidden size {} must be in 1..={MAX_HIDDEN}, using {}",
                self.hidden_size,
                defaults.hidden_size
            );
            self.hidden_size = defaults.hidden_size;
        }
        if !self.jitter.is_finite() || self.jitter < 0.0 {
            log_warn!("jitter {} is invalid, using {}", self.jitter, defaults.jitter);
            self.jitter = defaults.jitter;
        }
        if self.train_every == Some(0) {
            log_warn!("train_every must be positive, using window + 1");
            self.train_every = None;
        }
        if self.max_train_windows == 0 {
            self.max_train_windows = defaults.max_train_windows;
        }
        if self.queue_capacity == 0 {
            self.queue_capacity = defaults.queue_capacity;
        }
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub pipeline: PipelineSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
    debug: bool,
}

fn read_settings(path: &Path) -> Result<Settings> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings from {}", path.display()))?;
    let mut settings: Settings = match serde_json::from_str(&contents) {
        Ok(settings) => settings,
        Err(err) => {
            log_warn!("ignoring unparsable settings at {}: {err}", path.display());
            Settings::default()
        }
    };
    settings.pipeline = settings.pipeline.validated();
    Ok(settings)
}

fn debug_from_env() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| matches!(value.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(false)
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            read_settings(&path)?
        } else {
            Settings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
            debug: debug_from_env(),
        })
    }

    /// Forces the per-move training cadence regardless of the environment.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Effective pipeline settings, debug cadence applied.
    pub fn pipeline(&self) -> PipelineSettings {
        let mut pipeline = self.read().pipeline.clone();
        if self.debug {
            pipeline.train_every = Some(1);
        }
        pipeline
    }

    pub fn update_pipeline(&self, pipeline: PipelineSettings) -> Result<()> {
        let mut guard = self.write();
        guard.pipeline = pipeline.validated();
        self.persist(&guard)
    }

    fn persist(&self, data: &Settings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    pub fn reload(&self) -> Result<()> {
        let data = read_settings(&self.path)?;
        *self.write() = data;
        Ok(())
    }

    fn read(&self) -> RwLockReadGuard<'_, Settings> {
        match self.data.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, Settings> {
        match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
