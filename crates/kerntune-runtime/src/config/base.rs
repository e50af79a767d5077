use super::tune::{TuneConfig, TuneLogLevel};
use crate::tune::TuneLevel;
use std::path::Path;
use std::sync::Arc;

/// Static mutex holding the global configuration, initialized as `None`.
static KERNTUNE_GLOBAL_CONFIG: spin::Mutex<Option<Arc<GlobalConfig>>> = spin::Mutex::new(None);

/// The global configuration of kerntune.
#[derive(Default, Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct GlobalConfig {
    /// Configuration of the tuning loop.
    #[serde(default)]
    pub tune: TuneConfig,
}

impl GlobalConfig {
    /// Retrieves the current global configuration, loading it from the current directory if not set.
    ///
    /// If no configuration is set, it attempts to load one from `kerntune.toml` or `KernTune.toml` in
    /// the current directory or its parents. If no file is found, a default configuration is used.
    /// Environment variables are applied last.
    pub fn get() -> Arc<Self> {
        let mut state = KERNTUNE_GLOBAL_CONFIG.lock();

        match state.as_ref() {
            Some(config) => config.clone(),
            None => {
                let config = Arc::new(Self::from_current_dir().override_from_env());
                *state = Some(config.clone());
                config
            }
        }
    }

    /// Save the current configuration to the provided file path.
    pub fn save_default<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
        let config = Self::get();
        let content = toml::to_string_pretty(config.as_ref())
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        std::fs::write(path, content)
    }

    /// Sets the global configuration to the provided value.
    ///
    /// # Panics
    /// Panics if the configuration has already been set or read, as it cannot be overridden.
    pub fn set(config: Self) {
        let mut state = KERNTUNE_GLOBAL_CONFIG.lock();
        if state.is_some() {
            panic!("Cannot set the global configuration multiple times.");
        }
        *state = Some(Arc::new(config));
    }

    /// Overrides configuration fields based on environment variables.
    ///
    /// - `KERNTUNE_LOG`: `stdout`, `stderr`, `1`/`true` (`/tmp/kerntune.log`), `0`/`false` or a
    ///   file path.
    /// - `KERNTUNE_LEVEL`: `simple`, `intermediate` or `full`.
    /// - `KERNTUNE_SEED`: an integer, or `random` for a fresh seed.
    pub fn override_from_env(self) -> Self {
        self.override_with(|key| std::env::var(key).ok())
    }

    /// Overrides configuration fields from the variables returned by `lookup`.
    pub fn override_with<F: Fn(&str) -> Option<String>>(mut self, lookup: F) -> Self {
        let logger = &mut self.tune.logger;

        if let Some(val) = lookup("KERNTUNE_LOG") {
            logger.level = TuneLogLevel::Full;

            match val.as_str() {
                "stdout" => logger.stdout = true,
                "stderr" => logger.stderr = true,
                "1" | "true" => logger.file = Some("/tmp/kerntune.log".into()),
                "0" | "false" => logger.level = TuneLogLevel::Disabled,
                file_path => logger.file = Some(file_path.into()),
            }
        }

        if let Some(val) = lookup("KERNTUNE_LEVEL") {
            match val.parse::<TuneLevel>() {
                Ok(level) => self.tune.level = level,
                Err(err) => log::warn!("Ignoring KERNTUNE_LEVEL ({err})."),
            }
        }

        if let Some(val) = lookup("KERNTUNE_SEED") {
            match val.as_str() {
                "random" => self.tune.seed = kerntune_common::rand::gen_seed(),
                seed => match seed.parse::<u64>() {
                    Ok(seed) => self.tune.seed = seed,
                    Err(err) => log::warn!("Ignoring KERNTUNE_SEED ({err})."),
                },
            }
        }

        self
    }

    /// Loads configuration from `kerntune.toml` or `KernTune.toml` in the current directory or its
    /// parents.
    pub fn from_current_dir() -> Self {
        let Ok(mut dir) = std::env::current_dir() else {
            return Self::default();
        };

        loop {
            for name in ["kerntune.toml", "KernTune.toml"] {
                let path = dir.join(name);
                if path.is_file() {
                    return Self::from_file_path(&path);
                }
            }

            if !dir.pop() {
                break;
            }
        }

        Self::default()
    }

    /// Loads configuration from a file, falling back to the default configuration when the file
    /// can't be read or parsed.
    pub fn from_file_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                log::warn!("Unable to read config {path:?} ({err}).");
                return Self::default();
            }
        };

        match toml::from_str(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("The file {path:?} doesn't have the right format, using defaults ({err}).");
                Self::default()
            }
        }
    }
}
