use std::path::{Path, PathBuf};
use std::time::Duration;
use dotenv::var;
use eyre::WrapErr;
use serde::{Serialize, Deserialize};
use parlcd_gpio::GpioActiveLevel;
use parlcd_gpio::lcd::hd44780::driver::{
    DriverConfig, TimingMode, DEFAULT_LINE_WIDTH, DEFAULT_SETTLE_DURATION,
};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Delay after each character and delayed instruction, in microseconds.
    pub settle_micros: u64,
    pub line_width: usize,
    /// Use the corrected timing instead of the established one.
    pub strict_timing: bool,
    pub show_cursor: bool,
    /// The display is wired through inverting buffers: drive every line active-low.
    pub active_low: bool,
    /// Lines printed after start-up.
    pub lines: Vec<String>,
}

impl Config {
    fn path() -> PathBuf {
        PathBuf::from(var("CONFIG_FILE").unwrap_or_else(|_| "config.json".to_string()))
    }

    /// Loads the config from `CONFIG_FILE` (default `config.json`).
    ///
    /// Returns `Ok(None)` only if the file does not exist; a file that can't be read or parsed
    /// is an error, so it never gets replaced by the defaults.
    pub fn try_load() -> eyre::Result<Option<Self>> {
        Self::load_from(&Self::path())
    }

    pub fn load_from(config_path: &Path) -> eyre::Result<Option<Self>> {
        if !config_path.exists() {
            return Ok(None);
        }
        let file = std::fs::File::open(config_path)
            .wrap_err_with(|| format!("Failed to open {}", config_path.display()))?;
        let reader = std::io::BufReader::new(file);
        let config: Self = serde_json::from_reader(reader)
            .wrap_err_with(|| format!("Failed to parse {}", config_path.display()))?;
        Ok(Some(config))
    }

    pub fn save(&self) -> std::io::Result<()> {
        self.save_to(&Self::path())
    }

    pub fn save_to(&self, config_path: &Path) -> std::io::Result<()> {
        let file = std::fs::File::create(config_path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn active_level(&self) -> GpioActiveLevel {
        if self.active_low {
            GpioActiveLevel::Low
        } else {
            GpioActiveLevel::High
        }
    }

    pub fn driver_config(&self) -> DriverConfig {
        DriverConfig {
            settle_duration: Duration::from_micros(self.settle_micros),
            line_width: self.line_width,
            timing: if self.strict_timing {
                TimingMode::Strict
            } else {
                TimingMode::Faithful
            },
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            settle_micros: DEFAULT_SETTLE_DURATION.as_micros() as u64,
            line_width: DEFAULT_LINE_WIDTH,
            strict_timing: false,
            show_cursor: false,
            active_low: false,
            lines: vec!["Hello World".to_string()],
        }
    }
}
