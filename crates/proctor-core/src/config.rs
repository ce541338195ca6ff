//! Lockdown configuration loaded from `config/proctor.toml` and the environment.
//!
//! | Key / Env | Default | Description |
//! |-----------|---------|-------------|
//! | max_warnings / PROCTOR__MAX_WARNINGS | 3 | Violations before the exam is auto-submitted. |
//! | retry_delay_ms / PROCTOR__RETRY_DELAY_MS | 50 | Delay between rejected fullscreen requests. |
//! | sweep_interval_ms / PROCTOR__SWEEP_INTERVAL_MS | 1000 | Background fullscreen re-check period. |
//! | devtools_interval_ms / PROCTOR__DEVTOOLS_INTERVAL_MS | 1000 | Inspector heuristic sampling period. |
//! | devtools_threshold_px / PROCTOR__DEVTOOLS_THRESHOLD_PX | 160 | Outer-vs-inner viewport gap treated as a docked inspector. |
//! | devtools_consecutive_samples | 1 | Over-threshold samples in a row before firing. |
//! | submit_selector / PROCTOR__SUBMIT_SELECTOR | #submit-exam-btn | Element activated when the ledger trips. |
//! | time_limit_secs / PROCTOR__TIME_LIMIT_SECS | unset | Optional exam duration; submits on expiry. |
//! | profile / PROCTOR__PROFILE | exam | Input rule set: `exam` or `login`. |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LockdownError, LockdownResult};
use crate::input_guard::Profile;

/// Env var naming an alternate config file (without extension is fine).
pub const CONFIG_PATH_ENV: &str = "PROCTOR_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/proctor.toml";

fn default_max_warnings() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    50
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_threshold_px() -> u32 {
    160
}

fn default_consecutive_samples() -> u32 {
    1
}

fn default_submit_selector() -> String {
    "#submit-exam-btn".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockdownConfig {
    #[serde(default = "default_max_warnings")]
    pub max_warnings: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub sweep_interval_ms: u64,
    #[serde(default = "default_interval_ms")]
    pub devtools_interval_ms: u64,
    #[serde(default = "default_threshold_px")]
    pub devtools_threshold_px: u32,
    #[serde(default = "default_consecutive_samples")]
    pub devtools_consecutive_samples: u32,
    #[serde(default = "default_submit_selector")]
    pub submit_selector: String,
    #[serde(default)]
    pub time_limit_secs: Option<u64>,
    #[serde(default)]
    pub profile: Profile,
}

impl Default for LockdownConfig {
    fn default() -> Self {
        Self {
            max_warnings: default_max_warnings(),
            retry_delay_ms: default_retry_delay_ms(),
            sweep_interval_ms: default_interval_ms(),
            devtools_interval_ms: default_interval_ms(),
            devtools_threshold_px: default_threshold_px(),
            devtools_consecutive_samples: default_consecutive_samples(),
            submit_selector: default_submit_selector(),
            time_limit_secs: None,
            profile: Profile::default(),
        }
    }
}

impl LockdownConfig {
    /// Load config from file and environment. Precedence: `PROCTOR__*` env > file > defaults.
    /// The file is `$PROCTOR_CONFIG` when set, else `config/proctor.toml`; a missing file is not an error.
    pub fn load() -> LockdownResult<Self> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(Path::new(&config_path))
    }

    pub fn load_from(path: &Path) -> LockdownResult<Self> {
        let defaults = Self::default();
        let builder = config::Config::builder()
            .set_default("max_warnings", i64::from(defaults.max_warnings))?
            .set_default("retry_delay_ms", defaults.retry_delay_ms as i64)?
            .set_default("sweep_interval_ms", defaults.sweep_interval_ms as i64)?
            .set_default("devtools_interval_ms", defaults.devtools_interval_ms as i64)?
            .set_default("devtools_threshold_px", i64::from(defaults.devtools_threshold_px))?
            .set_default(
                "devtools_consecutive_samples",
                i64::from(defaults.devtools_consecutive_samples),
            )?
            .set_default("submit_selector", defaults.submit_selector)?
            .set_default("profile", "exam")?;

        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(config::Environment::with_prefix("PROCTOR").separator("__"))
            .build()?;

        let cfg: Self = built.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would disable enforcement or spin the event loop.
    pub fn validate(&self) -> LockdownResult<()> {
        if self.max_warnings == 0 {
            return Err(LockdownError::Config("max_warnings must be at least 1".to_string()));
        }
        if self.retry_delay_ms == 0 || self.sweep_interval_ms == 0 || self.devtools_interval_ms == 0 {
            return Err(LockdownError::Config(
                "retry and sampling intervals must be non-zero".to_string(),
            ));
        }
        if self.devtools_threshold_px == 0 {
            return Err(LockdownError::Config(
                "devtools_threshold_px must be non-zero".to_string(),
            ));
        }
        if self.submit_selector.trim().is_empty() {
            return Err(LockdownError::Config("submit_selector is empty".to_string()));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    pub fn devtools_interval(&self) -> Duration {
        Duration::from_millis(self.devtools_interval_ms)
    }

    pub fn time_limit(&self) -> Option<Duration> {
        self.time_limit_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }
}
