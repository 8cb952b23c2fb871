use std::time::Duration;

use anyhow::{Context, Result};

/// Demo parameters, overridable through `HIDINGIN_*` environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Synthetic capture sources (the first is the desktop).
    pub sources: usize,
    pub interval_ms: u64,
    pub run_for: Duration,
    /// Render on the main thread through the in-place queue.
    pub render_in_place: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            sources: 2,
            interval_ms: 16,
            run_for: Duration::from_secs(3),
            render_in_place: false,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();
        if let Some(sources) = env_number("HIDINGIN_SOURCES")? {
            anyhow::ensure!(sources > 0, "HIDINGIN_SOURCES must be at least 1");
            settings.sources = sources as usize;
        }
        if let Some(interval) = env_number("HIDINGIN_INTERVAL_MS")? {
            settings.interval_ms = interval;
        }
        if let Some(secs) = env_number("HIDINGIN_RUN_SECS")? {
            settings.run_for = Duration::from_secs(secs);
        }
        settings.render_in_place = std::env::var_os("HIDINGIN_RENDER_IN_PLACE").is_some();
        Ok(settings)
    }
}

fn env_number(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name}={value:?} is not a number")),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("failed to read {name}")),
    }
}
