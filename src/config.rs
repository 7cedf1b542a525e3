use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::session::ControllerOptions;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub step_delay: Duration,
    /// `None` scans whole files.
    pub scan_cap: Option<usize>,
    pub count_on_start: bool,
    /// Steps run on a timer; otherwise clients call `stepOnce`.
    pub timer_driver: bool,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let data_dir = PathBuf::from(env::var("DATA_DIR").context("DATA_DIR must be set")?);
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        let scan_cap = match parse_var("FOLIO_SCAN_CAP", 50_000usize)? {
            0 => None,
            cap => Some(cap),
        };

        Ok(Self {
            data_dir,
            database_url,
            host: env::var("FOLIO_HOST").unwrap_or("0.0.0.0".to_string()),
            port: parse_var("FOLIO_PORT", 8000)?,
            step_delay: Duration::from_secs(parse_var("FOLIO_STEP_DELAY_SECS", 2)?),
            scan_cap,
            count_on_start: parse_var("FOLIO_COUNT_ON_START", true)?,
            timer_driver: parse_var("FOLIO_TIMER_DRIVER", true)?,
        })
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.data_dir.join("sources")
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            step_delay: self.step_delay,
            count_on_start: self.count_on_start,
            ..Default::default()
        }
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid value for {name}: {raw:?}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variables_fall_back_to_defaults() {
        assert_eq!(parse_var("FOLIO_TEST_UNSET_PORT", 8000u16).unwrap(), 8000);
        assert!(parse_var("FOLIO_TEST_UNSET_FLAG", true).unwrap());
    }

    #[test]
    fn malformed_values_are_rejected() {
        env::set_var("FOLIO_TEST_BAD_PORT", "eighty");
        let err = parse_var("FOLIO_TEST_BAD_PORT", 8000u16).unwrap_err();
        assert!(err.to_string().contains("FOLIO_TEST_BAD_PORT"));
    }
}
