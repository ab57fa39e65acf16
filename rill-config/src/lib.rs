//! Configuration for the rill compositor core.
//!
//! The config is a KDL document. Every section is optional; missing values fall back to the
//! defaults exposed through the accessor methods.

#[macro_use]
extern crate tracing;

use std::ffi::OsStr;
use std::fs;
use std::path::Path;
use std::time::Duration;

use miette::{IntoDiagnostic as _, WrapErr as _};

pub mod appearance;
pub mod output;
pub mod utils;

pub use crate::appearance::Color;
pub use crate::output::Output;
pub use crate::utils::FloatOrInt;

/// Layout namespace used when neither the output nor the config names one.
pub const DEFAULT_LAYOUT_NAMESPACE: &str = "rivertile";

/// How long the transaction coordinator waits for clients before forcing a commit.
pub const DEFAULT_TRANSACTION_TIMEOUT_MS: u32 = 200;

/// How long locking waits for lock surfaces before blanking the outputs.
pub const DEFAULT_LOCK_SURFACE_TIMEOUT_MS: u32 = 1000;

#[derive(knuffel::Decode, Debug, Default, Clone, PartialEq)]
pub struct Config {
    #[knuffel(child, default)]
    pub layout: Layout,
    #[knuffel(child, default)]
    pub transactions: Transactions,
    #[knuffel(child, default)]
    pub lock: Lock,
    #[knuffel(children(name = "output"))]
    pub outputs: Vec<Output>,
}

#[derive(knuffel::Decode, Debug, Default, Clone, PartialEq)]
pub struct Layout {
    #[knuffel(child, unwrap(argument))]
    pub default_namespace: Option<String>,
}

#[derive(knuffel::Decode, Debug, Default, Clone, PartialEq)]
pub struct Transactions {
    #[knuffel(child, unwrap(argument))]
    pub timeout_ms: Option<u32>,
}

#[derive(knuffel::Decode, Debug, Default, Clone, PartialEq)]
pub struct Lock {
    #[knuffel(child, unwrap(argument, str))]
    pub color: Option<Color>,
    #[knuffel(child, unwrap(argument))]
    pub surface_timeout_ms: Option<u32>,
}

impl Config {
    pub fn load(path: &Path) -> miette::Result<Self> {
        let contents = fs::read_to_string(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("error reading {path:?}"))?;

        let filename = path
            .file_name()
            .and_then(OsStr::to_str)
            .unwrap_or("config.kdl");
        let config = Self::parse(filename, &contents).wrap_err("error parsing")?;
        debug!("loaded config from {path:?}");
        Ok(config)
    }

    pub fn parse(filename: &str, text: &str) -> Result<Self, knuffel::Error> {
        let _span = tracy_client::span!("Config::parse");
        knuffel::parse(filename, text)
    }

    /// Returns the config block for the output with this connector name.
    pub fn output(&self, name: &str) -> Option<&Output> {
        self.outputs
            .iter()
            .find(|output| output.name.eq_ignore_ascii_case(name))
    }
}

impl Layout {
    pub fn default_namespace(&self) -> &str {
        self.default_namespace
            .as_deref()
            .unwrap_or(DEFAULT_LAYOUT_NAMESPACE)
    }
}

impl Transactions {
    pub fn timeout(&self) -> Duration {
        let ms = self.timeout_ms.unwrap_or(DEFAULT_TRANSACTION_TIMEOUT_MS);
        Duration::from_millis(u64::from(ms))
    }
}

impl Lock {
    pub fn color(&self) -> Color {
        self.color.unwrap_or(Color::BLACK)
    }

    pub fn surface_timeout(&self) -> Duration {
        let ms = self
            .surface_timeout_ms
            .unwrap_or(DEFAULT_LOCK_SURFACE_TIMEOUT_MS);
        Duration::from_millis(u64::from(ms))
    }
}
