use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

use crate::config::{BridgeConfig, TransportPolicy};
use crate::constants::PORT_FLAG;
use crate::error::Result;

#[derive(Parser, Debug)]
#[command(name = "jsbridge", author, version, about, long_about = None)]
pub struct Args {
    /// Port to run jsbridge on.
    #[arg(long = "jsbridge", value_name = "PORT", allow_hyphen_values = true)]
    pub port: Option<String>,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Append lifecycle diagnostics to this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Use the threaded socket listener only
    #[arg(long)]
    pub fallback_only: bool,
}

/// Rewrites the host's single-dash `-jsbridge` flag into the `--jsbridge` form.
pub fn normalize_host_flags<I, S>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let single = format!("-{}", PORT_FLAG);
    let single_eq = format!("-{}=", PORT_FLAG);

    args.into_iter()
        .map(|arg| {
            let arg: OsString = arg.into();
            match arg.to_str() {
                Some(s) if s == single || s.starts_with(&single_eq) => {
                    OsString::from(format!("-{}", s))
                }
                _ => arg,
            }
        })
        .collect()
}

impl Args {
    pub fn parse_host() -> Self {
        Self::parse_from(normalize_host_flags(std::env::args_os()))
    }

    pub fn try_parse_host_from<I, S>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self::try_parse_from(normalize_host_flags(args))
    }

    /// Loads the optional config file and applies command-line overrides.
    pub fn into_config(self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::load(path)?,
            None => BridgeConfig::default(),
        };

        if self.port.is_some() {
            config.port = self.port;
        }
        if self.log_file.is_some() {
            config.log_file = self.log_file;
        }
        if self.fallback_only {
            config.transport = TransportPolicy::FallbackOnly;
        }
        Ok(config)
    }
}
