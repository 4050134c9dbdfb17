use std::{ffi::OsString, io, time::Duration};

use clap::Parser;
use regex::{NoExpand, Regex};
use url::Url;

use crate::{error::ConfigError, sender::FlushPolicy};

pub const ENV_PREFIX: &str = "SURREALLOG_";

const DEFAULT_NAME: &str = "{{ hostname }}";

#[derive(Debug, Parser)]
#[command(name = "surreallog", version)]
#[command(about = "Run a command and stream its output to SurrealDB")]
pub struct Cli {
    /// Websocket RPC endpoint, e.g. `ws://localhost:8000/rpc`.
    #[arg(long, env = "SURREALLOG_ENDPOINT")]
    pub endpoint: Url,

    #[arg(long, env = "SURREALLOG_USER")]
    pub user: String,

    #[arg(long, env = "SURREALLOG_PASS", hide_env_values = true)]
    pub pass: String,

    #[arg(long, env = "SURREALLOG_NAMESPACE")]
    pub namespace: String,

    /// Database name. `{{ hostname }}` expands to this machine's hostname.
    #[arg(long, env = "SURREALLOG_NAME", default_value = DEFAULT_NAME)]
    pub name: String,

    /// Flush buffered output after this long without new lines.
    #[arg(
        long,
        env = "SURREALLOG_CHUNK_DURATION",
        default_value = "2s",
        value_parser = humantime::parse_duration
    )]
    pub chunk_duration: Duration,

    /// Flush as soon as buffered output reaches this size (e.g. `512KiB`, `1MB`).
    #[arg(
        long,
        env = "SURREALLOG_MAX_BUFFER_SIZE",
        default_value = "1MiB",
        value_parser = parse_byte_size
    )]
    pub max_buffer_size: u64,

    /// Tracing filter for surreallog's own diagnostics.
    #[arg(long, env = "SURREALLOG_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Program to run, followed by its arguments.
    #[arg(
        required = true,
        num_args = 1..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<OsString>,
}

/// Validated settings for one run.
#[derive(Debug, Clone)]
pub struct Options {
    pub endpoint: Url,
    pub user: String,
    pub pass: String,
    pub namespace: String,
    pub database: String,
    pub flush: FlushPolicy,
    pub command: Vec<OsString>,
}

impl Cli {
    pub fn into_options(self) -> Result<Options, ConfigError> {
        self.into_options_with(|| hostname::get().map(|name| name.to_string_lossy().into_owned()))
    }

    fn into_options_with(
        self,
        hostname: impl FnOnce() -> io::Result<String>,
    ) -> Result<Options, ConfigError> {
        for (field, value) in [
            ("user", &self.user),
            ("pass", &self.pass),
            ("namespace", &self.namespace),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Empty(field));
            }
        }
        if self.command.is_empty() {
            return Err(ConfigError::MissingCommand);
        }

        let name = if self.name.trim().is_empty() {
            DEFAULT_NAME
        } else {
            self.name.as_str()
        };
        let database = expand_hostname(name, hostname)?;

        Ok(Options {
            endpoint: self.endpoint,
            user: self.user,
            pass: self.pass,
            namespace: self.namespace,
            database,
            flush: FlushPolicy {
                idle: self.chunk_duration,
                max_buffer_bytes: self.max_buffer_size,
            },
            command: self.command,
        })
    }
}

/// Replaces every `{{ hostname }}` placeholder (inner whitespace optional).
/// `hostname` is only consulted when a placeholder is present.
pub fn expand_hostname(
    name: &str,
    hostname: impl FnOnce() -> io::Result<String>,
) -> Result<String, ConfigError> {
    let placeholder = Regex::new(r"\{\{\s*hostname\s*\}\}").map_err(ConfigError::Pattern)?;
    if !placeholder.is_match(name) {
        return Ok(name.to_string());
    }
    let host = hostname().map_err(ConfigError::Hostname)?;
    Ok(placeholder.replace_all(name, NoExpand(&host)).into_owned())
}

/// Parses `1048576`, `1MiB`, `1.5 MB`, `64k` and similar. Decimal units are
/// powers of 1000, `i` units powers of 1024; units are case-insensitive.
pub fn parse_byte_size(raw: &str) -> Result<u64, String> {
    let trimmed = raw.trim();
    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let number: f64 = number
        .parse()
        .map_err(|_| format!("invalid byte size {raw:?}"))?;

    const KB: u64 = 1000;
    const KIB: u64 = 1024;
    let multiplier = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" => KB,
        "ki" | "kib" => KIB,
        "m" | "mb" => KB.pow(2),
        "mi" | "mib" => KIB.pow(2),
        "g" | "gb" => KB.pow(3),
        "gi" | "gib" => KIB.pow(3),
        other => return Err(format!("unknown byte size unit {other:?} in {raw:?}")),
    };

    let bytes = number * multiplier as f64;
    if !bytes.is_finite() || bytes >= u64::MAX as f64 {
        return Err(format!("byte size {raw:?} is too large"));
    }
    Ok(bytes as u64)
}
