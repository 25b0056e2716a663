use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::decode::DecoderKind;
use crate::project::{Column, ColumnSet, Stat};

/// Top-level configuration for the dashboard.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Broker address as `host:port`. Default: "127.0.0.1:8080".
    #[serde(default = "default_broker")]
    pub broker: String,

    /// Subscription key; nodes publish under `{key}/{channel}`.
    #[serde(default)]
    pub key: String,

    /// Channel suffix appended to the key. Default: "stats/".
    #[serde(default = "default_channel")]
    pub channel: String,

    /// Redraw period. Default: 100ms.
    #[serde(default = "default_period", with = "humantime_serde")]
    pub period: Duration,

    /// Limit on each broker connect and handshake. Default: 5s.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Payload wire shape. Default: binary.
    #[serde(default)]
    pub decoder: DecoderKind,

    /// Header of the node identity column. Default: "Addr".
    #[serde(default = "default_identity_header")]
    pub identity_header: String,

    /// Column layout. Default: the built-in v1 layout.
    #[serde(default)]
    pub columns: Option<Vec<Column>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker: default_broker(),
            key: String::new(),
            channel: default_channel(),
            period: default_period(),
            connect_timeout: default_connect_timeout(),
            decoder: DecoderKind::default(),
            identity_header: default_identity_header(),
            columns: None,
        }
    }
}

fn default_broker() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_channel() -> String {
    "stats/".to_string()
}

fn default_period() -> Duration {
    Duration::from_millis(100)
}

fn default_connect_timeout() -> Duration {
    crate::transport::DEFAULT_CONNECT_TIMEOUT
}

fn default_identity_header() -> String {
    "Addr".to_string()
}

impl Config {
    /// Loads a YAML configuration file. Validation is left to the caller so
    /// command-line overrides can be applied first.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        Ok(cfg)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.broker.trim().is_empty() {
            bail!("broker is required");
        }

        if self.key.trim().is_empty() {
            bail!("key is required");
        }

        if self.channel.is_empty() {
            bail!("channel must not be empty");
        }

        if self.period.is_zero() {
            bail!("period must be positive");
        }

        if self.connect_timeout.is_zero() {
            bail!("connect_timeout must be positive");
        }

        if self.identity_header.is_empty() {
            bail!("identity_header must not be empty");
        }

        if let Some(columns) = &self.columns {
            if columns.is_empty() {
                bail!("columns must not be empty when set");
            }

            for (i, column) in columns.iter().enumerate() {
                validate_column(column).with_context(|| format!("columns[{i}]"))?;
            }
        }

        Ok(())
    }

    /// Column layout to render: the configured columns or v1.
    pub fn column_set(&self) -> ColumnSet {
        match &self.columns {
            Some(columns) => ColumnSet::new(&self.identity_header, columns.clone()),
            None => {
                let mut set = ColumnSet::v1();
                set.identity_header = self.identity_header.clone();
                set
            }
        }
    }
}

fn validate_column(column: &Column) -> Result<()> {
    if column.header.is_empty() {
        bail!("header must not be empty");
    }

    if column.parts.is_empty() {
        bail!("column {} has no parts", column.header);
    }

    for part in &column.parts {
        if part.metric.is_empty() {
            bail!("column {} has a part without a metric", column.header);
        }

        if !(part.scale.is_finite() && part.scale > 0.0) {
            bail!(
                "column {} part {}: scale must be a positive number, got {}",
                column.header,
                part.metric,
                part.scale,
            );
        }

        if let Stat::Quantile(p) = part.stat {
            if !(p > 0.0 && p <= 100.0) {
                bail!(
                    "column {} part {}: quantile {p} must be within (0, 100]",
                    column.header,
                    part.metric,
                );
            }
        }
    }

    Ok(())
}
