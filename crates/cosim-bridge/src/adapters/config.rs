//! TOML bridge configuration.
//!
//! # Config File Format
//!
//! ```toml
//! [rate]
//! rate = 10.0
//! time_unit = 0.001
//!
//! [[output_vars]]
//! port_number = 5557
//! sample_period = 1.0
//! flush_period = 5.0
//! bindings = [{ group = 1, var = "cell0.v", weight = 888.0 }]
//!
//! [[output_events]]
//! port_number = 5558
//! use_icp = false
//! sources = [{ group = 1, var = "cell0.spike" }]
//!
//! [[inputs]]
//! port_number = 5559
//! blocking_socket = true
//! bindings = [{ group = 1, var = "cell0.i_ext" }]
//! ```
//!
//! Variable names are opaque here; the embedding resolves them to handles
//! in [`TomlBridgeConfig::build_bridge`].

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::{GroupId, PortConfig, PortConfigBuilder, RateConfig, VarHandle};
use crate::error::{ConfigurationError, Result};
use crate::ports::CoSimApi;
use crate::service::CoSimBridge;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    rate: Option<RateFile>,
    #[serde(default)]
    output_vars: Vec<PortFile>,
    #[serde(default)]
    output_events: Vec<PortFile>,
    #[serde(default)]
    inputs: Vec<PortFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RateFile {
    rate: f64,
    time_unit: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PortFile {
    port_number: i64,
    host: Option<String>,
    blocking_socket: Option<bool>,
    use_icp: Option<bool>,
    sample_period: Option<f64>,
    flush_period: Option<f64>,
    max_buffered_samples: Option<usize>,
    max_messages_per_step: Option<usize>,
    connect_timeout_ms: Option<u64>,
    #[serde(default, alias = "sources")]
    bindings: Vec<VarBinding>,
}

/// One `{ group, var, weight }` entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VarBinding {
    pub group: GroupId,
    pub var: String,
    pub weight: Option<f64>,
}

/// A validated port table with its bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct PortSection {
    pub config: PortConfig,
    pub bindings: Vec<VarBinding>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TomlBridgeConfig {
    pub rate: Option<RateConfig>,
    pub output_vars: Vec<PortSection>,
    pub output_events: Vec<PortSection>,
    pub inputs: Vec<PortSection>,
}

impl TomlBridgeConfig {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> std::result::Result<Self, ConfigurationError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigurationError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> std::result::Result<Self, ConfigurationError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| ConfigurationError::Parse(e.to_string()))?;

        let rate = file
            .rate
            .map(|r| {
                RateConfig::new(
                    r.rate,
                    r.time_unit.unwrap_or(RateConfig::default().time_unit),
                )
            })
            .transpose()?;

        Ok(Self {
            rate,
            output_vars: sections(file.output_vars, PortConfigBuilder::build)?,
            output_events: sections(file.output_events, PortConfigBuilder::build)?,
            inputs: sections(file.inputs, PortConfigBuilder::build_for_subscriber)?,
        })
    }

    /// Every variable name referenced by any port.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.output_vars
            .iter()
            .chain(&self.output_events)
            .chain(&self.inputs)
            .flat_map(|section| section.bindings.iter().map(|b| b.var.as_str()))
    }

    /// Build the bridge over TCP and bind every listed variable.
    ///
    /// `resolve` maps a variable name to its handle in the embedding's store.
    pub fn build_bridge<F>(&self, mut resolve: F) -> Result<CoSimBridge>
    where
        F: FnMut(&str) -> Option<VarHandle>,
    {
        let mut bridge = match self.rate {
            Some(rate) => CoSimBridge::new().with_rate(rate),
            None => CoSimBridge::new(),
        };

        for section in &self.output_vars {
            let port = bridge.add_output_vars(section.config.clone())?;
            bind_all(&mut bridge, port, &section.bindings, &mut resolve, true)?;
        }
        for section in &self.output_events {
            let port = bridge.add_output_events(section.config.clone())?;
            bind_all(&mut bridge, port, &section.bindings, &mut resolve, false)?;
        }
        for section in &self.inputs {
            let port = bridge.add_input(section.config.clone())?;
            bind_all(&mut bridge, port, &section.bindings, &mut resolve, false)?;
        }
        Ok(bridge)
    }
}

fn sections(
    ports: Vec<PortFile>,
    build: fn(PortConfigBuilder) -> std::result::Result<PortConfig, ConfigurationError>,
) -> std::result::Result<Vec<PortSection>, ConfigurationError> {
    ports
        .into_iter()
        .map(|file| {
            let mut builder = PortConfigBuilder::from_raw_port(file.port_number);
            if let Some(host) = file.host {
                builder = builder.host(host);
            }
            if let Some(blocking) = file.blocking_socket {
                builder = builder.blocking_socket(blocking);
            }
            if let Some(use_icp) = file.use_icp {
                builder = builder.use_icp(use_icp);
            }
            if let Some(period) = file.sample_period {
                builder = builder.sample_period(period);
            }
            if let Some(period) = file.flush_period {
                builder = builder.flush_period(period);
            }
            if let Some(max) = file.max_buffered_samples {
                builder = builder.max_buffered_samples(max);
            }
            if let Some(max) = file.max_messages_per_step {
                builder = builder.max_messages_per_step(max);
            }
            if let Some(ms) = file.connect_timeout_ms {
                builder = builder.connect_timeout(Duration::from_millis(ms));
            }
            Ok(PortSection {
                config: build(builder)?,
                bindings: file.bindings,
            })
        })
        .collect()
}

fn bind_all<F>(
    bridge: &mut CoSimBridge,
    port: crate::service::PortId,
    bindings: &[VarBinding],
    resolve: &mut F,
    weighted: bool,
) -> Result<()>
where
    F: FnMut(&str) -> Option<VarHandle>,
{
    for binding in bindings {
        let handle = resolve(&binding.var)
            .ok_or_else(|| ConfigurationError::UnknownVariable(binding.var.clone()))?;
        let weight = if weighted { binding.weight } else { None };
        bridge.bind_scalar(port, binding.group, handle, weight)?;
    }
    Ok(())
}
