//! Load config from file and environment.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde::Deserialize;
use souliss_core::GatewayConfig;
use tracing::{info, warn};

/// Daemon configuration. File: ~/.config/souliss/config.toml or /etc/souliss/config.toml.
/// Env overrides: SOULISS_GATEWAY_ADDRESS, SOULISS_GATEWAY_PORT, SOULISS_SECURE_SEND,
/// SOULISS_DISCOVERY.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    /// Run a discovery scan at startup.
    #[serde(default)]
    pub discovery: bool,
    pub gateway: GatewayConfig,
}

/// Load config: `path` or the first existing default file, then env vars.
pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let mut c = match path {
        Some(p) => Some(read(p)?),
        None => match config_paths().into_iter().find(|p| p.exists()) {
            Some(p) => Some(read(&p)?),
            None => None,
        },
    };

    if let Ok(address) = std::env::var("SOULISS_GATEWAY_ADDRESS") {
        match c.as_mut() {
            Some(c) => c.gateway.gateway_lan_address = address,
            None => {
                c = Some(Config {
                    discovery: false,
                    gateway: GatewayConfig::new(address),
                })
            }
        }
    }
    let Some(mut c) = c else {
        bail!("no configuration file found and SOULISS_GATEWAY_ADDRESS is not set");
    };

    if let Some(port) = env_parsed::<u16>("SOULISS_GATEWAY_PORT") {
        c.gateway.gateway_port = port;
    }
    if let Some(secure) = env_parsed::<bool>("SOULISS_SECURE_SEND") {
        c.gateway.secure_send = secure;
    }
    if let Some(discovery) = env_parsed::<bool>("SOULISS_DISCOVERY") {
        c.discovery = discovery;
    }
    Ok(c)
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    let s = std::env::var(key).ok()?;
    match s.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring {key}={s:?}: cannot parse");
            None
        }
    }
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/souliss/config.toml"));
    }
    out.push(PathBuf::from("/etc/souliss/config.toml"));
    out
}

fn read(path: &Path) -> anyhow::Result<Config> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let c = parse(&s).with_context(|| format!("parsing {}", path.display()))?;
    info!("configuration loaded from {}", path.display());
    Ok(c)
}

fn parse(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str(s)
}
