use anyhow::Result;
use packing_core::{load_file, CatalogEntry, EngineConfig, ReferenceData, ShippingFeeRule};
use std::env;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing::warn;

/// Server settings, loaded from environment variables or default values.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    bind_ip: IpAddr,
    port: u16,
    fee_table: Option<PathBuf>,
    catalog: Option<PathBuf>,
    engine: Option<PathBuf>,
}

impl ApiConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 3000;

    const HOST_VAR: &'static str = "PACKING_API_HOST";
    const PORT_VAR: &'static str = "PACKING_API_PORT";
    const FEE_TABLE_VAR: &'static str = "PACKING_FEE_TABLE";
    const CATALOG_VAR: &'static str = "PACKING_CATALOG";
    const CONFIG_VAR: &'static str = "PACKING_CONFIG";

    pub fn from_env() -> Self {
        Self {
            bind_ip: parse_host(env_string(Self::HOST_VAR).as_deref()),
            port: parse_port(env_string(Self::PORT_VAR).as_deref()),
            fee_table: env_string(Self::FEE_TABLE_VAR).map(PathBuf::from),
            catalog: env_string(Self::CATALOG_VAR).map(PathBuf::from),
            engine: env_string(Self::CONFIG_VAR).map(PathBuf::from),
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Loads the rate table and catalog. A missing path leaves that table
    /// empty; an unreadable file is an error.
    pub fn load_reference(&self) -> Result<ReferenceData> {
        let fee_table: Vec<ShippingFeeRule> = match &self.fee_table {
            Some(path) => load_file(path)?,
            None => {
                warn!(
                    "{} is not set; every box will need manual pricing",
                    Self::FEE_TABLE_VAR
                );
                Vec::new()
            }
        };
        let catalog: Vec<CatalogEntry> = match &self.catalog {
            Some(path) => load_file(path)?,
            None => {
                warn!(
                    "{} is not set; design codes will print as unregistered",
                    Self::CATALOG_VAR
                );
                Vec::new()
            }
        };
        Ok(ReferenceData::new(fee_table, catalog))
    }

    pub fn load_engine_config(&self) -> Result<EngineConfig> {
        match &self.engine {
            Some(path) => Ok(load_file(path)?),
            None => Ok(EngineConfig::default()),
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_host(raw: Option<&str>) -> IpAddr {
    let default = IpAddr::from([0, 0, 0, 0]);
    match raw {
        Some(value) => value.parse::<IpAddr>().unwrap_or_else(|err| {
            warn!(
                "Could not parse {} ('{}'): {}. Using {}.",
                ApiConfig::HOST_VAR,
                value,
                err,
                ApiConfig::DEFAULT_HOST
            );
            default
        }),
        None => default,
    }
}

fn parse_port(raw: Option<&str>) -> u16 {
    match raw {
        Some(value) => match value.parse::<u16>() {
            Ok(port) if port != 0 => port,
            Ok(_) => {
                warn!(
                    "{} must not be 0. Using {}.",
                    ApiConfig::PORT_VAR,
                    ApiConfig::DEFAULT_PORT
                );
                ApiConfig::DEFAULT_PORT
            }
            Err(err) => {
                warn!(
                    "Could not parse {} ('{}'): {}. Using {}.",
                    ApiConfig::PORT_VAR,
                    value,
                    err,
                    ApiConfig::DEFAULT_PORT
                );
                ApiConfig::DEFAULT_PORT
            }
        },
        None => ApiConfig::DEFAULT_PORT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_fallbacks() {
        assert_eq!(parse_port(None), 3000);
        assert_eq!(parse_port(Some("8081")), 8081);
        assert_eq!(parse_port(Some("0")), 3000);
        assert_eq!(parse_port(Some("http")), 3000);
    }

    #[test]
    fn test_host_fallbacks() {
        assert_eq!(parse_host(None), IpAddr::from([0, 0, 0, 0]));
        assert_eq!(parse_host(Some("127.0.0.1")), IpAddr::from([127, 0, 0, 1]));
        assert_eq!(parse_host(Some("localhost")), IpAddr::from([0, 0, 0, 0]));
    }
}
