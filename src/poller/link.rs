use std::{fmt, str::FromStr};

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::LinkError;

/// The single boolean data point the poller samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagAddress {
    Coil(u16),
    DiscreteInput(u16),
}

impl fmt::Display for TagAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagAddress::Coil(addr) => write!(f, "coil:{addr}"),
            TagAddress::DiscreteInput(addr) => write!(f, "discrete:{addr}"),
        }
    }
}

impl FromStr for TagAddress {
    type Err = anyhow::Error;

    /// Accepts `coil:<addr>`, `discrete:<addr>` or a bare coil number.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let (kind, addr) = match value.split_once(':') {
            Some((kind, addr)) => (kind.trim().to_ascii_lowercase(), addr.trim()),
            None => ("coil".to_string(), value),
        };

        let addr: u16 = addr
            .parse()
            .map_err(|_| anyhow!("invalid tag address '{value}'"))?;

        match kind.as_str() {
            "coil" => Ok(TagAddress::Coil(addr)),
            "discrete" | "input" => Ok(TagAddress::DiscreteInput(addr)),
            other => bail!("unknown tag kind '{other}' (expected coil or discrete)"),
        }
    }
}

impl Serialize for TagAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TagAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// An open connection to the controller.
#[async_trait]
pub trait PlcLink: Send {
    async fn read_tag(&mut self) -> Result<bool, LinkError>;

    async fn close(self: Box<Self>);
}

/// Opens [`PlcLink`]s. The poll loop calls `connect` again after every fault.
#[async_trait]
pub trait PlcConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn PlcLink>, LinkError>;

    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tag_forms() {
        assert_eq!("coil:2".parse::<TagAddress>().unwrap(), TagAddress::Coil(2));
        assert_eq!("17".parse::<TagAddress>().unwrap(), TagAddress::Coil(17));
        assert_eq!(
            "Discrete: 4".parse::<TagAddress>().unwrap(),
            TagAddress::DiscreteInput(4)
        );
        assert!("holding:3".parse::<TagAddress>().is_err());
        assert!("coil:-1".parse::<TagAddress>().is_err());
        assert!("B3:0/2".parse::<TagAddress>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        let tag = TagAddress::DiscreteInput(9);
        assert_eq!(tag.to_string().parse::<TagAddress>().unwrap(), tag);
    }
}
