//! Modbus TCP implementation of the PLC link.

use std::{future::Future, io, net::SocketAddr, time::Duration};

use async_trait::async_trait;
use tokio_modbus::{
    client::{tcp, Client, Context as ModbusContext, Reader},
    Slave,
};

use super::link::{PlcConnector, PlcLink, TagAddress};
use crate::{config::PollerConfig, error::LinkError};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

pub struct ModbusConnector {
    address: SocketAddr,
    unit_id: u8,
    tag: TagAddress,
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl ModbusConnector {
    pub fn new(config: &PollerConfig) -> Self {
        Self {
            address: config.plc_address,
            unit_id: config.unit_id,
            tag: config.tag,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
        }
    }
}

/// Runs a connect attempt under `timeout`, mapping both failure modes onto
/// [`LinkError`].
async fn bounded_connect<T, F>(
    address: SocketAddr,
    timeout: Duration,
    connect: F,
) -> Result<T, LinkError>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(session)) => Ok(session),
        Ok(Err(source)) => Err(LinkError::Connect { address, source }),
        Err(_) => Err(LinkError::ConnectTimeout { address, timeout }),
    }
}

#[async_trait]
impl PlcConnector for ModbusConnector {
    async fn connect(&self) -> Result<Box<dyn PlcLink>, LinkError> {
        let ctx = bounded_connect(
            self.address,
            self.connect_timeout,
            tcp::connect_slave(self.address, Slave(self.unit_id)),
        )
        .await?;

        log_debug!("modbus session open to {} unit {}", self.address, self.unit_id);

        Ok(Box::new(ModbusLink {
            ctx,
            tag: self.tag,
            read_timeout: self.read_timeout,
        }))
    }

    fn describe(&self) -> String {
        format!("{} unit {} tag {}", self.address, self.unit_id, self.tag)
    }
}

struct ModbusLink {
    ctx: ModbusContext,
    tag: TagAddress,
    read_timeout: Duration,
}

#[async_trait]
impl PlcLink for ModbusLink {
    async fn read_tag(&mut self) -> Result<bool, LinkError> {
        let tag = self.tag;
        let timeout = self.read_timeout;
        let ctx = &mut self.ctx;
        let read = async move {
            match tag {
                TagAddress::Coil(addr) => ctx.read_coils(addr, 1).await,
                TagAddress::DiscreteInput(addr) => ctx.read_discrete_inputs(addr, 1).await,
            }
        };

        let bits = match tokio::time::timeout(timeout, read).await {
            Err(_) => return Err(LinkError::ReadTimeout { tag, timeout }),
            // Transport-level failure: the TCP session is unusable.
            Ok(Err(err)) => return Err(LinkError::Disconnected(err.to_string())),
            Ok(Ok(Err(code))) => {
                return Err(LinkError::Rejected {
                    tag,
                    reason: format!("{code:?}"),
                })
            }
            Ok(Ok(Ok(bits))) => bits,
        };

        bits.first().copied().ok_or(LinkError::EmptyResponse(tag))
    }

    async fn close(mut self: Box<Self>) {
        if let Err(err) = self.ctx.disconnect().await {
            log_warn!("modbus disconnect failed: {err}");
        }
    }
}
