//! Admin client for a running target application

use std::time::Duration;

use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::common::{Error, Result};
use crate::toolchain::ProbeState;

use super::codec::{self, AdminResponse};
use super::AppHandle;

/// Request listing every probe and its state
pub const LIST_PROBES: &str = "ListProbes";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client speaking the admin protocol to one application instance
pub struct AdminClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl AdminClient {
    /// Connect to the admin port of a running application
    pub async fn connect(handle: &AppHandle) -> Result<Self> {
        let addr = (handle.host.trim_start_matches('[').trim_end_matches(']'), handle.port);
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                Error::AdminProtocol(format!(
                    "Timed out connecting to {}:{}",
                    handle.host, handle.port
                ))
            })??;
        stream.set_nodelay(true)?;

        tracing::debug!(app = %handle.app, port = handle.port, "Connected to admin port");

        let (reader, writer) = stream.into_split();
        Ok(Self { reader, writer })
    }

    /// Send a command and wait for its response
    pub async fn request(&mut self, command: &str) -> Result<AdminResponse> {
        codec::write_frame(&mut self.writer, &codec::encode_request(command)).await?;
        let body = codec::read_frame(&mut self.reader).await?;
        AdminResponse::parse(&body)
    }

    /// Query the probes of the application
    pub async fn list_probes(&mut self) -> Result<Vec<ProbeState>> {
        let response = self.request(LIST_PROBES).await?;
        if !response.is_success() {
            return Err(Error::AdminProtocol(format!(
                "{} failed with rc={}: {}",
                LIST_PROBES, response.rc, response.payload
            )));
        }

        serde_json::from_str(&response.payload)
            .map_err(|e| Error::AdminProtocol(format!("Invalid probe list: {}", e)))
    }
}
