//! Admin wire protocol codec
//!
//! Every frame is an 8-digit zero-padded decimal length followed by that many
//! bytes:
//! ```text
//! 00000010ListProbes
//! 00000012rc=0|[{...}]
//! ```
//! Requests carry a bare command; responses carry `rc=<code>|<payload>`.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::Error;

/// Width of the length prefix
pub const LENGTH_WIDTH: usize = 8;

/// Return code of a successful request
pub const RC_SUCCESS: i32 = 0;

/// Upper bound on a single frame
const MAX_FRAME: usize = 64 * 1024 * 1024;

/// Decoded response frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminResponse {
    pub rc: i32,
    pub payload: String,
}

impl AdminResponse {
    pub fn is_success(&self) -> bool {
        self.rc == RC_SUCCESS
    }

    /// Parse a response body of the form `rc=<code>|<payload>`
    pub fn parse(body: &str) -> Result<Self, Error> {
        let rest = body
            .strip_prefix("rc=")
            .ok_or_else(|| Error::AdminProtocol(format!("Missing return code in '{}'", body)))?;
        let (code, payload) = rest
            .split_once('|')
            .ok_or_else(|| Error::AdminProtocol(format!("Missing payload separator in '{}'", body)))?;
        let rc = code
            .parse()
            .map_err(|_| Error::AdminProtocol(format!("Invalid return code: {}", code)))?;

        Ok(Self {
            rc,
            payload: payload.to_string(),
        })
    }
}

/// Frame a request command
pub fn encode_request(command: &str) -> String {
    frame(command)
}

/// Frame a response
pub fn encode_response(rc: i32, payload: &str) -> String {
    frame(&format!("rc={}|{}", rc, payload))
}

fn frame(body: &str) -> String {
    format!("{:0width$}{}", body.len(), body, width = LENGTH_WIDTH)
}

/// Read one frame body from the stream
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String, Error> {
    let mut prefix = [0u8; LENGTH_WIDTH];
    reader.read_exact(&mut prefix).await.map_err(eof_as_protocol)?;

    let prefix = std::str::from_utf8(&prefix)
        .map_err(|_| Error::AdminProtocol("Non-ASCII length prefix".to_string()))?;
    let len: usize = prefix
        .parse()
        .map_err(|_| Error::AdminProtocol(format!("Invalid length prefix: {}", prefix)))?;

    if len > MAX_FRAME {
        return Err(Error::AdminProtocol(format!("Frame too large: {} bytes", len)));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(eof_as_protocol)?;

    String::from_utf8(body).map_err(|e| Error::AdminProtocol(format!("Invalid UTF-8: {}", e)))
}

/// Write a pre-framed message to the stream
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, framed: &str) -> Result<(), Error> {
    writer.write_all(framed.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

fn eof_as_protocol(e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        Error::AdminProtocol("Connection closed mid-frame".to_string())
    } else {
        Error::Io(e)
    }
}
