//! One Read Holding Registers round trip against one device.
//!
//! The engine owns the TCP connection for exactly one request/response
//! exchange: connect, send, accumulate the response under a deadline, hand
//! the bytes to the codec. Connections are never reused across polls, and
//! every exit path closes the connection exactly once.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{Instant, timeout, timeout_at};
use tracing::warn;

use crate::config::DeviceConfig;
use crate::protocol::{
    self, DecodeError, EXCEPTION_FRAME_LEN, FUNCTION_CODE_OFFSET,
    FUNCTION_READ_HOLDING_REGISTERS, ReadRequest, exception_name,
};
use crate::transaction::next_transaction_id;

/// Read chunk size. The largest possible response (125 registers) is 259
/// bytes, so one chunk can always hold a full frame.
const READ_CHUNK_LEN: usize = 260;

/// Errors from a single exchange, one variant per failure kind.
///
/// Protocol-reported failures (`ModbusException`) are distinguished from
/// transport failures; none of them is fatal to the poller.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Could not establish the TCP connection within the timeout.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// Writing the request to the open connection failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// No complete response arrived within the per-attempt deadline.
    #[error("no complete response within {0}ms")]
    Timeout(u64),

    /// Response was structurally invalid or truncated.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Response carried a function code that is neither 0x03 nor 0x83.
    #[error("unexpected function code 0x{0:02X}")]
    UnexpectedFunctionCode(u8),

    /// The device returned a well-formed exception response.
    #[error("device exception 0x{code:02X} ({})", exception_name(*.code))]
    ModbusException { code: u8 },
}

impl From<DecodeError> for ExchangeError {
    fn from(e: DecodeError) -> Self {
        match e {
            DecodeError::Malformed(reason) => ExchangeError::MalformedResponse(reason),
            DecodeError::Exception { code } => ExchangeError::ModbusException { code },
            DecodeError::UnexpectedFunctionCode { got } => {
                ExchangeError::UnexpectedFunctionCode(got)
            }
        }
    }
}

/// Perform one read-holding-registers round trip.
///
/// `attempt_timeout` bounds the connect phase and, separately, the window
/// from request send to complete response. The connection is closed before
/// this returns, on success and on every failure path.
pub async fn read_holding_registers(
    device: &DeviceConfig,
    request: ReadRequest,
    attempt_timeout: Duration,
) -> Result<Vec<u16>, ExchangeError> {
    let addr = (device.host.as_str(), device.port);
    let mut stream = match timeout(attempt_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(ExchangeError::ConnectFailed(e.to_string())),
        Err(_) => {
            return Err(ExchangeError::ConnectFailed(format!(
                "no connection within {}ms",
                attempt_timeout.as_millis()
            )));
        }
    };

    let transaction_id = next_transaction_id();
    let frame = protocol::encode_request(transaction_id, device.unit_id, &request);

    match timeout(attempt_timeout, stream.write_all(&frame)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(ExchangeError::SendFailed(e.to_string())),
        Err(_) => {
            return Err(ExchangeError::SendFailed(format!(
                "request not written within {}ms",
                attempt_timeout.as_millis()
            )));
        }
    }

    let result = receive_response(&mut stream, transaction_id, device, request, attempt_timeout).await;

    // Best-effort shutdown; dropping the stream closes the socket either way.
    let _ = stream.shutdown().await;

    result
}

/// Accumulate and decode the response. The deadline runs from the moment
/// the request was written.
async fn receive_response(
    stream: &mut TcpStream,
    transaction_id: u16,
    device: &DeviceConfig,
    request: ReadRequest,
    attempt_timeout: Duration,
) -> Result<Vec<u16>, ExchangeError> {
    let expected_len = request.expected_response_len();
    let deadline = Instant::now() + attempt_timeout;
    let mut buffer: Vec<u8> = Vec::with_capacity(expected_len);
    let mut chunk = [0u8; READ_CHUNK_LEN];

    loop {
        // A non-0x03 function code means the frame is already complete:
        // exception responses are 9 bytes, shorter than any success frame.
        // Checking as soon as the byte is buffered keeps a slow-arriving
        // exception from being misread as an incomplete success frame.
        if buffer.len() >= EXCEPTION_FRAME_LEN
            && buffer[FUNCTION_CODE_OFFSET] != FUNCTION_READ_HOLDING_REGISTERS
        {
            break;
        }
        if buffer.len() >= expected_len {
            break;
        }

        match timeout_at(deadline, stream.read(&mut chunk)).await {
            // Remote closed; decode whatever arrived.
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => buffer.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => {
                return Err(ExchangeError::MalformedResponse(format!(
                    "connection error after {} bytes: {}",
                    buffer.len(),
                    e
                )));
            }
            Err(_) => {
                return Err(ExchangeError::Timeout(attempt_timeout.as_millis() as u64));
            }
        }
    }

    let decoded = protocol::decode_response(&buffer)?;

    // Sequential single-connection use makes mismatches unlikely but not
    // impossible (a stray byte from a prior aborted exchange, for one).
    // They are accepted, not fatal.
    if decoded.transaction_id != transaction_id || decoded.unit_id != device.unit_id {
        warn!(
            device = %device.name,
            endpoint = %device.endpoint(),
            sent_transaction = transaction_id,
            got_transaction = decoded.transaction_id,
            sent_unit = device.unit_id,
            got_unit = decoded.unit_id,
            "response correlation mismatch, accepting"
        );
    }

    if decoded.registers.len() != request.quantity() as usize {
        return Err(ExchangeError::MalformedResponse(format!(
            "{} registers returned, {} requested",
            decoded.registers.len(),
            request.quantity()
        )));
    }

    Ok(decoded.registers)
}
