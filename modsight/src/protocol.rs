//! MBAP frame codec for Read Holding Registers.
//!
//! Pure, stateless transformation between protocol fields and wire bytes for
//! one request/response pair. All multi-byte fields are big-endian. The
//! codec has no notion of sockets or deadlines; the exchange engine owns
//! those, along with request/response correlation.

use thiserror::Error;

/// Function code for Read Holding Registers.
pub const FUNCTION_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Exception-response function code (0x03 with the error bit set).
pub const FUNCTION_EXCEPTION: u8 = FUNCTION_READ_HOLDING_REGISTERS | 0x80;

/// Size of an encoded request frame.
pub const REQUEST_FRAME_LEN: usize = 12;

/// Size of a complete exception response. Also the minimum viable response:
/// MBAP header (6) + unit id + function code + one trailing byte.
pub const EXCEPTION_FRAME_LEN: usize = 9;

/// Offset of the function-code byte within a frame.
pub const FUNCTION_CODE_OFFSET: usize = 7;

/// Practical PDU limit for registers in one read.
pub const MAX_READ_QUANTITY: u16 = 125;

/// Quantity outside the range a single read supports.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("read quantity {0} out of range (1-{MAX_READ_QUANTITY})")]
pub struct InvalidQuantity(pub u16);

/// The fixed parameters of one register read, shared by all devices.
///
/// Construction validates the quantity, so a `ReadRequest` can always be
/// encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    start_address: u16,
    quantity: u16,
}

impl ReadRequest {
    /// Create a request, rejecting quantities outside 1-125.
    pub fn new(start_address: u16, quantity: u16) -> Result<Self, InvalidQuantity> {
        if quantity == 0 || quantity > MAX_READ_QUANTITY {
            return Err(InvalidQuantity(quantity));
        }
        Ok(Self {
            start_address,
            quantity,
        })
    }

    /// Starting register address.
    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    /// Number of registers to read.
    pub fn quantity(&self) -> u16 {
        self.quantity
    }

    /// Total length of the successful response this request expects.
    ///
    /// Modbus TCP has no end-of-frame marker, so the client must know in
    /// advance how many bytes make up a complete success response:
    /// MBAP header (6) + unit id + function code + byte count + data.
    pub fn expected_response_len(&self) -> usize {
        9 + 2 * self.quantity as usize
    }
}

/// A decoded successful response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedResponse {
    /// Transaction id echoed by the device.
    pub transaction_id: u16,
    /// Unit id echoed by the device.
    pub unit_id: u8,
    /// Register values, in request order.
    pub registers: Vec<u16>,
}

/// Errors produced while decoding a response buffer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// Structurally invalid response: too short, odd byte count, or a data
    /// section shorter than announced.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// Well-formed exception response reported by the device.
    #[error("device exception 0x{code:02X} ({})", exception_name(*.code))]
    Exception { code: u8 },

    /// Response carries a function code that is neither 0x03 nor 0x83.
    #[error("unexpected function code 0x{got:02X}")]
    UnexpectedFunctionCode { got: u8 },
}

/// Encode a Read Holding Registers request frame (12 bytes).
pub fn encode_request(transaction_id: u16, unit_id: u8, request: &ReadRequest) -> Vec<u8> {
    let mut frame = Vec::with_capacity(REQUEST_FRAME_LEN);
    frame.extend_from_slice(&transaction_id.to_be_bytes());
    frame.extend_from_slice(&0u16.to_be_bytes()); // protocol id, always 0
    // Length field: unit id + function code + address + quantity.
    frame.extend_from_slice(&6u16.to_be_bytes());
    frame.push(unit_id);
    frame.push(FUNCTION_READ_HOLDING_REGISTERS);
    frame.extend_from_slice(&request.start_address.to_be_bytes());
    frame.extend_from_slice(&request.quantity.to_be_bytes());
    frame
}

/// Decode an accumulated response buffer.
///
/// Correlating the returned transaction id and unit id against the request
/// is the caller's job, as is checking the register count against the
/// requested quantity; the codec has no notion of the original request.
pub fn decode_response(frame: &[u8]) -> Result<DecodedResponse, DecodeError> {
    if frame.len() < EXCEPTION_FRAME_LEN {
        return Err(DecodeError::Malformed(format!(
            "{} bytes received, minimum response is {}",
            frame.len(),
            EXCEPTION_FRAME_LEN
        )));
    }

    let transaction_id = u16::from_be_bytes([frame[0], frame[1]]);
    let unit_id = frame[6];
    let function_code = frame[FUNCTION_CODE_OFFSET];

    if function_code == FUNCTION_EXCEPTION {
        return Err(DecodeError::Exception { code: frame[8] });
    }
    if function_code != FUNCTION_READ_HOLDING_REGISTERS {
        return Err(DecodeError::UnexpectedFunctionCode { got: function_code });
    }

    let byte_count = frame[8] as usize;
    if byte_count % 2 != 0 {
        return Err(DecodeError::Malformed(format!(
            "odd register byte count {}",
            byte_count
        )));
    }

    let data = &frame[EXCEPTION_FRAME_LEN..];
    if data.len() < byte_count {
        return Err(DecodeError::Malformed(format!(
            "byte count {} announced but only {} data bytes received",
            byte_count,
            data.len()
        )));
    }

    let registers = data[..byte_count]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();

    Ok(DecodedResponse {
        transaction_id,
        unit_id,
        registers,
    })
}

/// Standard Modbus exception code names, for diagnostics.
pub fn exception_name(code: u8) -> &'static str {
    match code {
        0x01 => "illegal function",
        0x02 => "illegal data address",
        0x03 => "illegal data value",
        0x04 => "slave device failure",
        0x05 => "acknowledge",
        0x06 => "slave device busy",
        0x08 => "memory parity error",
        0x0A => "gateway path unavailable",
        0x0B => "gateway target failed to respond",
        _ => "unknown exception",
    }
}
