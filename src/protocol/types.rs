use thiserror::Error;

/// Size in bytes of a request header: opcode + block id.
pub const REQUEST_HEADER_LEN: usize = 8;
/// Size in bytes of a response header (and of a write-error qualifier).
pub const RESPONSE_HEADER_LEN: usize = 4;

/// Request operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    Map = 0,
    Unmap = 1,
    Update = 2,
    Write = 3,
    Wait = 4,
}

impl TryFrom<u32> for Opcode {
    type Error = WireError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Map),
            1 => Ok(Self::Unmap),
            2 => Ok(Self::Update),
            3 => Ok(Self::Write),
            4 => Ok(Self::Wait),
            other => Err(WireError::UnknownOpcode(other)),
        }
    }
}

/// Response status codes.
///
/// `Updated` is only sent in reply to `UPDATE`. `Unmapped` and `Invalid` are
/// qualifiers that only ever follow an `Error` status on a `WRITE` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Status {
    Ok = 5,
    Error = 6,
    Updated = 7,
    Unmapped = 8,
    Invalid = 9,
}

impl TryFrom<u32> for Status {
    type Error = WireError;

    fn try_from(value: u32) -> Result<Self, WireError> {
        match value {
            5 => Ok(Self::Ok),
            6 => Ok(Self::Error),
            7 => Ok(Self::Updated),
            8 => Ok(Self::Unmapped),
            9 => Ok(Self::Invalid),
            other => Err(WireError::UnknownStatus(other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHeader {
    pub opcode: Opcode,
    pub block_id: u32,
}

impl RequestHeader {
    pub fn new(opcode: Opcode, block_id: u32) -> Self {
        Self { opcode, block_id }
    }

    pub fn encode(&self) -> [u8; REQUEST_HEADER_LEN] {
        let mut buf = [0u8; REQUEST_HEADER_LEN];
        buf[0..4].copy_from_slice(&(self.opcode as u32).to_be_bytes());
        buf[4..8].copy_from_slice(&self.block_id.to_be_bytes());
        buf
    }

    /// Fails with `UnknownOpcode` when the first word is not a known request.
    pub fn decode(buf: &[u8; REQUEST_HEADER_LEN]) -> Result<Self, WireError> {
        let opcode = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let block_id = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        Ok(Self {
            opcode: Opcode::try_from(opcode)?,
            block_id,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub status: Status,
}

impl ResponseHeader {
    pub fn new(status: Status) -> Self {
        Self { status }
    }

    pub fn encode(&self) -> [u8; RESPONSE_HEADER_LEN] {
        (self.status as u32).to_be_bytes()
    }

    pub fn decode(buf: &[u8; RESPONSE_HEADER_LEN]) -> Result<Self, WireError> {
        Ok(Self {
            status: Status::try_from(u32::from_be_bytes(*buf))?,
        })
    }
}

/// Failures while moving frames over a byte stream.
#[derive(Debug, Error)]
pub enum WireError {
    /// Short read/write, peer close or socket error.
    #[error("transport failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown request opcode {0}")]
    UnknownOpcode(u32),

    #[error("unknown response status {0}")]
    UnknownStatus(u32),

    #[error("protocol violation: {0}")]
    Violation(&'static str),
}

impl WireError {
    /// True when the peer simply went away (EOF before a full frame).
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}
