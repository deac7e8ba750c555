use std::io::{Read, Write};

use casket_block::{parse_error, BlockError};
use casket_types::{BlockId, BlockType};

use crate::error::{NetError, NetResult};

/// Request operations. The values share a byte space with the response
/// statuses below, so they start at 3.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    Get = 3,
    Exists = 4,
    Set = 5,
    Remove = 6,
}

impl Op {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            3 => Some(Self::Get),
            4 => Some(Self::Exists),
            5 => Some(Self::Set),
            6 => Some(Self::Remove),
            _ => None,
        }
    }
}

/// Response status byte.
pub const STATUS_OK: u8 = 0;
pub const STATUS_FAIL: u8 = 1;

/// Every request and response leads with a 2-byte `{op, status}` header.
pub const HEADER_SIZE: usize = 2;

/// Upper bound on a frame payload, leaving room for the header.
pub const MAX_PAYLOAD: u64 = u64::MAX - HEADER_SIZE as u64;

/// The 2-byte wire header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header(pub [u8; HEADER_SIZE]);

impl Header {
    pub fn new(op: Op, status: u8) -> Self {
        Self([op as u8, status])
    }

    pub fn status(&self) -> u8 {
        self.0[1]
    }
}

/// Write a bare response header.
pub fn write_header<W: Write>(wr: &mut W, header: Header) -> NetResult<()> {
    wr.write_all(&header.0)?;
    Ok(())
}

/// Write a request: header followed by the fixed-length hash id.
pub fn write_request<W: Write>(wr: &mut W, op: Op, id: &BlockId) -> NetResult<()> {
    let mut frame = Vec::with_capacity(HEADER_SIZE + BlockId::LEN);
    frame.extend_from_slice(&Header::new(op, STATUS_OK).0);
    frame.extend_from_slice(id.as_bytes());
    wr.write_all(&frame)?;
    Ok(())
}

/// Read one request: the op byte and the hash id. The status byte of a
/// request header is ignored.
pub fn read_request<R: Read>(rd: &mut R) -> NetResult<(Op, BlockId)> {
    let mut raw = [0u8; HEADER_SIZE + BlockId::LEN];
    rd.read_exact(&mut raw)?;
    let op = Op::from_byte(raw[0]).ok_or(NetError::UnknownOp(raw[0]))?;
    let id = BlockId::from_slice(&raw[HEADER_SIZE..]).map_err(BlockError::from)?;
    Ok((op, id))
}

/// Write a length-prefixed frame: header, u64 big-endian payload length,
/// payload bytes.
pub fn write_frame<W: Write>(wr: &mut W, header: Header, payload: &[u8]) -> NetResult<()> {
    let size = payload.len() as u64;
    if size > MAX_PAYLOAD {
        return Err(NetError::ExceededPayload);
    }
    let mut head = Vec::with_capacity(HEADER_SIZE + 8);
    head.extend_from_slice(&header.0);
    head.extend_from_slice(&size.to_be_bytes());
    wr.write_all(&head)?;
    wr.write_all(payload)?;
    Ok(())
}

/// Read a length-prefixed payload: u64 big-endian length, then that many
/// bytes.
pub fn read_data<R: Read>(rd: &mut R) -> NetResult<Vec<u8>> {
    let mut size = [0u8; 8];
    rd.read_exact(&mut size)?;
    let size = u64::from_be_bytes(size);
    if size > MAX_PAYLOAD {
        return Err(NetError::ExceededPayload);
    }
    let mut payload = vec![0u8; size as usize];
    rd.read_exact(&mut payload)?;
    Ok(payload)
}

/// Read a response header. An `Ok` status returns unit; a `Fail` status is
/// followed by a length-prefixed error frame whose message is parsed back
/// to a typed error.
pub fn read_response_header<R: Read>(rd: &mut R) -> NetResult<()> {
    let mut header = [0u8; HEADER_SIZE];
    rd.read_exact(&mut header)?;
    if header[1] == STATUS_OK {
        return Ok(());
    }
    let message = read_data(rd)?;
    Err(NetError::Block(parse_error(&String::from_utf8_lossy(
        &message,
    ))))
}

/// Write the `type(1) ‖ size(u64 BE)` prefix of a block body.
pub fn write_block_type_and_size<W: Write>(
    wr: &mut W,
    block_type: BlockType,
    size: u64,
) -> NetResult<()> {
    let mut buf = [0u8; 9];
    buf[0] = block_type.as_byte();
    buf[1..].copy_from_slice(&size.to_be_bytes());
    wr.write_all(&buf)?;
    Ok(())
}

/// Read the `type(1) ‖ size(u64 BE)` prefix of a block body.
pub fn read_block_type_and_size<R: Read>(rd: &mut R) -> NetResult<(BlockType, u64)> {
    let mut buf = [0u8; 9];
    rd.read_exact(&mut buf)?;
    let block_type = BlockType::from_byte(buf[0]).ok_or(BlockError::InvalidBlockType)?;
    let size = u64::from_be_bytes(buf[1..].try_into().expect("8 bytes"));
    Ok((block_type, size))
}
