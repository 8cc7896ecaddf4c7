//! WAL record codec
//!
//! Frame layout (little-endian):
//!
//! ```text
//! [magic "VZWL" (4)][version (1)][kind (1)][reserved (2)]
//! [sequence u64 (8)][timestamp_ns i64 (8)][payload_len u32 (4)]
//! [header_crc u32 (4)]          -- CRC32 over header bytes [0..28)
//! [payload (payload_len)]
//! [payload_crc u32 (4)]         -- CRC32 over kind || seq || ts || payload
//! ```
//!
//! Payloads are kind-specific: length-prefixed UTF-8 strings (u32 length)
//! plus fixed-width primitives, doubles as IEEE-754 little-endian.
//! The version byte selects the payload schema; unknown versions fail
//! header validation.

use crate::common_utils::{crc32, crc32_multi};
use crate::error::DecodeError;
use crate::models::{
    NewOrder, OrderState, OrderStatus, OrderType, Side, TimeInForce,
};

/// Record magic bytes
pub const RECORD_MAGIC: [u8; 4] = *b"VZWL";
/// Current payload schema version
pub const RECORD_VERSION: u8 = 1;
/// Fixed header size
pub const HEADER_SIZE: usize = 32;
/// Trailing payload checksum size
pub const PAYLOAD_CRC_SIZE: usize = 4;
/// Guard against absurd lengths from a corrupted header that happened
/// to checksum (never expected in practice)
pub const MAX_PAYLOAD_LEN: u32 = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    OrderNew = 1,
    OrderUpdate = 2,
    OrderFill = 3,
    Checkpoint = 4,
}

impl RecordKind {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(RecordKind::OrderNew),
            2 => Some(RecordKind::OrderUpdate),
            3 => Some(RecordKind::OrderFill),
            4 => Some(RecordKind::Checkpoint),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordHeader {
    pub version: u8,
    pub kind: RecordKind,
    pub sequence: u64,
    pub timestamp_ns: i64,
    pub payload_len: u32,
}

/// Result of attempting to pull one frame off a byte stream.
#[derive(Debug, PartialEq)]
pub enum Decoded<'a> {
    /// A verified frame: header, payload bytes, total bytes consumed.
    Record {
        header: RecordHeader,
        payload: &'a [u8],
        consumed: usize,
    },
    /// Fewer than a full header remains.
    EndOfStream,
}

/// Encode one record frame.
pub fn encode_record(kind: RecordKind, sequence: u64, timestamp_ns: i64, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + PAYLOAD_CRC_SIZE);

    buf.extend_from_slice(&RECORD_MAGIC);
    buf.push(RECORD_VERSION);
    buf.push(kind.as_u8());
    buf.extend_from_slice(&[0u8, 0u8]); // reserved
    buf.extend_from_slice(&sequence.to_le_bytes());
    buf.extend_from_slice(&timestamp_ns.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());

    let header_crc = crc32(&buf[..28]);
    buf.extend_from_slice(&header_crc.to_le_bytes());

    buf.extend_from_slice(payload);

    let payload_crc = payload_checksum(kind, sequence, timestamp_ns, payload);
    buf.extend_from_slice(&payload_crc.to_le_bytes());

    buf
}

#[inline]
fn payload_checksum(kind: RecordKind, sequence: u64, timestamp_ns: i64, payload: &[u8]) -> u32 {
    crc32_multi(&[
        &[kind.as_u8()],
        &sequence.to_le_bytes(),
        &timestamp_ns.to_le_bytes(),
        payload,
    ])
}

/// Try to decode one frame from the front of `buf`.
pub fn decode_record(buf: &[u8]) -> Result<Decoded<'_>, DecodeError> {
    if buf.len() < HEADER_SIZE {
        return Ok(Decoded::EndOfStream);
    }

    let header = parse_header(&buf[..HEADER_SIZE])?;

    let frame_len = HEADER_SIZE + header.payload_len as usize + PAYLOAD_CRC_SIZE;
    if buf.len() < frame_len {
        return Err(DecodeError::Truncated);
    }

    let payload = &buf[HEADER_SIZE..HEADER_SIZE + header.payload_len as usize];
    let stored_crc = u32::from_le_bytes(
        buf[frame_len - PAYLOAD_CRC_SIZE..frame_len]
            .try_into()
            .unwrap(),
    );
    let computed = payload_checksum(header.kind, header.sequence, header.timestamp_ns, payload);
    if computed != stored_crc {
        return Err(DecodeError::CorruptPayload { frame_len });
    }

    Ok(Decoded::Record {
        header,
        payload,
        consumed: frame_len,
    })
}

/// Validate and parse a 32-byte header slice.
pub fn parse_header(buf: &[u8]) -> Result<RecordHeader, DecodeError> {
    debug_assert!(buf.len() >= HEADER_SIZE);

    if buf[0..4] != RECORD_MAGIC {
        return Err(DecodeError::CorruptHeader);
    }

    let stored_crc = u32::from_le_bytes(buf[28..32].try_into().unwrap());
    if crc32(&buf[..28]) != stored_crc {
        return Err(DecodeError::CorruptHeader);
    }

    let version = buf[4];
    if version != RECORD_VERSION {
        return Err(DecodeError::CorruptHeader);
    }
    let kind = RecordKind::from_u8(buf[5]).ok_or(DecodeError::CorruptHeader)?;
    let payload_len = u32::from_le_bytes(buf[24..28].try_into().unwrap());
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(DecodeError::CorruptHeader);
    }

    Ok(RecordHeader {
        version,
        kind,
        sequence: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
        timestamp_ns: i64::from_le_bytes(buf[16..24].try_into().unwrap()),
        payload_len,
    })
}

/// Scan forward from `start` for the next offset holding a
/// checksum-valid header. Used by replay to resynchronize past a
/// corrupt region.
pub fn find_next_frame(buf: &[u8], start: usize) -> Option<usize> {
    let mut pos = start;
    while pos + HEADER_SIZE <= buf.len() {
        match buf[pos..].windows(4).position(|w| w == RECORD_MAGIC) {
            Some(rel) => {
                let at = pos + rel;
                if at + HEADER_SIZE <= buf.len() && parse_header(&buf[at..at + HEADER_SIZE]).is_ok()
                {
                    return Some(at);
                }
                pos = at + 1;
            }
            None => return None,
        }
    }
    None
}

// ============================================================================
// Payload encoding
// ============================================================================

/// Decoded payload, discriminated by the header kind byte.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPayload {
    OrderNew(NewOrder),
    OrderUpdate(OrderUpdateEvent),
    OrderFill(OrderFillEvent),
    Checkpoint(Vec<OrderState>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderUpdateEvent {
    pub client_order_id: String,
    pub exchange_order_id: String,
    pub status: OrderStatus,
    pub reason: String,
    pub ts_ns: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderFillEvent {
    pub client_order_id: String,
    pub symbol: String,
    pub qty: f64,
    pub price: f64,
    pub ts_ns: i64,
}

struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    fn new() -> Self {
        Self { buf: Vec::with_capacity(128) }
    }

    fn put_str(&mut self, s: &str) {
        self.buf.extend_from_slice(&(s.len() as u32).to_le_bytes());
        self.buf.extend_from_slice(s.as_bytes());
    }

    fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + n > self.buf.len() {
            return Err(DecodeError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn get_str(&mut self) -> Result<String, DecodeError> {
        let len = u32::from_le_bytes(self.take(4)?.try_into().unwrap()) as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::Truncated)
    }

    fn get_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn get_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn get_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn get_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

pub fn encode_order_new(order: &NewOrder) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.put_str(&order.client_order_id);
    w.put_str(&order.symbol);
    w.put_u8(order.side.as_u8());
    w.put_u8(order.order_type.as_u8());
    w.put_u8(order.time_in_force.as_u8());
    w.put_f64(order.qty);
    match order.price {
        Some(price) => {
            w.put_u8(1);
            w.put_f64(price);
        }
        None => {
            w.put_u8(0);
            w.put_f64(0.0);
        }
    }
    w.into_bytes()
}

pub fn encode_order_update(event: &OrderUpdateEvent) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.put_str(&event.client_order_id);
    w.put_str(&event.exchange_order_id);
    w.put_u8(event.status.as_u8());
    w.put_str(&event.reason);
    w.put_i64(event.ts_ns);
    w.into_bytes()
}

pub fn encode_order_fill(event: &OrderFillEvent) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.put_str(&event.client_order_id);
    w.put_str(&event.symbol);
    w.put_f64(event.qty);
    w.put_f64(event.price);
    w.put_i64(event.ts_ns);
    w.into_bytes()
}

/// Checkpoint payload: order count, then one u32-length-prefixed blob
/// per order carrying the full state row.
pub fn encode_checkpoint(states: &[OrderState]) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.put_u32(states.len() as u32);
    for state in states {
        let blob = encode_order_state(state);
        w.put_u32(blob.len() as u32);
        w.buf.extend_from_slice(&blob);
    }
    w.into_bytes()
}

fn encode_order_state(state: &OrderState) -> Vec<u8> {
    let mut w = PayloadWriter::new();
    w.put_str(&state.client_order_id);
    w.put_str(&state.exchange_order_id);
    w.put_str(&state.symbol);
    w.put_u8(state.side.as_u8());
    w.put_u8(state.order_type.as_u8());
    w.put_u8(state.time_in_force.as_u8());
    w.put_f64(state.original_qty);
    match state.limit_price {
        Some(price) => {
            w.put_u8(1);
            w.put_f64(price);
        }
        None => {
            w.put_u8(0);
            w.put_f64(0.0);
        }
    }
    w.put_f64(state.executed_qty);
    w.put_f64(state.avg_price);
    w.put_u8(state.status.as_u8());
    w.put_str(&state.reason);
    w.put_i64(state.created_ts_ns);
    w.put_i64(state.last_ts_ns);
    w.into_bytes()
}

/// Decode a payload according to the header kind.
pub fn decode_payload(kind: RecordKind, payload: &[u8]) -> Result<RecordPayload, DecodeError> {
    match kind {
        RecordKind::OrderNew => decode_order_new(payload).map(RecordPayload::OrderNew),
        RecordKind::OrderUpdate => decode_order_update(payload).map(RecordPayload::OrderUpdate),
        RecordKind::OrderFill => decode_order_fill(payload).map(RecordPayload::OrderFill),
        RecordKind::Checkpoint => decode_checkpoint(payload).map(RecordPayload::Checkpoint),
    }
}

fn decode_order_new(payload: &[u8]) -> Result<NewOrder, DecodeError> {
    let mut r = PayloadReader::new(payload);
    let client_order_id = r.get_str()?;
    let symbol = r.get_str()?;
    let side = Side::from_u8(r.get_u8()?).ok_or(DecodeError::Truncated)?;
    let order_type = OrderType::from_u8(r.get_u8()?).ok_or(DecodeError::Truncated)?;
    let time_in_force = TimeInForce::from_u8(r.get_u8()?).ok_or(DecodeError::Truncated)?;
    let qty = r.get_f64()?;
    let has_price = r.get_u8()?;
    let price = r.get_f64()?;

    Ok(NewOrder {
        client_order_id,
        symbol,
        side,
        order_type,
        time_in_force,
        qty,
        price: (has_price != 0).then_some(price),
    })
}

fn decode_order_update(payload: &[u8]) -> Result<OrderUpdateEvent, DecodeError> {
    let mut r = PayloadReader::new(payload);
    Ok(OrderUpdateEvent {
        client_order_id: r.get_str()?,
        exchange_order_id: r.get_str()?,
        status: OrderStatus::from_u8(r.get_u8()?).ok_or(DecodeError::Truncated)?,
        reason: r.get_str()?,
        ts_ns: r.get_i64()?,
    })
}

fn decode_order_fill(payload: &[u8]) -> Result<OrderFillEvent, DecodeError> {
    let mut r = PayloadReader::new(payload);
    Ok(OrderFillEvent {
        client_order_id: r.get_str()?,
        symbol: r.get_str()?,
        qty: r.get_f64()?,
        price: r.get_f64()?,
        ts_ns: r.get_i64()?,
    })
}

fn decode_checkpoint(payload: &[u8]) -> Result<Vec<OrderState>, DecodeError> {
    let mut r = PayloadReader::new(payload);
    let count = r.get_u32()? as usize;
    let mut states = Vec::with_capacity(count.min(64 * 1024));
    for _ in 0..count {
        let blob_len = r.get_u32()? as usize;
        let blob = r.take(blob_len)?;
        states.push(decode_order_state(blob)?);
    }
    if r.remaining() != 0 {
        return Err(DecodeError::Truncated);
    }
    Ok(states)
}

fn decode_order_state(blob: &[u8]) -> Result<OrderState, DecodeError> {
    let mut r = PayloadReader::new(blob);
    let client_order_id = r.get_str()?;
    let exchange_order_id = r.get_str()?;
    let symbol = r.get_str()?;
    let side = Side::from_u8(r.get_u8()?).ok_or(DecodeError::Truncated)?;
    let order_type = OrderType::from_u8(r.get_u8()?).ok_or(DecodeError::Truncated)?;
    let time_in_force = TimeInForce::from_u8(r.get_u8()?).ok_or(DecodeError::Truncated)?;
    let original_qty = r.get_f64()?;
    let has_limit = r.get_u8()?;
    let limit_price = r.get_f64()?;
    let executed_qty = r.get_f64()?;
    let avg_price = r.get_f64()?;
    let status = OrderStatus::from_u8(r.get_u8()?).ok_or(DecodeError::Truncated)?;
    let reason = r.get_str()?;
    let created_ts_ns = r.get_i64()?;
    let last_ts_ns = r.get_i64()?;

    Ok(OrderState {
        client_order_id,
        exchange_order_id,
        symbol,
        side,
        order_type,
        time_in_force,
        original_qty,
        limit_price: (has_limit != 0).then_some(limit_price),
        executed_qty,
        avg_price,
        status,
        reason,
        created_ts_ns,
        last_ts_ns,
    })
}
