//! Wire format serialization and deserialization.
//!
//! All multi-byte integers are big-endian. A frame is a routing header
//! immediately followed by the opaque payload.
//!
//! ## Routing Header Wire Format
//!
//! ```text
//! logical_id (4) || origin_node_id (4) || packet_type (1) || hop_count (1)
//! || gateway_distance (1) || path_len (1) || path_len × node_id (4)
//! ```
//!
//! Encoded size is always `11 + 1 + 4 * path_len`. `path_len` is a single
//! byte, so a path longer than 255 entries cannot be encoded.

use alloc::vec::Vec;
use core::fmt;

use crate::types::{
    Error, LogicalId, NodeId, Payload, HEADER_FIXED_LEN, MAX_PATH_LEN, PACKET_TYPE_DATA,
    PATH_ENTRY_LEN, PATH_LEN_FIELD,
};

/// Cursor over a received byte slice.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Look at the byte `offset` bytes ahead without consuming anything.
    pub fn peek_u8(&self, offset: usize) -> Option<u8> {
        self.buf.get(self.pos + offset).copied()
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        let v = self.peek_u8(0).ok_or(Error::Truncated)?;
        self.pos += 1;
        Ok(v)
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < len {
            return Err(Error::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    pub fn read_u32_be(&mut self) -> Result<u32, Error> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Consume and return everything left.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos.min(self.buf.len())..];
        self.pos = self.buf.len();
        rest
    }
}

/// Growable output buffer.
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u32_be(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn write_bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

/// Encode/decode capability for wire entities.
pub trait Codec: Sized {
    /// Exact number of bytes `encode` will write.
    fn encoded_len(&self) -> usize;

    /// Append the wire form to `w`.
    fn encode(&self, w: &mut Writer) -> Result<(), Error>;

    /// Decode from the reader. On failure nothing is consumed.
    fn decode(r: &mut Reader<'_>) -> Result<Self, Error>;

    fn encode_to_vec(&self) -> Result<Vec<u8>, Error> {
        let mut w = Writer::with_capacity(self.encoded_len());
        self.encode(&mut w)?;
        Ok(w.finish())
    }

    /// Decode from the start of `buf`, returning the value and the number of
    /// bytes it occupied. Trailing bytes are left alone.
    fn decode_prefix(buf: &[u8]) -> Result<(Self, usize), Error> {
        let mut r = Reader::new(buf);
        let value = Self::decode(&mut r)?;
        Ok((value, r.position()))
    }
}

/// Routing metadata carried by every copy of a logical packet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RoutingHeader {
    /// Logical packet identity, shared by all relayed copies.
    pub logical_id: LogicalId,
    /// Node that first generated the packet.
    pub origin: NodeId,
    pub packet_type: u8,
    /// Relays traversed so far; 1 on the originator's transmission.
    pub hop_count: u8,
    /// Gateway-distance rank of the node that emitted this copy.
    pub gateway_distance: u8,
    /// Every node that handled this copy, in traversal order.
    pub path: Vec<NodeId>,
}

impl RoutingHeader {
    /// Header for the first transmission of a new data packet.
    pub fn originate(logical_id: LogicalId, origin: NodeId, gateway_distance: u8) -> Self {
        let mut path = Vec::with_capacity(1);
        path.push(origin);
        Self {
            logical_id,
            origin,
            packet_type: PACKET_TYPE_DATA,
            hop_count: 1,
            gateway_distance,
            path,
        }
    }

    /// Copy of this header as re-broadcast by `relay`.
    ///
    /// The hop count goes up by one, the gateway distance becomes the relay's
    /// own rank and the relay is appended to the path.
    pub fn relayed_by(&self, relay: NodeId, gateway_distance: u8) -> Result<Self, Error> {
        if self.path.len() >= MAX_PATH_LEN {
            return Err(Error::PathOverflow);
        }
        let mut next = self.clone();
        next.hop_count = self.hop_count.saturating_add(1);
        next.gateway_distance = gateway_distance;
        next.path.push(relay);
        Ok(next)
    }
}

impl Codec for RoutingHeader {
    fn encoded_len(&self) -> usize {
        HEADER_FIXED_LEN + PATH_LEN_FIELD + PATH_ENTRY_LEN * self.path.len()
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        if self.path.len() > MAX_PATH_LEN {
            return Err(Error::PathOverflow);
        }
        w.write_u32_be(self.logical_id);
        w.write_u32_be(self.origin);
        w.write_u8(self.packet_type);
        w.write_u8(self.hop_count);
        w.write_u8(self.gateway_distance);
        w.write_u8(self.path.len() as u8);
        for &node in &self.path {
            w.write_u32_be(node);
        }
        Ok(())
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        // Validate the full extent up front so a short buffer consumes nothing.
        let available = r.remaining();
        if available < HEADER_FIXED_LEN + PATH_LEN_FIELD {
            return Err(Error::Truncated);
        }
        let path_len = r.peek_u8(HEADER_FIXED_LEN).ok_or(Error::Truncated)? as usize;
        if available < HEADER_FIXED_LEN + PATH_LEN_FIELD + PATH_ENTRY_LEN * path_len {
            return Err(Error::Truncated);
        }

        let logical_id = r.read_u32_be()?;
        let origin = r.read_u32_be()?;
        let packet_type = r.read_u8()?;
        let hop_count = r.read_u8()?;
        let gateway_distance = r.read_u8()?;
        let declared = r.read_u8()? as usize;
        debug_assert_eq!(declared, path_len);
        let mut path = Vec::with_capacity(path_len);
        for _ in 0..path_len {
            path.push(r.read_u32_be()?);
        }

        Ok(RoutingHeader {
            logical_id,
            origin,
            packet_type,
            hop_count,
            gateway_distance,
            path,
        })
    }
}

/// Diagnostic rendering, not meant to be parsed back.
impl fmt::Display for RoutingHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LFId={}, LNId={}, LPty={}, LH={}, LGw={}, Path=[",
            self.logical_id, self.origin, self.packet_type, self.hop_count, self.gateway_distance
        )?;
        for (i, node) in self.path.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", node)?;
        }
        f.write_str("]")
    }
}

/// A routing header and the payload that follows it on air.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub header: RoutingHeader,
    pub payload: Payload,
}

impl Frame {
    pub fn new(header: RoutingHeader, payload: Payload) -> Self {
        Self { header, payload }
    }

    /// Decode a complete received frame; everything after the header is payload.
    pub fn decode_from_slice(data: &[u8]) -> Result<Self, Error> {
        let mut r = Reader::new(data);
        Self::decode(&mut r)
    }
}

impl Codec for Frame {
    fn encoded_len(&self) -> usize {
        self.header.encoded_len() + self.payload.len()
    }

    fn encode(&self, w: &mut Writer) -> Result<(), Error> {
        self.header.encode(w)?;
        w.write_bytes(&self.payload);
        Ok(())
    }

    fn decode(r: &mut Reader<'_>) -> Result<Self, Error> {
        let header = RoutingHeader::decode(r)?;
        let payload = r.read_rest().to_vec();
        Ok(Frame { header, payload })
    }
}
