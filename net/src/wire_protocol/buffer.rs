use std::io;
use std::net::{IpAddr, SocketAddr};

use crate::wire_protocol::node::NodeServiceSet;

/// Read cursor over a byte slice. Every `read_*` advances the cursor and
/// fails with `UnexpectedEof` rather than panicking when the slice is too
/// short — callers never need to pre-check lengths.
pub(crate) struct ByteBufferParser<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl<'a> ByteBufferParser<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        ByteBufferParser { buffer, pos: 0 }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len() - self.pos
    }

    /// Bounds a count-prefixed `Vec::with_capacity` hint by the bytes left in
    /// the buffer, since every element consumes at least one byte. Protects
    /// decoders against a capacity-overflow panic from a malicious or
    /// corrupt varint count that wildly exceeds the actual payload size.
    pub fn capacity_hint(&self, declared_count: u64) -> usize {
        (declared_count as usize).min(self.remaining())
    }

    pub fn skip_bytes(&mut self, count: usize) -> io::Result<()> {
        self.eof_check(count)?;
        self.pos += count;
        Ok(())
    }

    pub fn read(&mut self, size: usize) -> io::Result<&'a [u8]> {
        self.eof_check(size)?;
        let range = self.pos..self.pos + size;
        self.pos += size;
        Ok(&self.buffer[range])
    }

    pub fn read_array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        Ok(self.read(N)?.try_into().unwrap())
    }

    pub fn read_u8(&mut self) -> io::Result<u8> {
        Ok(self.read(1)?[0])
    }

    pub fn read_u16_be(&mut self) -> io::Result<u16> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u16_le(&mut self) -> io::Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> io::Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32_le(&mut self) -> io::Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_le(&mut self) -> io::Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64_le(&mut self) -> io::Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// https://en.bitcoin.it/wiki/Protocol_documentation#Variable_length_integer
    pub fn read_varint(&mut self) -> io::Result<u64> {
        let prefix = self.read_u8()?;
        Ok(match prefix {
            0xFD => self.read_u16_le()? as u64,
            0xFE => self.read_u32_le()? as u64,
            0xFF => self.read_u64_le()?,
            b => b as u64,
        })
    }

    pub fn read_var_bytes(&mut self) -> io::Result<Vec<u8>> {
        let len = self.read_varint()? as usize;
        Ok(self.read(len)?.to_vec())
    }

    /// Reads bytes up to and including a NUL terminator, returning everything
    /// before it. Used by `version`'s `sub_version_num` field, which is not
    /// length-prefixed but NUL-terminated.
    pub fn read_cstring(&mut self) -> io::Result<String> {
        let start = self.pos;
        loop {
            if self.read_u8()? == 0 {
                break;
            }
        }
        Ok(String::from_utf8_lossy(&self.buffer[start..self.pos - 1]).into_owned())
    }

    /// net_addr struct without the leading `time` field (used in `version`)
    pub fn parse_net_addr(&mut self) -> io::Result<(NodeServiceSet, SocketAddr)> {
        let services_mask = self.read_u64_le()?;
        let ip: [u8; 16] = self.read_array()?;
        // addresses are always written as v4-mapped v6 (see append_ip_and_port);
        // unmap back to V4 so the round trip matches what was encoded.
        let ip = match std::net::Ipv6Addr::from(ip).to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::from(ip),
        };
        let port = self.read_u16_be()?;
        Ok((NodeServiceSet::from_bitmask(services_mask), SocketAddr::new(ip, port)))
    }

    /// net_addr struct with the leading `time` field (used in `addr`)
    pub fn parse_timed_net_addr(&mut self) -> io::Result<(u32, NodeServiceSet, SocketAddr)> {
        let time = self.read_u32_le()?;
        let (services, addr) = self.parse_net_addr()?;
        Ok((time, services, addr))
    }

    fn eof_check(&self, want_bytes: usize) -> io::Result<()> {
        if self.remaining() < want_bytes {
            Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("can not read {} bytes from buffer of size {}", want_bytes, self.buffer.len()),
            ))
        } else {
            Ok(())
        }
    }
}

pub(crate) struct ByteBufferComposer {
    buffer: Vec<u8>,
}

impl ByteBufferComposer {
    pub fn new() -> Self {
        ByteBufferComposer { buffer: vec![] }
    }

    pub fn result(self) -> Vec<u8> {
        self.buffer
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn append_varint(&mut self, value: u64) {
        match value {
            0..=0xFC => self.append(&[value as u8]),
            0xFD..=0xFFFF => {
                self.append(&[0xFD]);
                self.append(&(value as u16).to_le_bytes());
            }
            0x1_0000..=0xFFFF_FFFF => {
                self.append(&[0xFE]);
                self.append(&(value as u32).to_le_bytes());
            }
            _ => {
                self.append(&[0xFF]);
                self.append(&value.to_le_bytes());
            }
        }
    }

    pub fn append_var_bytes(&mut self, bytes: &[u8]) {
        self.append_varint(bytes.len() as u64);
        self.append(bytes);
    }

    pub fn append_cstring(&mut self, s: &str) {
        self.append(s.as_bytes());
        self.append(&[0]);
    }

    /// net_addr struct without the leading `time` field (used in `version`)
    pub fn append_net_addr(&mut self, services: &NodeServiceSet, addr: &SocketAddr) {
        self.append(&services.as_bitmask().to_le_bytes());
        self.append_ip_and_port(addr);
    }

    /// net_addr struct with the leading `time` field (used in `addr`)
    pub fn append_timed_net_addr(&mut self, time: u32, services: &NodeServiceSet, addr: &SocketAddr) {
        self.append(&time.to_le_bytes());
        self.append_net_addr(services, addr);
    }

    fn append_ip_and_port(&mut self, addr: &SocketAddr) {
        let ipv6_octets = match addr.ip() {
            IpAddr::V4(ip) => ip.to_ipv6_mapped().octets(),
            IpAddr::V6(ip) => ip.octets(),
        };
        self.append(&ipv6_octets);
        self.append(&addr.port().to_be_bytes());
    }
}

impl Default for ByteBufferComposer {
    fn default() -> Self {
        Self::new()
    }
}

/// Growable ring-ish buffer driving the framer. Bytes are read into the
/// writable tail via [Self::expose_writable_part], then consumed frames are
/// dropped from the front via [Self::shift_left].
pub(crate) struct IOBuffer {
    buffer: Vec<u8>,
    /// length of valid content (starts at index 0)
    mark: usize,
}

const INITIAL_CAPACITY: usize = 64 * 1024;
const GROWTH_INCREMENT: usize = 64 * 1024;

impl IOBuffer {
    pub fn content(&self) -> &[u8] {
        &self.buffer[..self.mark]
    }

    /// Exposes at least a few KiB of writable space at the end of the buffer,
    /// growing the backing allocation first if the current tail is too small
    /// (a `block` payload can be many times the wire header size).
    pub fn expose_writable_part(&mut self) -> &mut [u8] {
        if self.buffer.len() - self.mark < 4096 {
            self.buffer.resize(self.buffer.len() + GROWTH_INCREMENT, 0);
        }
        &mut self.buffer[self.mark..]
    }

    /// Make the buffer aware of `size` new bytes written into the slice
    /// returned by [Self::expose_writable_part].
    pub fn register_added_content(&mut self, size: usize) {
        assert!(self.mark + size <= self.buffer.len());
        self.mark += size;
    }

    /// removes `size` bytes from the beginning of the buffer, reduces `mark` by `size`
    pub fn shift_left(&mut self, size: usize) {
        assert!(size <= self.mark);
        self.buffer.rotate_left(size);
        self.mark -= size;
    }
}

impl Default for IOBuffer {
    fn default() -> Self {
        IOBuffer {
            buffer: vec![0_u8; INITIAL_CAPACITY],
            mark: 0,
        }
    }
}
