use crate::error::PeerResult;
use crate::wire_protocol::buffer::{ByteBufferComposer, ByteBufferParser};

pub const INV_TYPE_TX: u32 = 1;
pub const INV_TYPE_BLOCK: u32 = 2;

/// `{type, 32-byte hash}` identifying either a block (type 2) or a
/// transaction (type 1).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InventoryVector {
    pub inv_type: u32,
    pub hash: [u8; 32],
}

impl InventoryVector {
    pub fn block(hash: [u8; 32]) -> Self {
        InventoryVector { inv_type: INV_TYPE_BLOCK, hash }
    }

    pub fn transaction(hash: [u8; 32]) -> Self {
        InventoryVector { inv_type: INV_TYPE_TX, hash }
    }

    pub(super) fn decode(parser: &mut ByteBufferParser) -> PeerResult<Self> {
        let inv_type = parser.read_u32_le()?;
        let hash = parser.read_array()?;
        Ok(InventoryVector { inv_type, hash })
    }

    pub(super) fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append(&self.inv_type.to_le_bytes());
        composer.append(&self.hash);
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvMessage {
    pub items: Vec<InventoryVector>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetDataMessage {
    pub items: Vec<InventoryVector>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetBlocksMessage {
    pub version: u32,
    pub locator: Vec<[u8; 32]>,
    pub stop: [u8; 32],
}

impl InvMessage {
    pub(super) fn decode(parser: &mut ByteBufferParser) -> PeerResult<Self> {
        Ok(InvMessage { items: decode_inv_vector_list(parser)? })
    }

    pub(super) fn encode(&self, composer: &mut ByteBufferComposer) {
        encode_inv_vector_list(&self.items, composer);
    }
}

impl GetDataMessage {
    pub(super) fn decode(parser: &mut ByteBufferParser) -> PeerResult<Self> {
        Ok(GetDataMessage { items: decode_inv_vector_list(parser)? })
    }

    pub(super) fn encode(&self, composer: &mut ByteBufferComposer) {
        encode_inv_vector_list(&self.items, composer);
    }
}

impl GetBlocksMessage {
    pub fn new(version: u32, locator: Vec<[u8; 32]>, stop: [u8; 32]) -> Self {
        GetBlocksMessage { version, locator, stop }
    }

    pub(super) fn decode(parser: &mut ByteBufferParser) -> PeerResult<Self> {
        let version = parser.read_u32_le()?;
        let start_count = parser.read_varint()?;
        let mut locator = Vec::with_capacity(parser.capacity_hint(start_count));
        for _ in 0..start_count {
            locator.push(parser.read_array()?);
        }
        let stop = parser.read_array()?;
        Ok(GetBlocksMessage { version, locator, stop })
    }

    pub(super) fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append(&self.version.to_le_bytes());
        composer.append_varint(self.locator.len() as u64);
        for hash in &self.locator {
            composer.append(hash);
        }
        composer.append(&self.stop);
    }
}

fn decode_inv_vector_list(parser: &mut ByteBufferParser) -> PeerResult<Vec<InventoryVector>> {
    let count = parser.read_varint()?;
    let mut items = Vec::with_capacity(parser.capacity_hint(count));
    for _ in 0..count {
        items.push(InventoryVector::decode(parser)?);
    }
    Ok(items)
}

fn encode_inv_vector_list(items: &[InventoryVector], composer: &mut ByteBufferComposer) {
    composer.append_varint(items.len() as u64);
    for item in items {
        item.encode(composer);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn inv_round_trips_two_vectors() {
        let msg = InvMessage {
            items: vec![
                InventoryVector::transaction([0x11; 32]),
                InventoryVector::block([0x22; 32]),
            ],
        };
        let mut composer = ByteBufferComposer::new();
        msg.encode(&mut composer);
        let bytes = composer.result();
        let mut parser = ByteBufferParser::new(&bytes);
        let decoded = InvMessage::decode(&mut parser).unwrap();
        assert_eq!(decoded, msg);
        assert_eq!(decoded.items.len(), 2);
    }

    #[test]
    fn getblocks_round_trips() {
        let msg = GetBlocksMessage::new(209, vec![[0xAA; 32], [0xBB; 32]], [0xCC; 32]);
        let mut composer = ByteBufferComposer::new();
        msg.encode(&mut composer);
        let bytes = composer.result();
        let mut parser = ByteBufferParser::new(&bytes);
        let decoded = GetBlocksMessage::decode(&mut parser).unwrap();
        assert_eq!(decoded, msg);
    }

    /// A declared count wildly exceeding the actual buffered bytes must fail
    /// cleanly with an EOF error (handled by the caller as a codec error),
    /// not panic allocating an oversized `Vec`.
    #[test]
    fn inv_with_oversized_declared_count_errors_instead_of_panicking() {
        let mut composer = ByteBufferComposer::new();
        composer.append_varint(u64::MAX);
        composer.append(&[0x11; 32]); // a single, incomplete inventory vector
        let bytes = composer.result();
        let mut parser = ByteBufferParser::new(&bytes);
        assert!(decode_inv_vector_list(&mut parser).is_err());
    }
}
