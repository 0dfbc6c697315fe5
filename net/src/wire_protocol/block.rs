use crate::error::PeerResult;
use crate::wire_protocol::buffer::{ByteBufferComposer, ByteBufferParser};
use crate::wire_protocol::tx::Transaction;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockHeader {
    pub version: u32,
    pub prev_hash: [u8; 32],
    pub merkle_root: [u8; 32],
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    fn decode(parser: &mut ByteBufferParser) -> PeerResult<Self> {
        Ok(BlockHeader {
            version: parser.read_u32_le()?,
            prev_hash: parser.read_array()?,
            merkle_root: parser.read_array()?,
            timestamp: parser.read_u32_le()?,
            bits: parser.read_u32_le()?,
            nonce: parser.read_u32_le()?,
        })
    }

    fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append(&self.version.to_le_bytes());
        composer.append(&self.prev_hash);
        composer.append(&self.merkle_root);
        composer.append(&self.timestamp.to_le_bytes());
        composer.append(&self.bits.to_le_bytes());
        composer.append(&self.nonce.to_le_bytes());
    }
}

/// A fully parsed block. `size` is the encoded payload's byte length,
/// retained for downstream cost accounting — it is not itself part of the
/// wire format and is recomputed on every decode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub txs: Vec<Transaction>,
    pub size: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockMessage {
    pub block: Block,
}

impl BlockMessage {
    /// Decodes from the raw payload bytes directly (rather than a bare
    /// parser) so `size` can be derived from the payload length.
    pub(super) fn decode_payload(payload: &[u8]) -> PeerResult<Self> {
        let mut parser = ByteBufferParser::new(payload);
        let header = BlockHeader::decode(&mut parser)?;
        let txn_count = parser.read_varint()?;
        let mut txs = Vec::with_capacity(parser.capacity_hint(txn_count));
        for _ in 0..txn_count {
            txs.push(Transaction::decode(&mut parser)?);
        }
        let block = Block { header, txs, size: payload.len() as u32 };
        Ok(BlockMessage { block })
    }

    pub(super) fn encode(&self, composer: &mut ByteBufferComposer) {
        self.block.header.encode(composer);
        composer.append_varint(self.block.txs.len() as u64);
        for tx in &self.block.txs {
            tx.encode(composer);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire_protocol::tx::{TxIn, TxOut};

    fn sample_block() -> Block {
        let tx = Transaction {
            version: 1,
            ins: vec![TxIn { outpoint: [0x11; 36], script: vec![], sequence: 0xFFFF_FFFF }],
            outs: vec![TxOut { value: 100, script: vec![0xAC] }],
            lock_time: 0,
        };
        Block {
            header: BlockHeader {
                version: 1,
                prev_hash: [0x22; 32],
                merkle_root: [0x33; 32],
                timestamp: 1_700_000_000,
                bits: 0x1d00ffff,
                nonce: 42,
            },
            txs: vec![tx],
            size: 0, // recomputed on decode
        }
    }

    #[test]
    fn block_round_trips_and_tracks_payload_size() {
        let mut composer = ByteBufferComposer::new();
        let block = sample_block();
        BlockMessage { block: block.clone() }.encode(&mut composer);
        let payload = composer.result();

        let decoded = BlockMessage::decode_payload(&payload).unwrap().block;
        assert_eq!(decoded.header, block.header);
        assert_eq!(decoded.txs, block.txs);
        assert_eq!(decoded.size as usize, payload.len());
    }

    #[test]
    fn block_with_no_transactions_round_trips() {
        let mut block = sample_block();
        block.txs.clear();
        let mut composer = ByteBufferComposer::new();
        BlockMessage { block: block.clone() }.encode(&mut composer);
        let payload = composer.result();
        let decoded = BlockMessage::decode_payload(&payload).unwrap().block;
        assert!(decoded.txs.is_empty());
    }
}
