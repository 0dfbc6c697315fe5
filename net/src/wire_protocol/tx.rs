use crate::error::PeerResult;
use crate::wire_protocol::buffer::{ByteBufferComposer, ByteBufferParser};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxIn {
    pub outpoint: [u8; 36],
    pub script: Vec<u8>,
    pub sequence: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxOut {
    pub value: u64,
    pub script: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub ins: Vec<TxIn>,
    pub outs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub(crate) fn decode(parser: &mut ByteBufferParser) -> PeerResult<Self> {
        let version = parser.read_u32_le()?;

        let tx_in_count = parser.read_varint()?;
        let mut ins = Vec::with_capacity(parser.capacity_hint(tx_in_count));
        for _ in 0..tx_in_count {
            let outpoint = parser.read_array()?;
            let script = parser.read_var_bytes()?;
            let sequence = parser.read_u32_le()?;
            ins.push(TxIn { outpoint, script, sequence });
        }

        let tx_out_count = parser.read_varint()?;
        let mut outs = Vec::with_capacity(parser.capacity_hint(tx_out_count));
        for _ in 0..tx_out_count {
            let value = parser.read_u64_le()?;
            let script = parser.read_var_bytes()?;
            outs.push(TxOut { value, script });
        }

        let lock_time = parser.read_u32_le()?;

        Ok(Transaction { version, ins, outs, lock_time })
    }

    pub(crate) fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append(&self.version.to_le_bytes());

        composer.append_varint(self.ins.len() as u64);
        for tx_in in &self.ins {
            composer.append(&tx_in.outpoint);
            composer.append_var_bytes(&tx_in.script);
            composer.append(&tx_in.sequence.to_le_bytes());
        }

        composer.append_varint(self.outs.len() as u64);
        for tx_out in &self.outs {
            composer.append(&tx_out.value.to_le_bytes());
            composer.append_var_bytes(&tx_out.script);
        }

        composer.append(&self.lock_time.to_le_bytes());
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxMessage {
    pub tx: Transaction,
}

impl TxMessage {
    pub(super) fn decode(parser: &mut ByteBufferParser) -> PeerResult<Self> {
        Ok(TxMessage { tx: Transaction::decode(parser)? })
    }

    pub(super) fn encode(&self, composer: &mut ByteBufferComposer) {
        self.tx.encode(composer);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_tx() -> Transaction {
        let mut outpoint = [0u8; 36];
        outpoint[..32].copy_from_slice(&[0x7A; 32]);
        outpoint[32..].copy_from_slice(&1u32.to_le_bytes());

        Transaction {
            version: 1,
            ins: vec![TxIn { outpoint, script: vec![0x76, 0xA9, 0x14], sequence: 0xFFFF_FFFF }],
            outs: vec![
                TxOut { value: 5_000_000_000, script: vec![0x76, 0xA9] },
                TxOut { value: 0, script: vec![] },
            ],
            lock_time: 0,
        }
    }

    #[test]
    fn transaction_round_trips() {
        let tx = sample_tx();
        let mut composer = ByteBufferComposer::new();
        tx.encode(&mut composer);
        let bytes = composer.result();
        let mut parser = ByteBufferParser::new(&bytes);
        assert_eq!(Transaction::decode(&mut parser).unwrap(), tx);
        assert_eq!(parser.remaining(), 0);
    }

    #[test]
    fn transaction_with_no_inputs_or_outputs_round_trips() {
        let tx = Transaction { version: 2, ins: vec![], outs: vec![], lock_time: 500_000 };
        let mut composer = ByteBufferComposer::new();
        tx.encode(&mut composer);
        let bytes = composer.result();
        let mut parser = ByteBufferParser::new(&bytes);
        assert_eq!(Transaction::decode(&mut parser).unwrap(), tx);
    }
}
