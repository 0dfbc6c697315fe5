use std::net::SocketAddr;

use crate::error::PeerResult;
use crate::wire_protocol::buffer::{ByteBufferComposer, ByteBufferParser};
use crate::wire_protocol::node::NodeServiceSet;

/// Entries above this count are still read off the wire (so the framer
/// never desyncs) but dropped — only the first 1000 are retained.
pub const MAX_ADDR_ENTRIES: usize = 1000;

#[derive(Clone, Debug, PartialEq)]
pub struct AddrEntry {
    pub time: u32,
    pub services: NodeServiceSet,
    pub addr: SocketAddr,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AddrMessage {
    pub entries: Vec<AddrEntry>,
}

impl AddrMessage {
    pub(super) fn decode(parser: &mut ByteBufferParser) -> PeerResult<Self> {
        let declared_count = parser.read_varint()? as usize;
        let mut entries = Vec::with_capacity(declared_count.min(MAX_ADDR_ENTRIES));
        for i in 0..declared_count {
            let (time, services, addr) = parser.parse_timed_net_addr()?;
            if i < MAX_ADDR_ENTRIES {
                entries.push(AddrEntry { time, services, addr });
            }
        }
        Ok(AddrMessage { entries })
    }

    pub(super) fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append_varint(self.entries.len() as u64);
        for entry in &self.entries {
            composer.append_timed_net_addr(entry.time, &entry.services, &entry.addr);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire_protocol::node::NodeService;

    fn sample_entry(n: u8) -> AddrEntry {
        AddrEntry {
            time: 1_600_000_000 + n as u32,
            services: NodeServiceSet(vec![NodeService::NodeNetwork]),
            addr: format!("10.0.0.{n}:8333").parse().unwrap(),
        }
    }

    #[test]
    fn addr_round_trips_a_handful_of_entries() {
        let msg = AddrMessage { entries: vec![sample_entry(1), sample_entry(2)] };
        let mut composer = ByteBufferComposer::new();
        msg.encode(&mut composer);
        let bytes = composer.result();
        let mut parser = ByteBufferParser::new(&bytes);
        assert_eq!(AddrMessage::decode(&mut parser).unwrap(), msg);
    }

    /// Peer declares 2000 entries but only 2000 are actually supplied on the
    /// wire: decoding must read every declared entry (so the framer stays in
    /// sync) but keep only the first 1000.
    #[test]
    fn addr_clamps_to_1000_while_consuming_all_declared_entries() {
        let entries: Vec<_> = (0..2000u32).map(|i| AddrEntry {
            time: i,
            services: NodeServiceSet(vec![]),
            addr: format!("10.{}.{}.{}:8333", (i >> 16) & 0xFF, (i >> 8) & 0xFF, i & 0xFF).parse().unwrap(),
        }).collect();
        let msg = AddrMessage { entries };

        let mut composer = ByteBufferComposer::new();
        msg.encode(&mut composer);
        let bytes = composer.result();

        let mut parser = ByteBufferParser::new(&bytes);
        let decoded = AddrMessage::decode(&mut parser).unwrap();
        assert_eq!(decoded.entries.len(), MAX_ADDR_ENTRIES);
        assert_eq!(decoded.entries[0].time, 0);
        assert_eq!(decoded.entries[999].time, 999);
        // the whole declared payload was consumed, the parser isn't stuck mid-frame
        assert_eq!(parser.remaining(), 0);
    }
}
