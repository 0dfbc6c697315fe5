use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::{thread_rng, RngCore};

use crate::error::PeerResult;
use crate::wire_protocol::addr::AddrMessage;
use crate::wire_protocol::block::BlockMessage;
use crate::wire_protocol::buffer::{ByteBufferComposer, ByteBufferParser};
use crate::wire_protocol::inventory::{GetBlocksMessage, GetDataMessage, InvMessage};
use crate::wire_protocol::node::{NodeDesc, NodeServiceSet};
use crate::wire_protocol::raw_message::Command;
use crate::wire_protocol::tx::TxMessage;

/// The recognized command set. Any other command is dropped by the codec
/// before it ever becomes a `ProtocolMessage` — see [super::raw_message].
#[derive(Clone, Debug, PartialEq)]
pub enum ProtocolMessage {
    Version(VersionMessage),
    Verack(VerackMessage),
    Ping(PingMessage),
    GetAddr(GetAddrMessage),
    Inv(InvMessage),
    GetData(GetDataMessage),
    GetBlocks(GetBlocksMessage),
    Addr(AddrMessage),
    Block(BlockMessage),
    Tx(TxMessage),
}

impl ProtocolMessage {
    pub fn command(&self) -> Command {
        match self {
            ProtocolMessage::Version(_) => Command::Version,
            ProtocolMessage::Verack(_) => Command::Verack,
            ProtocolMessage::Ping(_) => Command::Ping,
            ProtocolMessage::GetAddr(_) => Command::GetAddr,
            ProtocolMessage::Inv(_) => Command::Inv,
            ProtocolMessage::GetData(_) => Command::GetData,
            ProtocolMessage::GetBlocks(_) => Command::GetBlocks,
            ProtocolMessage::Addr(_) => Command::Addr,
            ProtocolMessage::Block(_) => Command::Block,
            ProtocolMessage::Tx(_) => Command::Tx,
        }
    }

    /// Decodes a payload for a command already recognized by the framer.
    /// Malformed fields inside a known command surface as an `Err` here; the
    /// caller logs and drops the frame without emitting an event or tearing
    /// down the connection.
    pub fn decode(command: Command, payload: &[u8]) -> PeerResult<Self> {
        // `block` needs the raw payload length for its `size` field, so it
        // is the one command that doesn't just hand the parser off.
        if command == Command::Block {
            return Ok(ProtocolMessage::Block(BlockMessage::decode_payload(payload)?));
        }

        let mut parser = ByteBufferParser::new(payload);
        Ok(match command {
            Command::Version => ProtocolMessage::Version(VersionMessage::decode(&mut parser)?),
            Command::Verack => ProtocolMessage::Verack(VerackMessage),
            Command::Ping => ProtocolMessage::Ping(PingMessage),
            Command::GetAddr => ProtocolMessage::GetAddr(GetAddrMessage),
            Command::Inv => ProtocolMessage::Inv(InvMessage::decode(&mut parser)?),
            Command::GetData => ProtocolMessage::GetData(GetDataMessage::decode(&mut parser)?),
            Command::GetBlocks => ProtocolMessage::GetBlocks(GetBlocksMessage::decode(&mut parser)?),
            Command::Addr => ProtocolMessage::Addr(AddrMessage::decode(&mut parser)?),
            Command::Block => unreachable!("handled above"),
            Command::Tx => ProtocolMessage::Tx(TxMessage::decode(&mut parser)?),
        })
    }

    pub fn encode(&self) -> (Command, Vec<u8>) {
        let mut composer = ByteBufferComposer::new();
        match self {
            ProtocolMessage::Version(m) => m.encode(&mut composer),
            ProtocolMessage::Verack(_) | ProtocolMessage::Ping(_) | ProtocolMessage::GetAddr(_) => {}
            ProtocolMessage::Inv(m) => m.encode(&mut composer),
            ProtocolMessage::GetData(m) => m.encode(&mut composer),
            ProtocolMessage::GetBlocks(m) => m.encode(&mut composer),
            ProtocolMessage::Addr(m) => m.encode(&mut composer),
            ProtocolMessage::Block(m) => m.encode(&mut composer),
            ProtocolMessage::Tx(m) => m.encode(&mut composer),
        }
        (self.command(), composer.result())
    }
}

/// https://en.bitcoin.it/wiki/Protocol_documentation#version
///
/// size | field        | type     | description
/// ---  | -----        | ----     | ------------
/// 4    | version      | i32      | Identifies protocol version being used by the node
/// 8    | services     | u64      | bitfield of features to be enabled for this connection
/// 8    | timestamp    | i64      | standard UNIX timestamp in seconds
/// 26   | addr_recv    | net_addr | The network address of the node receiving this message
/// 26   | addr_from    | net_addr | Field can be ignored
/// 8    | nonce        | u64      | Node random nonce
/// ?    | sub_ver      | cstring  | User agent, NUL-terminated (not length-prefixed)
/// 4    | start_height | i32      | The last block received by the emitting node
#[derive(Clone, Debug, PartialEq)]
pub struct VersionMessage {
    pub protocol_version: i32,
    pub services: NodeServiceSet,
    pub timestamp: i64,
    pub addr_recv: SocketAddr,
    pub addr_from: SocketAddr,
    pub nonce: u64,
    pub sub_ver: String,
    pub start_height: i32,
}

const ZERO_ADDR: &str = "0.0.0.0:0";

impl VersionMessage {
    /// Builds the local node's outbound `version` advertisement. Per the
    /// wire contract this deliberately zeroes both embedded addresses and
    /// uses a sentinel `start_height` — a real implementation would
    /// substitute the local chain tip.
    pub fn outbound(me: &NodeDesc) -> Self {
        let timestamp = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(v) => v.as_secs() as i64,
            Err(_) => panic!("system clock is set before the UNIX epoch"),
        };
        let zero_addr: SocketAddr = ZERO_ADDR.parse().unwrap();

        VersionMessage {
            protocol_version: me.protocol_version,
            services: me.services.clone(),
            timestamp,
            addr_recv: zero_addr,
            addr_from: zero_addr,
            nonce: thread_rng().next_u64(),
            sub_ver: String::new(),
            start_height: 10,
        }
    }

    fn decode(parser: &mut ByteBufferParser) -> PeerResult<Self> {
        let protocol_version = parser.read_i32_le()?;
        let services = NodeServiceSet::from_bitmask(parser.read_u64_le()?);
        let timestamp = parser.read_i64_le()?;
        let (_, addr_recv) = parser.parse_net_addr()?;
        let (_, addr_from) = parser.parse_net_addr()?;
        let nonce = parser.read_u64_le()?;
        let sub_ver = parser.read_cstring()?;
        let start_height = parser.read_i32_le()?;

        Ok(VersionMessage {
            protocol_version,
            services,
            timestamp,
            addr_recv,
            addr_from,
            nonce,
            sub_ver,
            start_height,
        })
    }

    fn encode(&self, composer: &mut ByteBufferComposer) {
        composer.append(&self.protocol_version.to_le_bytes());
        composer.append(&self.services.as_bitmask().to_le_bytes());
        composer.append(&self.timestamp.to_le_bytes());
        composer.append_net_addr(&self.services, &self.addr_recv);
        composer.append_net_addr(&self.services, &self.addr_from);
        composer.append(&self.nonce.to_le_bytes());
        composer.append_cstring(&self.sub_ver);
        composer.append(&self.start_height.to_le_bytes());
    }
}

/// _A "verack" packet shall be sent if the version packet was accepted._ Empty payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct VerackMessage;

/// Empty payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PingMessage;

/// Empty payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct GetAddrMessage;

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire_protocol::node::{Chain, NodeService};

    fn sample_node_desc() -> NodeDesc {
        NodeDesc {
            chain: Chain::Regtest,
            protocol_version: 70016,
            services: NodeServiceSet(vec![NodeService::NodeNetwork]),
            sub_ver: "/example:1.0/".to_string(),
            start_height: 1,
        }
    }

    #[test]
    fn version_round_trips() {
        let mut msg = VersionMessage::outbound(&sample_node_desc());
        msg.sub_ver = "/example:1.0/".to_string();
        msg.addr_recv = "203.0.113.4:18333".parse().unwrap();

        let (command, payload) = ProtocolMessage::Version(msg.clone()).encode();
        assert_eq!(command, Command::Version);
        let decoded = ProtocolMessage::decode(command, &payload).unwrap();
        assert_eq!(decoded, ProtocolMessage::Version(msg));
    }

    #[test]
    fn empty_messages_round_trip() {
        for message in [
            ProtocolMessage::Verack(VerackMessage),
            ProtocolMessage::Ping(PingMessage),
            ProtocolMessage::GetAddr(GetAddrMessage),
        ] {
            let (command, payload) = message.encode();
            assert!(payload.is_empty());
            assert_eq!(ProtocolMessage::decode(command, &payload).unwrap(), message);
        }
    }
}
