use std::ascii;

use sha2::digest::FixedOutput;
use sha2::{Digest, Sha256};
use strum::{EnumIter, IntoEnumIterator};

use crate::error::PeerError;
use crate::wire_protocol::buffer::{ByteBufferComposer, ByteBufferParser, IOBuffer};
use crate::wire_protocol::messages::ProtocolMessage;
use crate::wire_protocol::node::Chain;

/// Protocol version at and above which every frame carries a checksum, on
/// both the send and the receive side (BIP 0031 era and later).
pub const CHECKSUM_VERSION_CUTOFF: i32 = 209;

#[derive(Debug, EnumIter, PartialEq, Eq, Clone, Copy)]
pub enum Command {
    Version,
    Verack,
    Ping,
    GetAddr,
    Inv,
    GetData,
    GetBlocks,
    Addr,
    Block,
    Tx,
}

impl Command {
    // ASCII string identifying the packet content, NULL padded (non-NULL padding results in packet rejected)
    fn as_bytes(&self) -> &'static [u8; 12] {
        match self {
            Command::Version => b"version\0\0\0\0\0",
            Command::Verack => b"verack\0\0\0\0\0\0",
            Command::Ping => b"ping\0\0\0\0\0\0\0\0",
            Command::GetAddr => b"getaddr\0\0\0\0\0",
            Command::Inv => b"inv\0\0\0\0\0\0\0\0\0",
            Command::GetData => b"getdata\0\0\0\0\0",
            Command::GetBlocks => b"getblocks\0\0\0",
            Command::Addr => b"addr\0\0\0\0\0\0\0\0",
            Command::Block => b"block\0\0\0\0\0\0\0",
            Command::Tx => b"tx\0\0\0\0\0\0\0\0\0\0",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Version => "version",
            Command::Verack => "verack",
            Command::Ping => "ping",
            Command::GetAddr => "getaddr",
            Command::Inv => "inv",
            Command::GetData => "getdata",
            Command::GetBlocks => "getblocks",
            Command::Addr => "addr",
            Command::Block => "block",
            Command::Tx => "tx",
        }
    }
}

impl TryFrom<&[u8]> for Command {
    type Error = PeerError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        for command in Command::iter() {
            if command.as_bytes() == value {
                return Ok(command);
            }
        }
        Err(PeerError::from(format!("'{}' does not represent a known command", format_command_bytes(value))))
    }
}

fn format_command_bytes(bytes: &[u8]) -> String {
    let mut result = String::new();
    for &c in bytes {
        result.push_str(std::str::from_utf8(&ascii::escape_default(c).collect::<Vec<u8>>()).unwrap())
    }
    result
}

/// An on-wire envelope: magic, command, length, optional checksum, payload.
/// Almost all integers are encoded little endian. Only IP or port number are encoded big endian.
pub struct RawMessage {
    pub chain: Chain,
    pub command: Command,
    pub payload: Vec<u8>,
}

/// Outcome of one attempt to pull a frame out of the buffer.
pub enum MessageParseOutcome {
    /// A fully decoded, checksum-verified (if applicable) frame.
    Message { message: RawMessage, garbage_skipped: usize },
    /// A syntactically complete frame whose command name is not recognized.
    /// No event is raised for it, but the buffer has moved past it.
    SkippedMessage { command_bytes: String, garbage_skipped: usize },
    /// A syntactically complete frame whose checksum did not verify. The
    /// frame is discarded and the buffer has moved past it.
    ChecksumMismatch { command: String, garbage_skipped: usize },
    /// Not enough bytes buffered yet to make a decision; the caller should
    /// read more bytes and try again. No bytes were consumed.
    NoMessage,
}

impl RawMessage {
    pub fn new(chain: Chain, command: Command, payload: Vec<u8>) -> Self {
        RawMessage { chain, command, payload }
    }

    /// Message structure (see https://en.bitcoin.it/wiki/Protocol_documentation#Message_structure)
    ///
    /// size | field    | type     | description
    /// ---  | -----    | ----     | ------------
    /// 4    | magic    | u32      | Magic value indicating message origin network, and used to seek to next message when stream state is unknown
    /// 12   | command  | [u8; 12] | ASCII string identifying the packet content, NULL padded (non-NULL padding results in packet rejected)
    /// 4    | length   | u32      | Length of payload in number of bytes
    /// 4    | checksum | u32      | First 4 bytes of sha256(sha256(payload)); omitted if `send_ver < 209`
    /// ?    | payload  | Vec<u8>  | The actual data
    pub fn to_bytes(&self, send_ver: i32) -> Vec<u8> {
        let mut c = ByteBufferComposer::new();
        c.append(&self.chain.magic_value().to_le_bytes());
        c.append(self.command.as_bytes());
        c.append(&(self.payload.len() as u32).to_le_bytes());
        if send_ver >= CHECKSUM_VERSION_CUTOFF {
            let checksum = double_sha256(&self.payload);
            c.append(&checksum[..4]);
        }
        c.append(&self.payload);
        c.result()
    }

    /// Scans `buffer` for the next frame.
    ///
    /// `recv_ver` is read freshly by the caller for every call, which is what
    /// lets checksum enforcement begin immediately once a connection crosses
    /// the `verack` boundary mid-stream. Bytes preceding a magic match are
    /// inter-message garbage: reported as a diagnostic count, never as an
    /// error, and always dropped from the buffer regardless of outcome.
    pub fn try_consume_message(buffer: &mut IOBuffer, expected_chain: Chain, recv_ver: i32) -> MessageParseOutcome {
        let magic = expected_chain.magic_value().to_le_bytes();
        let garbage_skipped = match find_subslice(buffer.content(), &magic) {
            Some(0) => 0,
            Some(offset) => {
                buffer.shift_left(offset);
                offset
            }
            None => {
                // No magic anywhere in the buffered content: keep at most the
                // last 3 bytes, which might be a partial match straddling the
                // next read, and report the rest as garbage.
                let keep = magic.len() - 1;
                let skip = buffer.content().len().saturating_sub(keep);
                if skip > 0 {
                    buffer.shift_left(skip);
                }
                return MessageParseOutcome::NoMessage;
            }
        };

        const HEADER_LEN_NO_CHECKSUM: usize = 4 + 12 + 4;
        let has_checksum = recv_ver >= CHECKSUM_VERSION_CUTOFF;
        let header_len = HEADER_LEN_NO_CHECKSUM + if has_checksum { 4 } else { 0 };

        let mut parser = ByteBufferParser::new(buffer.content());
        if parser.remaining() < header_len {
            return MessageParseOutcome::NoMessage;
        }

        // infallible: remaining() was checked above
        let _magic = parser.read_u32_le().unwrap();
        let command_bytes = parser.read(12).unwrap();
        let payload_len = parser.read_u32_le().unwrap() as usize;
        let checksum = if has_checksum {
            Some(<[u8; 4]>::try_from(parser.read(4).unwrap()).unwrap())
        } else {
            None
        };

        if parser.remaining() < payload_len {
            return MessageParseOutcome::NoMessage;
        }

        let payload = parser.read(payload_len).unwrap().to_vec();
        let command_name = format_command_bytes(command_bytes);
        let consumed = parser.pos();

        // The frame is fully buffered: commit it (drop it from the front of
        // the buffer) before inspecting it further, so a bad checksum or an
        // unrecognized command can never leave the buffer stuck replaying
        // the same bytes.
        buffer.shift_left(consumed);

        if let Some(checksum) = checksum {
            if checksum != double_sha256(&payload)[..4] {
                return MessageParseOutcome::ChecksumMismatch { command: command_name, garbage_skipped };
            }
        }

        match Command::try_from(command_bytes) {
            Ok(command) => MessageParseOutcome::Message {
                message: RawMessage { chain: expected_chain, command, payload },
                garbage_skipped,
            },
            Err(_) => MessageParseOutcome::SkippedMessage { command_bytes: command_name, garbage_skipped },
        }
    }

    pub fn to_protocol_message(self) -> crate::error::PeerResult<ProtocolMessage> {
        ProtocolMessage::decode(self.command, &self.payload)
    }

    /// Builds the envelope for an outbound message on `chain`.
    pub fn from_protocol_message(chain: Chain, message: &ProtocolMessage) -> Self {
        let (command, payload) = message.encode();
        RawMessage::new(chain, command, payload)
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

pub(crate) fn double_sha256(input: &[u8]) -> [u8; 32] {
    sha256(&sha256(input))
}

fn sha256(input: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::default();
    hasher.update(input);
    hasher.finalize_fixed().into()
}
