mod addr;
mod block;
mod buffer;
pub mod connection;
mod inventory;
pub mod messages;
pub mod node;
pub mod raw_message;
mod tx;

pub use addr::{AddrEntry, AddrMessage, MAX_ADDR_ENTRIES};
pub use block::{Block, BlockHeader, BlockMessage};
pub use connection::Connection;
pub use inventory::{GetBlocksMessage, GetDataMessage, InvMessage, InventoryVector, INV_TYPE_BLOCK, INV_TYPE_TX};
pub use tx::{Transaction, TxIn, TxMessage, TxOut};
