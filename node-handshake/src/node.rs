use std::cell::RefCell;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::rc::Rc;

use net::dispatcher::{Dispatcher, Event};
use net::error::{PeerError, PeerResult};
use net::wire_protocol::connection::Connection;
use net::wire_protocol::messages::{ProtocolMessage, VersionMessage};
use net::wire_protocol::node::NodeDesc;

pub struct Node {
    node_desc: NodeDesc,
    remote_nodes: HashMap<SocketAddr, Connection>,
}

impl Node {
    pub fn new(node_desc: NodeDesc) -> Self {
        Node {
            node_desc,
            remote_nodes: HashMap::new(),
        }
    }

    /// Dials `remote_addr`, runs the `version`/`verack` handshake to
    /// completion over the connection's event dispatcher, and returns the
    /// peer's advertised node description.
    pub async fn connect_with(&mut self, remote_addr: SocketAddr) -> PeerResult<NodeDesc> {
        let mut connection = Connection::dial(self.node_desc.chain, self.node_desc.clone(), remote_addr).await?;

        let mut dispatcher = Dispatcher::new();
        let peer_version: Rc<RefCell<Option<VersionMessage>>> = Rc::new(RefCell::new(None));
        let captured = peer_version.clone();
        dispatcher.on("version", move |event: &Event| {
            if let Event::Message(_, ProtocolMessage::Version(version)) = event {
                *captured.borrow_mut() = Some(version.clone());
            }
        });

        connection.send_version().await?;
        dispatcher.emit_connect(connection.context());

        connection.drive(&mut dispatcher, |conn| conn.active()).await?;

        let version = peer_version.borrow_mut().take()
            .ok_or_else(|| PeerError::from("connection became active without a recorded 'version' message"))?;

        self.remote_nodes.insert(remote_addr, connection);

        Ok(NodeDesc {
            chain: self.node_desc.chain,
            protocol_version: version.protocol_version,
            services: version.services,
            sub_ver: version.sub_ver,
            start_height: version.start_height,
        })
    }

    pub fn close_connection(&mut self, remote: SocketAddr) {
        // connection is closed by tokio when socket is dropped
        self.remote_nodes.remove(&remote);
    }
}
