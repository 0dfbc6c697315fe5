use std::collections::HashMap;
use std::net::SocketAddr;

use crate::wire_protocol::messages::ProtocolMessage;

/// Identity carried by every event so listeners can tell connections apart
/// without holding onto the `Connection` itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeerContext {
    pub peer: SocketAddr,
    pub inbound: bool,
}

#[derive(Clone, Debug)]
pub enum Event {
    /// Emitted after the outbound socket connects and the local `version`
    /// has been sent.
    Connect(PeerContext),
    /// Socket ended.
    Disconnect(PeerContext),
    /// Socket or protocol error. Carries a human-readable description; the
    /// connection is considered terminated once this fires.
    Error(PeerContext, String),
    /// A successfully parsed inbound message, also dispatched under its
    /// literal command name (see [Dispatcher::emit_message]).
    Message(PeerContext, ProtocolMessage),
}

pub const CONNECT: &str = "connect";
pub const DISCONNECT: &str = "disconnect";
pub const ERROR: &str = "error";

type Listener = Box<dyn FnMut(&Event)>;

/// A named-event publisher: one listener list per event name. Listeners are
/// invoked synchronously, in registration order, on whatever task is
/// currently driving the connection's sequential parse loop — so delivery
/// order for a given connection always equals on-wire frame order.
#[derive(Default)]
pub struct Dispatcher {
    listeners: HashMap<String, Vec<Listener>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Dispatcher::default()
    }

    /// Registers a listener for `event_name` (one of [CONNECT], [DISCONNECT],
    /// [ERROR], or a literal command string like `"version"`).
    pub fn on(&mut self, event_name: &str, listener: impl FnMut(&Event) + 'static) {
        self.listeners.entry(event_name.to_string()).or_default().push(Box::new(listener));
    }

    pub fn emit(&mut self, event_name: &str, event: &Event) {
        if let Some(listeners) = self.listeners.get_mut(event_name) {
            for listener in listeners.iter_mut() {
                listener(event);
            }
        }
    }

    pub fn emit_connect(&mut self, ctx: PeerContext) {
        self.emit(CONNECT, &Event::Connect(ctx));
    }

    pub fn emit_disconnect(&mut self, ctx: PeerContext) {
        self.emit(DISCONNECT, &Event::Disconnect(ctx));
    }

    pub fn emit_error(&mut self, ctx: PeerContext, message: impl Into<String>) {
        self.emit(ERROR, &Event::Error(ctx, message.into()));
    }

    /// Dispatches a decoded inbound message under its literal command name.
    pub fn emit_message(&mut self, ctx: PeerContext, message: ProtocolMessage) {
        let name = message.command().name().to_string();
        self.emit(&name, &Event::Message(ctx, message));
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::wire_protocol::messages::{PingMessage, ProtocolMessage};

    #[test]
    fn listeners_for_an_event_fire_in_registration_order() {
        let order = Rc::new(RefCell::new(vec![]));
        let mut dispatcher = Dispatcher::new();

        let order1 = order.clone();
        dispatcher.on("ping", move |_| order1.borrow_mut().push(1));
        let order2 = order.clone();
        dispatcher.on("ping", move |_| order2.borrow_mut().push(2));

        let ctx = PeerContext { peer: "127.0.0.1:8333".parse().unwrap(), inbound: false };
        dispatcher.emit_message(ctx, ProtocolMessage::Ping(PingMessage));

        assert_eq!(*order.borrow(), vec![1, 2]);
    }

    #[test]
    fn listener_registered_for_a_different_event_does_not_fire() {
        let fired = Rc::new(RefCell::new(false));
        let fired_clone = fired.clone();
        let mut dispatcher = Dispatcher::new();
        dispatcher.on("verack", move |_| *fired_clone.borrow_mut() = true);

        let ctx = PeerContext { peer: "127.0.0.1:8333".parse().unwrap(), inbound: false };
        dispatcher.emit_message(ctx, ProtocolMessage::Ping(PingMessage));

        assert!(!*fired.borrow());
    }
}
