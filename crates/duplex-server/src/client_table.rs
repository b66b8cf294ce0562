use std::collections::HashMap;

#[derive(Default)]
struct PendingClient {
    msg_ready: bool,
    data_ready: bool,
}

impl PendingClient {
    fn ready(&self) -> bool {
        self.msg_ready && self.data_ready
    }
}

/// Tracks clients by peer address through the message/data handshake,
/// admitting one fully-paired client at a time.
///
/// Grounded on `server.cpp`'s `notReadyClients`/`connectedClients` maps and
/// `ClientInfo::ready()`: a client only becomes "connected" once both its
/// message and data sockets have arrived, and the acceptor refuses new
/// connections outright while a client is already connected.
#[derive(Default)]
pub struct ClientTable {
    pending: HashMap<String, PendingClient>,
    connected: Option<String>,
}

impl ClientTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_connected_client(&self) -> bool {
        self.connected.is_some()
    }

    pub fn connected_addr(&self) -> Option<&str> {
        self.connected.as_deref()
    }

    /// Records that `addr`'s message channel arrived. Returns `true` if
    /// this completes the pair and promotes `addr` to connected.
    pub fn msg_arrived(&mut self, addr: &str) -> bool {
        let entry = self.pending.entry(addr.to_string()).or_default();
        entry.msg_ready = true;
        self.promote_if_ready(addr)
    }

    /// Records that `addr`'s data channel arrived. Returns `true` if this
    /// completes the pair and promotes `addr` to connected.
    pub fn data_arrived(&mut self, addr: &str) -> bool {
        let entry = self.pending.entry(addr.to_string()).or_default();
        entry.data_ready = true;
        self.promote_if_ready(addr)
    }

    fn promote_if_ready(&mut self, addr: &str) -> bool {
        let ready = self.pending.get(addr).is_some_and(PendingClient::ready);
        if ready {
            self.pending.remove(addr);
            self.connected = Some(addr.to_string());
        }
        ready
    }

    /// Removes `addr` from both the pending and connected state, e.g. on
    /// disconnect.
    pub fn remove(&mut self, addr: &str) {
        self.pending.remove(addr);
        if self.connected.as_deref() == Some(addr) {
            self.connected = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotes_only_once_both_channels_arrive() {
        let mut table = ClientTable::new();
        assert!(!table.msg_arrived("1.2.3.4:1000"));
        assert!(!table.has_connected_client());
        assert!(table.data_arrived("1.2.3.4:1000"));
        assert!(table.has_connected_client());
        assert_eq!(table.connected_addr(), Some("1.2.3.4:1000"));
    }

    #[test]
    fn order_of_arrival_does_not_matter() {
        let mut table = ClientTable::new();
        assert!(!table.data_arrived("a"));
        assert!(table.msg_arrived("a"));
    }

    #[test]
    fn remove_clears_connected_state() {
        let mut table = ClientTable::new();
        table.msg_arrived("a");
        table.data_arrived("a");
        assert!(table.has_connected_client());
        table.remove("a");
        assert!(!table.has_connected_client());
    }
}
