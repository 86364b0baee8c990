//! Tracks the single client peer the proxy currently routes server-to-client
//! traffic toward. Single-peer assumption, mirroring the Server.

use std::net::SocketAddr;
use std::sync::Mutex;

#[derive(Default)]
pub struct ProxyState {
    client_peer: Mutex<Option<SocketAddr>>,
}

impl ProxyState {
    pub fn new() -> Self {
        ProxyState::default()
    }

    pub fn record_client(&self, peer: SocketAddr) {
        *self.client_peer.lock().unwrap() = Some(peer);
    }

    pub fn client_peer(&self) -> Option<SocketAddr> {
        *self.client_peer.lock().unwrap()
    }
}
