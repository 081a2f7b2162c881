use crate::error::{BlockchainError, Result};
use crate::network::Message;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use uuid::Uuid;

const TCP_WRITE_TIMEOUT: u64 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Connecting,
    Open,
    Closed,
}

/// One live connection. Reads happen on the session thread; writes from
/// any thread go through `writer`.
pub struct Peer {
    id: Uuid,
    addr: SocketAddr,
    outbound: bool,
    state: RwLock<PeerState>,
    writer: Mutex<TcpStream>,
}

impl Peer {
    pub fn new(stream: TcpStream, outbound: bool) -> Result<Peer> {
        let addr = stream.peer_addr()?;
        stream.set_write_timeout(Some(Duration::from_millis(TCP_WRITE_TIMEOUT)))?;
        Ok(Peer {
            id: Uuid::new_v4(),
            addr,
            outbound,
            state: RwLock::new(PeerState::Connecting),
            writer: Mutex::new(stream),
        })
    }

    pub fn get_id(&self) -> Uuid {
        self.id
    }

    pub fn get_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_outbound(&self) -> bool {
        self.outbound
    }

    pub fn get_state(&self) -> PeerState {
        match self.state.read() {
            Ok(state) => *state,
            Err(_) => {
                error!("Failed to acquire read lock on peer state");
                PeerState::Closed
            }
        }
    }

    pub fn set_state(&self, new_state: PeerState) {
        match self.state.write() {
            Ok(mut state) => {
                debug!("Peer {} ({}): {:?} -> {new_state:?}", self.id, self.addr, *state);
                *state = new_state;
            }
            Err(_) => error!("Failed to acquire write lock on peer state"),
        }
    }

    /// A second handle on the socket for the session's reader
    pub fn reader(&self) -> Result<TcpStream> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| BlockchainError::Lock("Peer writer lock poisoned".to_string()))?;
        Ok(writer.try_clone()?)
    }

    pub fn send(&self, message: &Message) -> Result<()> {
        let line = message.encode()?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| BlockchainError::Lock("Peer writer lock poisoned".to_string()))?;
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| BlockchainError::Peer(format!("Failed to send to {}: {e}", self.addr)))
    }

    /// Shut the socket down; the session's reader sees end of stream
    pub fn close(&self) {
        self.set_state(PeerState::Closed);
        if let Ok(writer) = self.writer.lock() {
            let _ = writer.shutdown(Shutdown::Both);
        }
    }
}

/// ( K -> connection id, V => Peer )
pub struct PeerRegistry {
    inner: RwLock<HashMap<Uuid, Arc<Peer>>>,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    pub fn new() -> PeerRegistry {
        PeerRegistry {
            inner: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, peer: Arc<Peer>) {
        match self.inner.write() {
            Ok(mut peers) => {
                info!("Registered peer {} ({})", peer.get_id(), peer.get_addr());
                peers.insert(peer.get_id(), peer);
            }
            Err(_) => error!("Failed to acquire write lock on peer registry"),
        }
    }

    pub fn remove(&self, id: &Uuid) {
        match self.inner.write() {
            Ok(mut peers) => {
                if let Some(peer) = peers.remove(id) {
                    info!("Removed peer {} ({})", peer.get_id(), peer.get_addr());
                }
            }
            Err(_) => error!("Failed to acquire write lock on peer registry"),
        }
    }

    /// Open peers at the time of the call
    pub fn snapshot(&self) -> Vec<Arc<Peer>> {
        match self.inner.read() {
            Ok(peers) => peers
                .values()
                .filter(|peer| peer.get_state() == PeerState::Open)
                .cloned()
                .collect(),
            Err(_) => {
                error!("Failed to acquire read lock on peer registry");
                Vec::new()
            }
        }
    }

    /// True if an outbound connection to `addr` is already registered
    pub fn is_connected_to(&self, addr: &SocketAddr) -> bool {
        match self.inner.read() {
            Ok(peers) => peers.values().any(|peer| {
                peer.is_outbound() && peer.get_addr() == *addr && peer.get_state() != PeerState::Closed
            }),
            Err(_) => {
                error!("Failed to acquire read lock on peer registry");
                false
            }
        }
    }

    pub fn endpoints(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|peer| peer.get_addr().to_string())
            .collect()
    }

    /// Send `message` to every open peer; a failing peer does not stop the rest
    pub fn broadcast(&self, message: &Message) {
        for peer in self.snapshot() {
            if let Err(e) = peer.send(message) {
                warn!("Broadcast to {} failed: {e}", peer.get_addr());
            }
        }
    }

    pub fn close_all(&self) {
        let peers: Vec<Arc<Peer>> = match self.inner.read() {
            Ok(peers) => peers.values().cloned().collect(),
            Err(_) => {
                error!("Failed to acquire read lock on peer registry");
                return;
            }
        };
        for peer in peers {
            peer.close();
        }
    }

    pub fn len(&self) -> usize {
        match self.inner.read() {
            Ok(peers) => peers.len(),
            Err(_) => {
                error!("Failed to acquire read lock on peer registry");
                0
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;

    fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn test_broadcast_reaches_open_peers_only() {
        let (open_local, open_remote) = connected_pair();
        let (pending_local, _pending_remote) = connected_pair();

        let registry = PeerRegistry::new();
        let open = Arc::new(Peer::new(open_local, true).unwrap());
        open.set_state(PeerState::Open);
        let pending = Arc::new(Peer::new(pending_local, true).unwrap());
        registry.register(Arc::clone(&open));
        registry.register(Arc::clone(&pending));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.snapshot().len(), 1);

        registry.broadcast(&Message::QueryAllBlocks);
        let mut line = String::new();
        BufReader::new(open_remote).read_line(&mut line).unwrap();
        assert_eq!(Message::decode(&line).unwrap(), Message::QueryAllBlocks);
    }

    #[test]
    fn test_broadcast_survives_closed_peer() {
        let (dead_local, dead_remote) = connected_pair();
        let (live_local, live_remote) = connected_pair();
        drop(dead_remote);

        let registry = PeerRegistry::new();
        for stream in [dead_local, live_local] {
            let peer = Arc::new(Peer::new(stream, false).unwrap());
            peer.set_state(PeerState::Open);
            registry.register(peer);
        }

        registry.broadcast(&Message::QueryTransactionPool);
        registry.broadcast(&Message::QueryTransactionPool);

        let mut reader = BufReader::new(live_remote);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(Message::decode(&line).unwrap(), Message::QueryTransactionPool);
    }

    #[test]
    fn test_duplicate_detection_and_removal() {
        let (local, _remote) = connected_pair();
        let registry = PeerRegistry::new();
        let peer = Arc::new(Peer::new(local, true).unwrap());
        let addr = peer.get_addr();
        registry.register(Arc::clone(&peer));

        assert!(registry.is_connected_to(&addr));
        registry.remove(&peer.get_id());
        assert!(!registry.is_connected_to(&addr));
        assert!(registry.is_empty());
    }
}
