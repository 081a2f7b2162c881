use crate::error::{BlockchainError, Result};
use crate::network::{handle_message, Message, Peer, PeerRegistry, PeerState};
use crate::node::Node;
use log::{debug, error, info, warn};
use std::io::{self, BufRead, BufReader, ErrorKind, Read};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

const TCP_CONNECT_TIMEOUT: u64 = 5000;
const ACCEPT_POLL_INTERVAL: u64 = 50;
/// Longest accepted message line, newline included
const MAX_MESSAGE_BYTES: u64 = 32 * 1024 * 1024;

/// Outcome of reading one newline-delimited frame
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Line,
    Oversized,
    Eof,
}

/// Read the next line into `buf`, never buffering more than `limit` bytes
fn read_frame<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>, limit: u64) -> io::Result<Frame> {
    buf.clear();
    let read = reader.by_ref().take(limit).read_until(b'\n', buf)?;
    if read == 0 {
        return Ok(Frame::Eof);
    }
    if buf.last() != Some(&b'\n') && read as u64 >= limit {
        return Ok(Frame::Oversized);
    }
    Ok(Frame::Line)
}

/// P2P endpoint of a node: accepts inbound peers, dials outbound ones and
/// runs one session thread per connection.
pub struct Server {
    node: Arc<Node>,
    peers: Arc<PeerRegistry>,
    local_addr: RwLock<Option<SocketAddr>>,
}

impl Server {
    pub fn new(node: Arc<Node>) -> Server {
        let peers = Arc::clone(node.peers());
        Server {
            node,
            peers,
            local_addr: RwLock::new(None),
        }
    }

    pub fn get_node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Bind `addr` and accept peers on a background thread until the node stops.
    /// Returns the bound address.
    pub fn listen(&self, addr: &str) -> Result<SocketAddr> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| BlockchainError::Peer(format!("Failed to bind to {addr}: {e}")))?;
        // polled so that a stopped node releases the port
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;
        match self.local_addr.write() {
            Ok(mut slot) => *slot = Some(local_addr),
            Err(_) => return Err(BlockchainError::Lock("Server address lock poisoned".to_string())),
        }
        info!("Listening for peers on {local_addr}");

        let node = Arc::clone(&self.node);
        let peers = Arc::clone(&self.peers);
        thread::spawn(move || Self::accept_loop(listener, node, peers));
        Ok(local_addr)
    }

    fn accept_loop(listener: TcpListener, node: Arc<Node>, peers: Arc<PeerRegistry>) {
        while !node.is_stopped() {
            match listener.accept() {
                Ok((stream, peer_addr)) => {
                    info!("Accepted connection from {peer_addr}");
                    let result = stream
                        .set_nonblocking(false)
                        .map_err(BlockchainError::from)
                        .and_then(|_| Peer::new(stream, false));
                    match result {
                        Ok(peer) => Self::start_session(Arc::new(peer), &node, &peers),
                        Err(e) => error!("Failed to set up connection from {peer_addr}: {e}"),
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(ACCEPT_POLL_INTERVAL));
                }
                Err(e) => error!("Error accepting connection: {e}"),
            }
        }
        info!("Peer listener stopped");
    }

    /// Open a connection to `addr`, register it and start the initial pull.
    /// Connections to this node itself or to an already connected peer are refused.
    pub fn connect_to_peer(&self, addr: &str) -> Result<()> {
        if self.node.is_stopped() {
            return Err(BlockchainError::Peer("Node is stopped".to_string()));
        }
        let socket_addr = addr
            .to_socket_addrs()
            .map_err(|e| BlockchainError::Peer(format!("Invalid address {addr}: {e}")))?
            .next()
            .ok_or_else(|| BlockchainError::Peer(format!("Address {addr} did not resolve")))?;

        if self.is_self(&socket_addr) {
            return Err(BlockchainError::Peer(format!(
                "Refusing to connect to self at {addr}"
            )));
        }
        if self.peers.is_connected_to(&socket_addr) {
            return Err(BlockchainError::Peer(format!("Already connected to {addr}")));
        }

        let stream =
            TcpStream::connect_timeout(&socket_addr, Duration::from_millis(TCP_CONNECT_TIMEOUT))
                .map_err(|e| {
                    BlockchainError::Peer(format!("Failed to connect to {addr}: {e}"))
                })?;
        let peer = Arc::new(Peer::new(stream, true)?);
        info!("Connected to peer {socket_addr}");
        Self::start_session(peer, &self.node, &self.peers);
        Ok(())
    }

    pub fn add_peer(&self, addr: &str) -> Result<()> {
        self.connect_to_peer(addr)
    }

    fn is_self(&self, addr: &SocketAddr) -> bool {
        let local = match self.local_addr.read() {
            Ok(local) => *local,
            Err(_) => return false,
        };
        match local {
            Some(local) if local.port() == addr.port() => {
                // a wildcard listener is only known to be reachable at loopback
                local.ip() == addr.ip() || (local.ip().is_unspecified() && addr.ip().is_loopback())
            }
            _ => false,
        }
    }

    fn start_session(peer: Arc<Peer>, node: &Arc<Node>, peers: &Arc<PeerRegistry>) {
        let reader = match peer.reader() {
            Ok(reader) => reader,
            Err(e) => {
                error!("Failed to open reader for {}: {e}", peer.get_addr());
                peer.close();
                return;
            }
        };
        peers.register(Arc::clone(&peer));
        peer.set_state(PeerState::Open);

        for query in [Message::QueryLatestBlock, Message::QueryTransactionPool] {
            if let Err(e) = peer.send(&query) {
                warn!("Initial query to {} failed: {e}", peer.get_addr());
            }
        }

        let node = Arc::clone(node);
        let peers = Arc::clone(peers);
        thread::spawn(move || {
            Self::run_session(&peer, reader, &node);
            peer.set_state(PeerState::Closed);
            peers.remove(&peer.get_id());
        });
    }

    fn run_session(peer: &Peer, reader: TcpStream, node: &Node) {
        let addr = peer.get_addr();
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            match read_frame(&mut reader, &mut buf, MAX_MESSAGE_BYTES) {
                Ok(Frame::Line) => {}
                Ok(Frame::Oversized) => {
                    warn!("Message from {addr} exceeds {MAX_MESSAGE_BYTES} bytes, closing");
                    break;
                }
                Ok(Frame::Eof) => break,
                Err(e) => {
                    debug!("Connection to {addr} ended: {e}");
                    break;
                }
            }

            let line = match std::str::from_utf8(&buf) {
                Ok(line) => line.trim(),
                Err(e) => {
                    let e = BlockchainError::Peer(format!("Message is not UTF-8: {e}"));
                    warn!("Dropping message from {addr}: {e}");
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }

            let message = match Message::decode(line) {
                Ok(message) => message,
                Err(e) => {
                    warn!("Dropping message from {addr}: {e}");
                    continue;
                }
            };
            debug!("Received from {addr}: {}", message_kind(&message));

            if let Some(reply) = handle_message(node, message) {
                if let Err(e) = peer.send(&reply) {
                    warn!("Reply to {addr} failed: {e}");
                }
            }
        }
        info!("Peer {addr} disconnected");
    }
}

fn message_kind(message: &Message) -> String {
    match message {
        Message::QueryLatestBlock => "QueryLatestBlock".to_string(),
        Message::QueryAllBlocks => "QueryAllBlocks".to_string(),
        Message::ResponseBlocks(blocks) => format!("ResponseBlocks({})", blocks.len()),
        Message::QueryTransactionPool => "QueryTransactionPool".to_string(),
        Message::ResponseTransactionPool(txs) => format!("ResponseTransactionPool({})", txs.len()),
        Message::NewBlock(block) => format!("NewBlock({})", block.index),
        Message::NewTransaction(tx) => format!("NewTransaction({})", tx.id),
    }
}
