//! Replication driver: election timeouts and leader heartbeats over an
//! in-process transport.
//!
//! A background thread wakes every few milliseconds; a leader sends
//! heartbeats every `HEARTBEAT_INTERVAL`, everyone else starts an
//! election when the randomized 300-500 ms deadline passes without
//! hearing from a leader. The timeout jitter comes from the wall clock's
//! nanoseconds, which is all the spread distinct nodes need in-process.

use crate::raft::{
    AppendEntriesRequest, AppendEntriesResponse, NodeState, RaftLog, RaftNode, RequestVoteRequest,
    RequestVoteResponse,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);
pub const ELECTION_TIMEOUT_MIN: Duration = Duration::from_millis(300);
pub const ELECTION_TIMEOUT_SPREAD_MS: u64 = 200;

const TICK: Duration = Duration::from_millis(10);

/// How a node reaches its peers. In-process implementations route the
/// request straight into the peer's handler.
pub trait Transport: Send + Sync {
    fn send_append_entries(&self, peer: &str, request: &AppendEntriesRequest)
        -> AppendEntriesResponse;
    fn send_request_vote(&self, peer: &str, request: &RequestVoteRequest) -> RequestVoteResponse;
}

pub struct ReplicationManager {
    node: Arc<RaftNode>,
    log: Arc<RaftLog>,
    peers: Vec<String>,
    transport: Arc<dyn Transport>,
    election_deadline: Mutex<Instant>,
    running: AtomicBool,
    worker: Mutex<Option<(Sender<()>, JoinHandle<()>)>>,
}

fn jittered_timeout() -> Duration {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0);
    ELECTION_TIMEOUT_MIN + Duration::from_millis(nanos % ELECTION_TIMEOUT_SPREAD_MS)
}

impl ReplicationManager {
    pub fn new(
        node_id: impl Into<String>,
        peers: Vec<String>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            node: Arc::new(RaftNode::new(node_id)),
            log: Arc::new(RaftLog::new()),
            peers,
            transport,
            election_deadline: Mutex::new(Instant::now() + jittered_timeout()),
            running: AtomicBool::new(false),
            worker: Mutex::new(None),
        })
    }

    pub fn node(&self) -> &Arc<RaftNode> {
        &self.node
    }

    pub fn log(&self) -> &Arc<RaftLog> {
        &self.log
    }

    fn reset_election_deadline(&self) {
        *self.election_deadline.lock() = Instant::now() + jittered_timeout();
    }

    /// Spawns the timer loop. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.reset_election_deadline();

        let (stop_tx, stop_rx) = channel::<()>();
        let manager = Arc::clone(self);
        let handle = std::thread::spawn(move || {
            let mut last_heartbeat = Instant::now();
            loop {
                match stop_rx.recv_timeout(TICK) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                let now = Instant::now();
                if manager.node.state() == NodeState::Leader {
                    if now.duration_since(last_heartbeat) >= HEARTBEAT_INTERVAL {
                        manager.send_heartbeats();
                        last_heartbeat = now;
                    }
                } else if now >= *manager.election_deadline.lock() {
                    manager.run_election();
                    manager.reset_election_deadline();
                }
            }
        });
        *self.worker.lock() = Some((stop_tx, handle));
    }

    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some((stop_tx, handle)) = self.worker.lock().take() {
            let _ = stop_tx.send(());
            let _ = handle.join();
        }
    }

    /// One full election round: candidacy, votes from every peer,
    /// promotion on a majority.
    pub fn run_election(&self) {
        if self.node.state() == NodeState::Leader {
            return;
        }
        let request = self.node.start_election(&self.log);

        let mut votes = 1usize; // own vote
        let needed = (self.peers.len() + 1) / 2 + 1;
        for peer in &self.peers {
            let response = self.transport.send_request_vote(peer, &request);
            self.node.handle_vote_response(&response);
            if response.term > request.term {
                return; // demoted mid-election
            }
            if response.vote_granted {
                votes += 1;
            }
            if self.node.state() != NodeState::Candidate {
                return;
            }
            if votes >= needed {
                self.node.become_leader();
                self.send_heartbeats();
                return;
            }
        }
    }

    /// Leader liveness: empty AppendEntries to every peer.
    pub fn send_heartbeats(&self) {
        if self.node.state() != NodeState::Leader {
            return;
        }
        let request = self.node.heartbeat(&self.log);
        for peer in &self.peers {
            let response = self.transport.send_append_entries(peer, &request);
            self.node.handle_append_response(&response);
            if self.node.state() != NodeState::Leader {
                return;
            }
        }
    }

    /// Inbound AppendEntries: a valid leader resets the election timer.
    pub fn handle_append_entries(&self, request: &AppendEntriesRequest) -> AppendEntriesResponse {
        let response = self.node.handle_append_entries(request, &self.log);
        if response.success || request.term >= self.node.current_term() {
            self.reset_election_deadline();
        }
        response
    }

    /// Inbound RequestVote: granting a vote resets the election timer.
    pub fn handle_request_vote(&self, request: &RequestVoteRequest) -> RequestVoteResponse {
        let response = self.node.handle_request_vote(request, &self.log);
        if response.vote_granted {
            self.reset_election_deadline();
        }
        response
    }
}

impl Drop for ReplicationManager {
    fn drop(&mut self) {
        if let Some((stop_tx, handle)) = self.worker.lock().take() {
            let _ = stop_tx.send(());
            let _ = handle.join();
        }
    }
}
