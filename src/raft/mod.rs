//! # Raft Core
//!
//! The consensus state machine at the interface boundary of the engine:
//! node state transitions, leader election and log replication over an
//! in-process [`Transport`]. There is no network layer — peers are other
//! objects in the same process, which is all the replication tests and
//! the sharded write path need.
//!
//! ```text
//!            election timeout             majority votes
//! Follower ─────────────────> Candidate ─────────────────> Leader
//!     ^                          │                            │
//!     └── higher term observed ──┴──── higher term observed ──┘
//! ```
//!
//! The message handlers follow the Raft paper's receiver rules: a stale
//! term is rejected, a newer term demotes to follower, votes require the
//! candidate's log to be at least as fresh, and AppendEntries truncates
//! conflicting suffixes before appending.

mod log;
mod replication;

pub use log::{LogEntry, RaftLog};
pub use replication::{ReplicationManager, Transport};

use parking_lot::Mutex;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Follower,
    Candidate,
    Leader,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeState::Follower => "Follower",
            NodeState::Candidate => "Candidate",
            NodeState::Leader => "Leader",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestVoteRequest {
    pub term: u64,
    pub candidate_id: String,
    pub last_log_index: u64,
    pub last_log_term: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestVoteResponse {
    pub term: u64,
    pub vote_granted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendEntriesRequest {
    pub term: u64,
    pub leader_id: String,
    pub prev_log_index: u64,
    pub prev_log_term: u64,
    pub entries: Vec<LogEntry>,
    pub leader_commit: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendEntriesResponse {
    pub term: u64,
    pub success: bool,
}

struct NodeInner {
    current_term: u64,
    voted_for: Option<String>,
    state: NodeState,
    leader_id: Option<String>,
}

pub struct RaftNode {
    node_id: String,
    inner: Mutex<NodeInner>,
}

impl RaftNode {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            inner: Mutex::new(NodeInner {
                current_term: 0,
                voted_for: None,
                state: NodeState::Follower,
                leader_id: None,
            }),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn state(&self) -> NodeState {
        self.inner.lock().state
    }

    pub fn current_term(&self) -> u64 {
        self.inner.lock().current_term
    }

    pub fn voted_for(&self) -> Option<String> {
        self.inner.lock().voted_for.clone()
    }

    pub fn leader_id(&self) -> Option<String> {
        self.inner.lock().leader_id.clone()
    }

    pub fn become_follower(&self, leader_id: Option<String>) {
        let mut inner = self.inner.lock();
        inner.state = NodeState::Follower;
        inner.leader_id = leader_id;
    }

    pub fn become_leader(&self) {
        let mut inner = self.inner.lock();
        inner.state = NodeState::Leader;
        inner.leader_id = Some(self.node_id.clone());
    }

    /// Enters candidacy: bumps the term, votes for self, returns the
    /// vote request to broadcast.
    pub fn start_election(&self, log: &RaftLog) -> RequestVoteRequest {
        let mut inner = self.inner.lock();
        inner.current_term += 1;
        inner.state = NodeState::Candidate;
        inner.voted_for = Some(self.node_id.clone());
        RequestVoteRequest {
            term: inner.current_term,
            candidate_id: self.node_id.clone(),
            last_log_index: log.last_index(),
            last_log_term: log.last_term(),
        }
    }

    /// Receiver side of RequestVote.
    pub fn handle_request_vote(
        &self,
        request: &RequestVoteRequest,
        log: &RaftLog,
    ) -> RequestVoteResponse {
        let mut inner = self.inner.lock();

        if request.term < inner.current_term {
            return RequestVoteResponse {
                term: inner.current_term,
                vote_granted: false,
            };
        }
        if request.term > inner.current_term {
            inner.current_term = request.term;
            inner.voted_for = None;
            inner.state = NodeState::Follower;
        }

        let log_ok = request.last_log_term > log.last_term()
            || (request.last_log_term == log.last_term()
                && request.last_log_index >= log.last_index());
        let can_vote = inner
            .voted_for
            .as_ref()
            .map(|candidate| candidate == &request.candidate_id)
            .unwrap_or(true);

        let vote_granted = can_vote && log_ok;
        if vote_granted {
            inner.voted_for = Some(request.candidate_id.clone());
        }
        RequestVoteResponse {
            term: inner.current_term,
            vote_granted,
        }
    }

    /// Candidate side of a vote response: a higher term demotes.
    pub fn handle_vote_response(&self, response: &RequestVoteResponse) {
        let mut inner = self.inner.lock();
        if response.term > inner.current_term {
            inner.current_term = response.term;
            inner.voted_for = None;
            inner.state = NodeState::Follower;
        }
    }

    /// Leader side: an empty AppendEntries for liveness.
    pub fn heartbeat(&self, log: &RaftLog) -> AppendEntriesRequest {
        let inner = self.inner.lock();
        AppendEntriesRequest {
            term: inner.current_term,
            leader_id: self.node_id.clone(),
            prev_log_index: log.last_index(),
            prev_log_term: log.last_term(),
            entries: Vec::new(),
            leader_commit: log.commit_index(),
        }
    }

    /// Receiver side of AppendEntries: term check, log-matching check,
    /// conflict truncation, append, commit advance.
    pub fn handle_append_entries(
        &self,
        request: &AppendEntriesRequest,
        log: &RaftLog,
    ) -> AppendEntriesResponse {
        let mut inner = self.inner.lock();

        if request.term < inner.current_term {
            return AppendEntriesResponse {
                term: inner.current_term,
                success: false,
            };
        }

        inner.current_term = request.term;
        inner.state = NodeState::Follower;
        inner.leader_id = Some(request.leader_id.clone());
        inner.voted_for = None;

        if request.prev_log_index > 0 {
            match log.entry(request.prev_log_index) {
                Some(entry) if entry.term == request.prev_log_term => {}
                _ => {
                    return AppendEntriesResponse {
                        term: inner.current_term,
                        success: false,
                    }
                }
            }
        }

        for entry in &request.entries {
            match log.entry(entry.index) {
                Some(existing) if existing.term == entry.term => {}
                Some(_) => {
                    log.truncate_from(entry.index);
                    log.append_entry(entry.clone());
                }
                None => log.append_entry(entry.clone()),
            }
        }

        if request.leader_commit > log.commit_index() {
            log.set_commit_index(request.leader_commit);
        }

        AppendEntriesResponse {
            term: inner.current_term,
            success: true,
        }
    }

    /// Leader side of an AppendEntries response: a higher term demotes.
    pub fn handle_append_response(&self, response: &AppendEntriesResponse) {
        let mut inner = self.inner.lock();
        if response.term > inner.current_term {
            inner.current_term = response.term;
            inner.voted_for = None;
            inner.state = NodeState::Follower;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_node_starts_as_follower_at_term_zero() {
        let node = RaftNode::new("n1");
        assert_eq!(node.state(), NodeState::Follower);
        assert_eq!(node.current_term(), 0);
        assert_eq!(node.voted_for(), None);
    }

    #[test]
    fn start_election_bumps_term_and_votes_for_self() {
        let node = RaftNode::new("n1");
        let log = RaftLog::new();
        let request = node.start_election(&log);

        assert_eq!(node.state(), NodeState::Candidate);
        assert_eq!(request.term, 1);
        assert_eq!(request.candidate_id, "n1");
        assert_eq!(node.voted_for(), Some("n1".to_string()));
    }

    #[test]
    fn vote_is_granted_to_a_fresh_candidate() {
        let voter = RaftNode::new("n2");
        let log = RaftLog::new();
        let request = RequestVoteRequest {
            term: 1,
            candidate_id: "n1".to_string(),
            last_log_index: 0,
            last_log_term: 0,
        };
        let response = voter.handle_request_vote(&request, &log);
        assert!(response.vote_granted);
        assert_eq!(voter.voted_for(), Some("n1".to_string()));
    }

    #[test]
    fn stale_term_is_rejected() {
        let voter = RaftNode::new("n2");
        let log = RaftLog::new();
        voter.handle_request_vote(
            &RequestVoteRequest {
                term: 5,
                candidate_id: "n1".to_string(),
                last_log_index: 0,
                last_log_term: 0,
            },
            &log,
        );
        let response = voter.handle_request_vote(
            &RequestVoteRequest {
                term: 3,
                candidate_id: "n3".to_string(),
                last_log_index: 0,
                last_log_term: 0,
            },
            &log,
        );
        assert!(!response.vote_granted);
        assert_eq!(response.term, 5);
    }

    #[test]
    fn only_one_vote_per_term() {
        let voter = RaftNode::new("n3");
        let log = RaftLog::new();
        let first = RequestVoteRequest {
            term: 1,
            candidate_id: "n1".to_string(),
            last_log_index: 0,
            last_log_term: 0,
        };
        let second = RequestVoteRequest {
            term: 1,
            candidate_id: "n2".to_string(),
            last_log_index: 0,
            last_log_term: 0,
        };
        assert!(voter.handle_request_vote(&first, &log).vote_granted);
        assert!(!voter.handle_request_vote(&second, &log).vote_granted);
        // The same candidate asking again is fine.
        assert!(voter.handle_request_vote(&first, &log).vote_granted);
    }

    #[test]
    fn vote_denied_to_a_stale_log() {
        let voter = RaftNode::new("n2");
        let log = RaftLog::new();
        log.append(2, b"x".to_vec());

        let response = voter.handle_request_vote(
            &RequestVoteRequest {
                term: 3,
                candidate_id: "n1".to_string(),
                last_log_index: 5,
                last_log_term: 1,
            },
            &log,
        );
        assert!(!response.vote_granted, "older last term loses");
    }

    #[test]
    fn append_entries_adopts_the_leader() {
        let node = RaftNode::new("n2");
        let log = RaftLog::new();
        let response = node.handle_append_entries(
            &AppendEntriesRequest {
                term: 2,
                leader_id: "n1".to_string(),
                prev_log_index: 0,
                prev_log_term: 0,
                entries: vec![LogEntry {
                    index: 1,
                    term: 2,
                    data: b"set".to_vec(),
                }],
                leader_commit: 1,
            },
            &log,
        );
        assert!(response.success);
        assert_eq!(node.state(), NodeState::Follower);
        assert_eq!(node.leader_id(), Some("n1".to_string()));
        assert_eq!(log.last_index(), 1);
        assert_eq!(log.commit_index(), 1);
    }

    #[test]
    fn append_entries_rejects_a_log_gap() {
        let node = RaftNode::new("n2");
        let log = RaftLog::new();
        let response = node.handle_append_entries(
            &AppendEntriesRequest {
                term: 1,
                leader_id: "n1".to_string(),
                prev_log_index: 3,
                prev_log_term: 1,
                entries: Vec::new(),
                leader_commit: 0,
            },
            &log,
        );
        assert!(!response.success);
    }

    #[test]
    fn conflicting_entries_are_truncated() {
        let node = RaftNode::new("n2");
        let log = RaftLog::new();
        log.append(1, b"a".to_vec());
        log.append(1, b"stale".to_vec());

        let response = node.handle_append_entries(
            &AppendEntriesRequest {
                term: 2,
                leader_id: "n1".to_string(),
                prev_log_index: 1,
                prev_log_term: 1,
                entries: vec![LogEntry {
                    index: 2,
                    term: 2,
                    data: b"fresh".to_vec(),
                }],
                leader_commit: 0,
            },
            &log,
        );
        assert!(response.success);
        assert_eq!(log.last_index(), 2);
        assert_eq!(log.entry(2).unwrap().data, b"fresh");
        assert_eq!(log.entry(2).unwrap().term, 2);
    }

    #[test]
    fn higher_term_in_a_response_demotes_the_leader() {
        let node = RaftNode::new("n1");
        node.become_leader();
        node.handle_append_response(&AppendEntriesResponse {
            term: 9,
            success: false,
        });
        assert_eq!(node.state(), NodeState::Follower);
        assert_eq!(node.current_term(), 9);
    }
}
