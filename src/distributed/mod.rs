//! # Distributed Primitives
//!
//! The pieces the sharded write path composes: a hybrid logical clock for
//! totally ordered timestamps across loosely synchronized nodes, an MVCC
//! store whose readers never block, and a two-phase commit coordinator
//! driving in-process participants.

mod hlc;
mod mvcc;
mod two_phase;

pub use hlc::{Hlc, Timestamp};
pub use mvcc::MvccStore;
pub use two_phase::{
    Coordinator, LocalParticipant, Participant, PrepareVote, TwoPhaseState, WriteIntent,
};
