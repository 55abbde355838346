//! Replicated log: 1-indexed entries with a commit watermark.

use parking_lot::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// 1-based position in the log.
    pub index: u64,
    pub term: u64,
    pub data: Vec<u8>,
}

#[derive(Default)]
struct LogInner {
    entries: Vec<LogEntry>,
    commit_index: u64,
    last_applied: u64,
}

pub struct RaftLog {
    inner: Mutex<LogInner>,
}

impl RaftLog {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LogInner::default()),
        }
    }

    /// Appends a leader-proposed command, returning its index.
    pub fn append(&self, term: u64, data: Vec<u8>) -> u64 {
        let mut inner = self.inner.lock();
        let index = inner.entries.len() as u64 + 1;
        inner.entries.push(LogEntry { index, term, data });
        index
    }

    /// Appends an entry received from the leader at its declared index.
    pub fn append_entry(&self, entry: LogEntry) {
        self.inner.lock().entries.push(entry);
    }

    pub fn entry(&self, index: u64) -> Option<LogEntry> {
        if index == 0 {
            return None;
        }
        self.inner.lock().entries.get(index as usize - 1).cloned()
    }

    pub fn entries_from(&self, index: u64) -> Vec<LogEntry> {
        let inner = self.inner.lock();
        if index == 0 || index as usize > inner.entries.len() {
            return Vec::new();
        }
        inner.entries[index as usize - 1..].to_vec()
    }

    pub fn last_index(&self) -> u64 {
        self.inner.lock().entries.len() as u64
    }

    pub fn last_term(&self) -> u64 {
        let inner = self.inner.lock();
        inner.entries.last().map(|e| e.term).unwrap_or(0)
    }

    /// Drops every entry at or after `index` (conflict resolution).
    pub fn truncate_from(&self, index: u64) {
        let mut inner = self.inner.lock();
        let keep = index.saturating_sub(1) as usize;
        inner.entries.truncate(keep);
    }

    /// Advances the commit watermark, clamped to the last entry.
    pub fn set_commit_index(&self, index: u64) {
        let mut inner = self.inner.lock();
        inner.commit_index = index.min(inner.entries.len() as u64);
    }

    pub fn commit_index(&self) -> u64 {
        self.inner.lock().commit_index
    }

    pub fn committed_entries(&self) -> Vec<LogEntry> {
        let inner = self.inner.lock();
        inner.entries[..inner.commit_index as usize].to_vec()
    }

    pub fn mark_applied(&self, index: u64) {
        self.inner.lock().last_applied = index;
    }

    pub fn last_applied(&self) -> u64 {
        self.inner.lock().last_applied
    }
}

impl Default for RaftLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_assigns_one_based_indexes() {
        let log = RaftLog::new();
        assert_eq!(log.append(1, b"a".to_vec()), 1);
        assert_eq!(log.append(1, b"b".to_vec()), 2);
        assert_eq!(log.last_index(), 2);
        assert_eq!(log.last_term(), 1);
    }

    #[test]
    fn empty_log_has_zero_index_and_term() {
        let log = RaftLog::new();
        assert_eq!(log.last_index(), 0);
        assert_eq!(log.last_term(), 0);
        assert_eq!(log.entry(0), None);
        assert_eq!(log.entry(1), None);
    }

    #[test]
    fn commit_index_is_clamped_to_the_log() {
        let log = RaftLog::new();
        log.append(1, b"a".to_vec());
        log.set_commit_index(10);
        assert_eq!(log.commit_index(), 1);
        assert_eq!(log.committed_entries().len(), 1);
    }

    #[test]
    fn truncate_drops_conflicting_suffix() {
        let log = RaftLog::new();
        log.append(1, b"a".to_vec());
        log.append(1, b"b".to_vec());
        log.append(2, b"c".to_vec());
        log.truncate_from(2);
        assert_eq!(log.last_index(), 1);
        assert_eq!(log.entries_from(1).len(), 1);
    }

    #[test]
    fn entries_from_returns_the_suffix() {
        let log = RaftLog::new();
        for i in 0..5 {
            log.append(1, vec![i]);
        }
        let tail = log.entries_from(3);
        assert_eq!(tail.len(), 3);
        assert_eq!(tail[0].index, 3);
    }
}
