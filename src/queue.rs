// lamport-mutex - Distributed mutual exclusion over a fixed peer set using Lamport clocks
// Copyright (C) 2021  rumblefrog
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

/// One outstanding lock request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request {
    pub ts: i32,
    pub pid: i32,
}

impl Request {
    fn order_key(&self) -> (i32, i32) {
        (self.ts, self.pid)
    }
}

impl PartialOrd for Request {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Request {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.order_key().cmp(&other.order_key())
    }
}

/// Replicated, totally-ordered set of outstanding requests.
///
/// Kept as a flat `Vec` sorted by `(ts, pid)`, scanned linearly on every
/// operation. N is small in practice (the reference scenarios cap it at
/// 100), so this is simpler and no slower than a heap in this regime, and
/// it gives `head()` as a plain first-element read.
#[derive(Debug, Default)]
pub struct RequestQueue {
    entries: Vec<Request>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Inserts `(ts, pid)` at its ordered position. Idempotent when a
    /// record for `pid` already exists with the same timestamp; otherwise
    /// the pre-existing record for `pid` is replaced and the caller should
    /// treat this as a logged protocol violation rather than a hard error.
    pub fn insert(&mut self, ts: i32, pid: i32) {
        if let Some(existing) = self.entries.iter().position(|r| r.pid == pid) {
            if self.entries[existing].ts == ts {
                return;
            }

            self.entries.remove(existing);
        }

        let record = Request { ts, pid };

        let pos = self
            .entries
            .binary_search(&record)
            .unwrap_or_else(|pos| pos);

        self.entries.insert(pos, record);
    }

    /// Removes the record for `pid`; no-op if absent.
    pub fn remove(&mut self, pid: i32) {
        self.entries.retain(|r| r.pid != pid);
    }

    /// The minimum record in the queue, if any.
    pub fn head(&self) -> Option<Request> {
        self.entries.first().copied()
    }

    /// The timestamp of `pid`'s outstanding request, if present.
    pub fn ts_of(&self, pid: i32) -> Option<i32> {
        self.entries.iter().find(|r| r.pid == pid).map(|r| r.ts)
    }

    pub fn contains(&self, pid: i32) -> bool {
        self.entries.iter().any(|r| r.pid == pid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_is_minimum_by_timestamp() {
        let mut q = RequestQueue::new();

        q.insert(5, 2);
        q.insert(3, 1);
        q.insert(9, 0);

        assert_eq!(q.head(), Some(Request { ts: 3, pid: 1 }));
    }

    #[test]
    fn tiebreak_by_pid() {
        let mut q = RequestQueue::new();

        q.insert(5, 2);
        q.insert(5, 0);
        q.insert(5, 1);

        assert_eq!(q.head(), Some(Request { ts: 5, pid: 0 }));
    }

    #[test]
    fn remove_is_noop_when_absent() {
        let mut q = RequestQueue::new();

        q.insert(1, 0);
        q.remove(7);

        assert_eq!(q.len(), 1);
    }

    #[test]
    fn insert_is_idempotent_for_identical_record() {
        let mut q = RequestQueue::new();

        q.insert(4, 0);
        q.insert(4, 0);

        assert_eq!(q.len(), 1);
    }

    #[test]
    fn ts_of_reflects_current_entry() {
        let mut q = RequestQueue::new();

        q.insert(4, 2);

        assert_eq!(q.ts_of(2), Some(4));
        assert_eq!(q.ts_of(9), None);
    }

    #[test]
    fn remove_then_reinsert_changes_order() {
        let mut q = RequestQueue::new();

        q.insert(1, 0);
        q.insert(2, 1);

        q.remove(0);
        q.insert(5, 0);

        assert_eq!(q.head(), Some(Request { ts: 2, pid: 1 }));
    }
}
