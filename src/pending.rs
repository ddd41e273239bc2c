//! One-shot rendezvous between an outbound `OPEN` and its eventual reply.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use std::collections::HashMap;
use tokio::sync::oneshot;

use crate::error::Error;

/// Resolution of a pending `OPEN`: the peer's assigned remote id, or the
/// reason it was refused.
pub type OpenOutcome = Result<u32, Error>;

/// Correlates outbound `OPEN` requests (keyed by the `localId` we chose) to
/// their eventual `OKAY` (success) or `CLSE` (rejection) reply.
///
/// This type does no locking of its own: the dispatcher keeps exactly one
/// instance behind the same lock that guards the established-stream table,
/// so that a `localId` can never simultaneously appear in both (see the
/// crate's `Tables` type).
#[derive(Debug, Default)]
pub struct PendingOpenTable {
    entries: HashMap<u32, oneshot::Sender<OpenOutcome>>,
}

impl PendingOpenTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `local_id` as awaiting a reply, returning the receiving half
    /// of the one-shot rendezvous.
    pub fn add(&mut self, local_id: u32) -> oneshot::Receiver<OpenOutcome> {
        let (tx, rx) = oneshot::channel();
        self.entries.insert(local_id, tx);
        rx
    }

    /// Complete a pending entry successfully with the peer's remote id.
    /// Returns `false` if no such entry existed (already resolved, already
    /// rejected, or never added).
    pub fn resolve(&mut self, local_id: u32, remote_id: u32) -> bool {
        match self.entries.remove(&local_id) {
            Some(tx) => {
                let _ = tx.send(Ok(remote_id));
                true
            }
            None => false,
        }
    }

    /// Complete a pending entry with an error. Returns `false` if no such
    /// entry existed.
    pub fn reject(&mut self, local_id: u32, error: Error) -> bool {
        match self.entries.remove(&local_id) {
            Some(tx) => {
                let _ = tx.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Remove an entry without resolving it (the sender is simply dropped,
    /// which fails the waiter with a `RecvError`). Used by `dispose()`.
    pub fn drain(&mut self) -> Vec<oneshot::Sender<OpenOutcome>> {
        self.entries.drain().map(|(_, tx)| tx).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_completes_the_receiver() {
        let mut table = PendingOpenTable::new();
        let rx = table.add(1);
        assert!(table.resolve(1, 42));
        assert_eq!(rx.try_recv().unwrap().unwrap(), 42);
    }

    #[test]
    fn duplicate_resolve_is_a_noop() {
        let mut table = PendingOpenTable::new();
        table.add(1);
        assert!(table.resolve(1, 42));
        assert!(!table.resolve(1, 43));
        assert!(!table.reject(1, Error::OpenRejected));
    }

    #[test]
    fn reject_delivers_the_error() {
        let mut table = PendingOpenTable::new();
        let rx = table.add(1);
        assert!(table.reject(1, Error::OpenRejected));
        assert!(matches!(rx.try_recv().unwrap(), Err(Error::OpenRejected)));
    }

    #[test]
    fn unknown_id_resolve_returns_false() {
        let mut table = PendingOpenTable::new();
        assert!(!table.resolve(7, 1));
    }
}
