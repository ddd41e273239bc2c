//! A marker for cheap (`Arc`/channel-handle) clones, as opposed to deep clones.
//
// SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later

use std::sync::Arc;

/// Like [`Clone`], but documents at the call site that the clone is cheap:
/// an `Arc` bump or a channel handle copy, never a deep copy.
pub trait Dupe {
    /// Returns a cheap copy of `self`.
    fn dupe(&self) -> Self;
}

impl<T: ?Sized> Dupe for Arc<T> {
    #[inline]
    fn dupe(&self) -> Self {
        Arc::clone(self)
    }
}

impl<T> Dupe for tokio::sync::mpsc::Sender<T> {
    #[inline]
    fn dupe(&self) -> Self {
        self.clone()
    }
}
