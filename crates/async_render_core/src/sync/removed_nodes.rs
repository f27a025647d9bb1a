//! # Double-Buffered Removal Set
//!
//! Clones whose originals were deleted cannot be freed on the spot: the
//! render worker may still be traversing them. They are parked here and only
//! reclaimed one full cleanup cycle later.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌─────────────────────────────┐
//!                    │     RemovedNodesManager     │
//!                    │                             │
//!                    │  ┌─────────┐  ┌─────────┐   │
//!                    │  │ Set  A  │  │ Set  B  │   │
//!                    │  └────┬────┘  └────┬────┘   │
//!                    │       │            │        │
//!                    │  ┌────┴────────────┴────┐   │
//!                    │  │   Fill Index (0/1)   │   │
//!                    │  └──────────────────────┘   │
//!                    └─────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              ▼               ▼               ▼
//!      ┌──────────────┐ ┌────────────┐ ┌──────────────┐
//!      │    insert    │ │  contains  │ │   cleanup    │
//!      │ (fill set)   │ │ erase_node │ │ clear+swap   │
//!      └──────────────┘ └────────────┘ └──────────────┘
//! ```
//!
//! ## Thread Safety
//!
//! None needed: every method runs on the tick thread. The grace period, not
//! a lock, is what keeps the worker safe.

use std::collections::BTreeMap;

use crate::node::NodeId;

const DOUBLE_BUFFER_SIZE: usize = 2;

/// Double-buffered set of logically removed nodes.
///
/// `T` is whatever handle keeps a removed node alive; dropping it during
/// [`clean_removed_render_nodes`](Self::clean_removed_render_nodes) is the
/// physical delete.
///
/// ## Usage
///
/// ```rust,ignore
/// let mut removed = RemovedNodesManager::new();
///
/// removed.insert(clone.id(), clone);      // frame N
/// removed.clean_removed_render_nodes();   // frame N cleanup: moved, not freed
///
/// removed.for_each_in_process_array(|_, node| engine.release_render_node(node));
/// removed.clean_removed_render_nodes();   // frame N+1 cleanup: freed
/// ```
#[derive(Debug)]
pub struct RemovedNodesManager<T> {
    /// The two node sets.
    buffers: [BTreeMap<NodeId, T>; DOUBLE_BUFFER_SIZE],

    /// Index of the set receiving new removals.
    /// The process set is always (`fill_index` ^ 1).
    fill_index: usize,
}

impl<T> RemovedNodesManager<T> {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffers: [BTreeMap::new(), BTreeMap::new()],
            fill_index: 0,
        }
    }

    #[inline]
    fn process_index(&self) -> usize {
        self.fill_index ^ 1
    }

    /// Returns true if both sets are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.iter().all(BTreeMap::is_empty)
    }

    /// Total number of parked nodes across both sets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.iter().map(BTreeMap::len).sum()
    }

    /// Returns true if `id` is parked in either set.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.buffers.iter().any(|set| set.contains_key(&id))
    }

    /// Returns true if `id` was removed since the last cleanup.
    #[must_use]
    pub fn removed_this_frame(&self, id: NodeId) -> bool {
        self.buffers[self.fill_index].contains_key(&id)
    }

    /// Parks `node` in the fill set.
    pub fn insert(&mut self, id: NodeId, node: T) {
        self.buffers[self.fill_index].insert(id, node);
    }

    /// Removes `id` from both sets and hands back the parked handle.
    ///
    /// Both sets are scrubbed: a node may be erased while an older removal
    /// of it is still waiting in the process set.
    pub fn erase_node(&mut self, id: NodeId) -> Option<T> {
        let mut erased = None;
        for set in &mut self.buffers {
            if let Some(node) = set.remove(&id) {
                erased = Some(node);
            }
        }
        erased
    }

    /// Visits every node removed since the last cleanup.
    pub fn for_each_in_fill_array(&self, mut f: impl FnMut(NodeId, &T)) {
        for (id, node) in &self.buffers[self.fill_index] {
            f(*id, node);
        }
    }

    /// Visits every node due for reclamation at the next cleanup.
    pub fn for_each_in_process_array(&self, mut f: impl FnMut(NodeId, &T)) {
        for (id, node) in &self.buffers[self.process_index()] {
            f(*id, node);
        }
    }

    /// Drops the process set and swaps the roles of the two sets.
    ///
    /// Calling this twice with nothing inserted in between leaves nothing to
    /// drop the second time.
    pub fn clean_removed_render_nodes(&mut self) {
        let process = self.process_index();
        self.buffers[process].clear();
        self.fill_index = process;
    }
}

impl<T> Default for RemovedNodesManager<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_removed_nodes_creation() {
        let removed: RemovedNodesManager<()> = RemovedNodesManager::new();
        assert!(removed.is_empty());
        assert_eq!(removed.len(), 0);
    }

    #[test]
    fn test_insert_survives_first_cleanup() {
        let mut removed = RemovedNodesManager::new();
        let id = NodeId::next();
        let node = Arc::new(7_u32);
        removed.insert(id, Arc::clone(&node));

        assert!(removed.removed_this_frame(id));
        removed.clean_removed_render_nodes();

        // Moved to the process set, still alive
        assert!(removed.contains(id));
        assert!(!removed.removed_this_frame(id));
        assert_eq!(Arc::strong_count(&node), 2);

        let mut due = Vec::new();
        removed.for_each_in_process_array(|id, _| due.push(id));
        assert_eq!(due, vec![id]);

        removed.clean_removed_render_nodes();
        assert!(!removed.contains(id));
        assert!(removed.is_empty());
        assert_eq!(Arc::strong_count(&node), 1);
    }

    #[test]
    fn test_cleanup_is_idempotent_when_empty() {
        let mut removed = RemovedNodesManager::new();
        let node = Arc::new(());
        removed.insert(NodeId::next(), Arc::clone(&node));

        removed.clean_removed_render_nodes();
        removed.clean_removed_render_nodes();
        assert_eq!(Arc::strong_count(&node), 1);

        // Nothing left to drop
        removed.clean_removed_render_nodes();
        removed.clean_removed_render_nodes();
        assert!(removed.is_empty());
    }

    #[test]
    fn test_erase_scrubs_both_sets() {
        let mut removed = RemovedNodesManager::new();
        let id = NodeId::next();

        removed.insert(id, 1_u8);
        removed.clean_removed_render_nodes();
        removed.insert(id, 2_u8);
        assert_eq!(removed.len(), 2);

        assert!(removed.erase_node(id).is_some());
        assert!(!removed.contains(id));
        assert!(removed.is_empty());
    }

    #[test]
    fn test_fill_visit_only_sees_current_frame() {
        let mut removed = RemovedNodesManager::new();
        let old = NodeId::next();
        let new = NodeId::next();

        removed.insert(old, ());
        removed.clean_removed_render_nodes();
        removed.insert(new, ());

        let mut seen = Vec::new();
        removed.for_each_in_fill_array(|id, _| seen.push(id));
        assert_eq!(seen, vec![new]);
    }
}
