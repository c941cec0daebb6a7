//! Max-heap of leveraged positions keyed by a leverage-rank proxy.
//!
//! The pool keeps two of these: one for shorts, one for longs. The root is
//! always the position with the highest debt/collateral ratio, which is the
//! first candidate for auto-liquidation.
//!
//! Slots are 1-based on the outside so that `0` can mean "not in a heap" in
//! `Position::heap_index`. Every time a node lands in a new slot the heap
//! reports `(account, slot)` through the `on_move` callback; a removed node is
//! reported with slot `0`. Callers use this to keep positions in sync without
//! the heap holding references into the position map.
//!
//! Between `begin` and `commit` the heap keeps the first value of every slot
//! it writes, so `rollback` restores it without copying untouched nodes.

use crate::types::AccountId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapNode {
    /// Discounted debt over discounted collateral, Q48. Ordering only.
    pub key: u128,
    pub account: AccountId,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeverageHeap {
    nodes: Vec<HeapNode>,
    #[serde(skip)]
    undo: Option<HeapUndo>,
}

#[derive(Debug, Clone, Default)]
struct HeapUndo {
    len: usize,
    saved: HashMap<usize, HeapNode>,
}

impl PartialEq for LeverageHeap {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

impl Eq for LeverageHeap {}

impl LeverageHeap {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            undo: None,
        }
    }

    /// Starts recording overwritten slots.
    pub fn begin(&mut self) {
        self.undo = Some(HeapUndo {
            len: self.nodes.len(),
            saved: HashMap::new(),
        });
    }

    pub fn commit(&mut self) {
        self.undo = None;
    }

    /// Restores the heap as it was at `begin`. No-op outside a recording.
    pub fn rollback(&mut self) {
        let Some(undo) = self.undo.take() else {
            return;
        };
        // a slot below the old length is either untouched or saved
        let restored: Vec<HeapNode> = (0..undo.len)
            .filter_map(|i| undo.saved.get(&i).or_else(|| self.nodes.get(i)).copied())
            .collect();
        self.nodes = restored;
    }

    fn save(&mut self, index: usize) {
        if let Some(undo) = self.undo.as_mut() {
            if index < undo.len {
                if let Some(node) = self.nodes.get(index) {
                    undo.saved.entry(index).or_insert(*node);
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The worst-ranked node, O(1).
    pub fn peek(&self) -> Option<&HeapNode> {
        self.nodes.first()
    }

    pub fn get(&self, slot: u32) -> Option<&HeapNode> {
        if slot == 0 {
            return None;
        }
        self.nodes.get(slot as usize - 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &HeapNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (i as u32 + 1, n))
    }

    pub fn insert<F>(&mut self, node: HeapNode, mut on_move: F) -> u32
    where
        F: FnMut(AccountId, u32),
    {
        self.save(self.nodes.len());
        self.nodes.push(node);
        let last = self.nodes.len() - 1;
        on_move(node.account, last as u32 + 1);
        let slot = self.sift_up(last, &mut on_move);
        slot as u32 + 1
    }

    /// Removes the node at `slot`, wherever it sits. Returns `None` for an
    /// empty or out-of-range slot.
    pub fn remove<F>(&mut self, slot: u32, mut on_move: F) -> Option<HeapNode>
    where
        F: FnMut(AccountId, u32),
    {
        if slot == 0 || slot as usize > self.nodes.len() {
            return None;
        }
        let index = slot as usize - 1;
        self.save(index);
        self.save(self.nodes.len() - 1);
        let removed = self.nodes.swap_remove(index);
        on_move(removed.account, 0);

        if index < self.nodes.len() {
            on_move(self.nodes[index].account, index as u32 + 1);
            let settled = self.sift_up(index, &mut on_move);
            if settled == index {
                self.sift_down(index, &mut on_move);
            }
        }
        Some(removed)
    }

    pub fn pop<F>(&mut self, on_move: F) -> Option<HeapNode>
    where
        F: FnMut(AccountId, u32),
    {
        self.remove(1, on_move)
    }

    /// Re-keys the node at `slot` and restores heap order.
    pub fn update_key<F>(&mut self, slot: u32, key: u128, mut on_move: F) -> bool
    where
        F: FnMut(AccountId, u32),
    {
        if slot == 0 || slot as usize > self.nodes.len() {
            return false;
        }
        let index = slot as usize - 1;
        self.save(index);
        let old = self.nodes[index].key;
        self.nodes[index].key = key;
        if key > old {
            self.sift_up(index, &mut on_move);
        } else if key < old {
            self.sift_down(index, &mut on_move);
        }
        true
    }

    /// Hands the node at `slot` to another account without moving it.
    pub fn set_account(&mut self, slot: u32, account: AccountId) -> bool {
        if slot == 0 || slot as usize > self.nodes.len() {
            return false;
        }
        self.save(slot as usize - 1);
        self.nodes[slot as usize - 1].account = account;
        true
    }

    fn sift_up<F>(&mut self, mut index: usize, on_move: &mut F) -> usize
    where
        F: FnMut(AccountId, u32),
    {
        while index > 0 {
            let parent = (index - 1) / 2;
            if self.nodes[index].key <= self.nodes[parent].key {
                break;
            }
            self.swap(index, parent, on_move);
            index = parent;
        }
        index
    }

    fn sift_down<F>(&mut self, mut index: usize, on_move: &mut F) -> usize
    where
        F: FnMut(AccountId, u32),
    {
        let len = self.nodes.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut largest = index;
            if left < len && self.nodes[left].key > self.nodes[largest].key {
                largest = left;
            }
            if right < len && self.nodes[right].key > self.nodes[largest].key {
                largest = right;
            }
            if largest == index {
                return index;
            }
            self.swap(index, largest, on_move);
            index = largest;
        }
    }

    fn swap<F>(&mut self, a: usize, b: usize, on_move: &mut F)
    where
        F: FnMut(AccountId, u32),
    {
        self.save(a);
        self.save(b);
        self.nodes.swap(a, b);
        on_move(self.nodes[a].account, a as u32 + 1);
        on_move(self.nodes[b].account, b as u32 + 1);
    }
}
