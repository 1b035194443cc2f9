//! Fixed-length aligned key storage
//!
//! Node and key interleave in one byte array, one element per slot with
//! stride `8 + key_len`. Reserved for keys whose width is a multiple of
//! four, which keeps every element on a word boundary; this is the layout
//! the factory picks for arithmetic scalar columns.

use super::TreeStore;
use crate::compare::KeyCompare;
use crate::tree::{self, Node, PathStack, TreeRoot};

const NODE_SIZE: usize = 8;

pub struct FixedAlignedStore {
    root: TreeRoot,
    index: Vec<u8>,
    element_length: usize,
}

impl FixedAlignedStore {
    pub fn new(key_length: usize) -> Self {
        debug_assert!(key_length > 0 && key_length % 4 == 0);
        FixedAlignedStore {
            root: TreeRoot::default(),
            index: Vec::new(),
            element_length: key_length + NODE_SIZE,
        }
    }

    fn key_length(&self) -> usize {
        self.element_length - NODE_SIZE
    }

    fn grow(&mut self, id: u32) {
        let needed = (id as usize + 1) * self.element_length;
        if needed > self.index.len() {
            self.index.resize(needed, 0xFF);
        }
    }

    fn write_key(&mut self, id: u32, key: &[u8]) {
        let at = id as usize * self.element_length + NODE_SIZE;
        self.index[at..at + key.len()].copy_from_slice(key);
    }

    pub fn store_check(&mut self, id: u32, key: &[u8], cmp: &KeyCompare) -> bool {
        debug_assert_eq!(key.len(), self.key_length());
        let mut stack = PathStack::new();
        let exists = tree::find_path_for_unique(&*self, &mut stack, key, cmp);
        if exists {
            return stack.top() == id;
        }
        self.grow(id);
        if TreeStore::node(self, id).is_used() {
            self.remove(id, cmp);
            self.write_key(id, key);
            tree::find_path_for_multi(&*self, &mut stack, id, cmp);
        } else {
            self.write_key(id, key);
        }
        debug_assert!(TreeStore::node(self, id).is_empty());
        tree::insert(self, &stack, id);
        true
    }

    pub fn store_cover(&mut self, id: u32, key: &[u8], cmp: &KeyCompare) {
        debug_assert_eq!(key.len(), self.key_length());
        self.grow(id);
        if TreeStore::node(self, id).is_used() {
            self.remove(id, cmp);
        }
        self.write_key(id, key);
        let mut stack = PathStack::new();
        tree::find_path_for_multi(&*self, &mut stack, id, cmp);
        tree::insert(self, &stack, id);
    }

    pub fn remove(&mut self, id: u32, cmp: &KeyCompare) {
        let mut stack = PathStack::new();
        let exists = tree::find_path_for_remove(&*self, &mut stack, id, cmp);
        debug_assert!(exists);
        tree::remove(self, &mut stack);
    }

    pub fn total_length(&self) -> u64 {
        self.root.count() as u64 * self.key_length() as u64
    }

    pub fn max_index(&self) -> u32 {
        (self.index.len() / self.element_length) as u32
    }

    pub fn memory_size(&self) -> u64 {
        (std::mem::size_of::<Self>() + self.index.len()) as u64
    }

    pub fn clear(&mut self) {
        self.root = TreeRoot::default();
        self.index.clear();
    }

    pub fn shrink_to_fit(&mut self) {
        self.index.shrink_to_fit();
    }
}

impl TreeStore for FixedAlignedStore {
    fn tree_root(&self) -> &TreeRoot {
        &self.root
    }

    fn tree_root_mut(&mut self) -> &mut TreeRoot {
        &mut self.root
    }

    fn node(&self, id: u32) -> Node {
        let at = id as usize * self.element_length;
        Node::from_bytes(self.index[at..at + NODE_SIZE].try_into().unwrap())
    }

    fn set_node(&mut self, id: u32, node: Node) {
        let at = id as usize * self.element_length;
        self.index[at..at + NODE_SIZE].copy_from_slice(&node.to_bytes());
    }

    fn key(&self, id: u32) -> &[u8] {
        let at = id as usize * self.element_length + NODE_SIZE;
        &self.index[at..at + self.key_length()]
    }
}
