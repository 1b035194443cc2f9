//! Threaded red-black tree algorithms
//!
//! Free functions generic over [`TreeStore`], so the three key-storage
//! layouts share one implementation. Paths are recorded in a [`PathStack`]
//! instead of parent pointers; rebalancing walks the stack back up.
//!
//! Link conventions: a thread on the left points at the in-order
//! predecessor, a thread on the right at the successor, `NIL` at either end
//! of the sequence. Rotations convert between child and thread links as
//! nodes gain or lose subtrees, so the threading stays exact at every step.

use super::{Node, PathStack, NIL};
use crate::compare::KeyCompare;
use crate::store::TreeStore;
use std::cmp::Ordering;

/// In-order successor, `NIL` past the last node. O(1) amortized.
pub(crate) fn move_next<S: TreeStore>(s: &S, id: u32) -> u32 {
    let n = s.node(id);
    if n.link_is_thread(1) {
        return n.link_index(1);
    }
    let mut j = n.link_index(1);
    loop {
        let m = s.node(j);
        if m.link_is_thread(0) {
            return j;
        }
        j = m.link_index(0);
    }
}

/// In-order predecessor, `NIL` before the first node. O(1) amortized.
pub(crate) fn move_prev<S: TreeStore>(s: &S, id: u32) -> u32 {
    let n = s.node(id);
    if n.link_is_thread(0) {
        return n.link_index(0);
    }
    let mut j = n.link_index(0);
    loop {
        let m = s.node(j);
        if m.link_is_thread(1) {
            return j;
        }
        j = m.link_index(1);
    }
}

fn slot_less<S: TreeStore>(s: &S, cmp: &KeyCompare, a_key: &[u8], a_id: u32, b_id: u32) -> bool {
    cmp.slot_less(a_key, a_id, s.key(b_id), b_id)
}

/// Descend by raw key. On an equal key the existing node ends up on top of
/// the stack and `true` comes back; otherwise the stack is the insertion
/// path for the key.
pub(crate) fn find_path_for_unique<S: TreeStore>(
    s: &S,
    stack: &mut PathStack,
    key: &[u8],
    cmp: &KeyCompare,
) -> bool {
    stack.clear();
    let mut p = s.tree_root().root;
    if p == NIL {
        return false;
    }
    loop {
        let dir = match cmp.compare(key, s.key(p)) {
            Ordering::Equal => {
                stack.push(p, 0);
                return true;
            }
            Ordering::Less => 0,
            Ordering::Greater => 1,
        };
        let n = s.node(p);
        stack.push(p, dir);
        if n.link_is_thread(dir) {
            return false;
        }
        p = n.link_index(dir);
    }
}

/// Descend to the insertion point for an allocated but not-yet-linked id.
/// Ties on equal keys order by higher id first, so the slot order is strict.
/// The id's key must already be readable from the storage.
pub(crate) fn find_path_for_multi<S: TreeStore>(
    s: &S,
    stack: &mut PathStack,
    id: u32,
    cmp: &KeyCompare,
) {
    stack.clear();
    let mut p = s.tree_root().root;
    if p == NIL {
        return;
    }
    let key = s.key(id);
    loop {
        let dir = if slot_less(s, cmp, key, id, p) { 0 } else { 1 };
        let n = s.node(p);
        stack.push(p, dir);
        if n.link_is_thread(dir) {
            return;
        }
        p = n.link_index(dir);
    }
}

/// Descend to a known-linked id, leaving it on top of the stack.
pub(crate) fn find_path_for_remove<S: TreeStore>(
    s: &S,
    stack: &mut PathStack,
    id: u32,
    cmp: &KeyCompare,
) -> bool {
    stack.clear();
    let mut p = s.tree_root().root;
    if p == NIL {
        return false;
    }
    let key = s.key(id);
    loop {
        if p == id {
            stack.push(p, 1);
            return true;
        }
        let dir = if slot_less(s, cmp, key, id, p) { 0 } else { 1 };
        let n = s.node(p);
        stack.push(p, dir);
        if n.link_is_thread(dir) {
            return false;
        }
        p = n.link_index(dir);
    }
}

/// First node whose key is `>= key`, else `NIL`.
pub(crate) fn lower_bound<S: TreeStore>(s: &S, key: &[u8], cmp: &KeyCompare) -> u32 {
    let mut p = s.tree_root().root;
    let mut found = NIL;
    while p != NIL {
        let n = s.node(p);
        let dir = if cmp.compare(s.key(p), key) == Ordering::Less {
            1
        } else {
            found = p;
            0
        };
        if n.link_is_thread(dir) {
            break;
        }
        p = n.link_index(dir);
    }
    found
}

/// First node whose key is `> key`, else `NIL`.
pub(crate) fn upper_bound<S: TreeStore>(s: &S, key: &[u8], cmp: &KeyCompare) -> u32 {
    let mut p = s.tree_root().root;
    let mut found = NIL;
    while p != NIL {
        let n = s.node(p);
        let dir = if cmp.compare(key, s.key(p)) == Ordering::Less {
            found = p;
            0
        } else {
            1
        };
        if n.link_is_thread(dir) {
            break;
        }
        p = n.link_index(dir);
    }
    found
}

/// Last node whose key is `<= key`, else `NIL`.
pub(crate) fn reverse_lower_bound<S: TreeStore>(s: &S, key: &[u8], cmp: &KeyCompare) -> u32 {
    let mut p = s.tree_root().root;
    let mut found = NIL;
    while p != NIL {
        let n = s.node(p);
        let dir = if cmp.compare(s.key(p), key) == Ordering::Greater {
            0
        } else {
            found = p;
            1
        };
        if n.link_is_thread(dir) {
            break;
        }
        p = n.link_index(dir);
    }
    found
}

/// Last node whose key is `< key`, else `NIL`.
pub(crate) fn reverse_upper_bound<S: TreeStore>(s: &S, key: &[u8], cmp: &KeyCompare) -> u32 {
    let mut p = s.tree_root().root;
    let mut found = NIL;
    while p != NIL {
        let n = s.node(p);
        let dir = if cmp.compare(s.key(p), key) == Ordering::Less {
            found = p;
            1
        } else {
            0
        };
        if n.link_is_thread(dir) {
            break;
        }
        p = n.link_index(dir);
    }
    found
}

/// Half-open equal range `[lower, upper)` in tree order.
pub(crate) fn equal_range<S: TreeStore>(s: &S, key: &[u8], cmp: &KeyCompare) -> (u32, u32) {
    (lower_bound(s, key, cmp), upper_bound(s, key, cmp))
}

/// Rotate `x` in direction `d` (0 = left, 1 = right), promoting its
/// opposite-side child. Converts the vacated link into a thread when the
/// promoted child had none to hand down. Returns the new subtree root; the
/// caller re-links it under `x`'s old parent.
fn rotate<S: TreeStore>(s: &mut S, x: u32, d: usize) -> u32 {
    let o = 1 - d;
    let mut xn = s.node(x);
    debug_assert!(xn.link_is_child(o));
    let y = xn.link_index(o);
    let mut yn = s.node(y);
    if yn.link_is_thread(d) {
        debug_assert_eq!(yn.link_index(d), x);
        xn.set_thread(o, y);
    } else {
        xn.set_child(o, yn.link_index(d));
    }
    yn.set_child(d, x);
    s.set_node(x, xn);
    s.set_node(y, yn);
    y
}

fn set_color<S: TreeStore>(s: &mut S, id: u32, red: bool) {
    let mut n = s.node(id);
    if red {
        n.set_red();
    } else {
        n.set_black();
    }
    s.set_node(id, n);
}

fn link_child<S: TreeStore>(s: &mut S, parent: u32, dir: usize, child: u32) {
    let mut n = s.node(parent);
    n.set_child(dir, child);
    s.set_node(parent, n);
}

/// Link `id` at the insertion point recorded in `stack` and rebalance.
pub(crate) fn insert<S: TreeStore>(s: &mut S, stack: &PathStack, id: u32) {
    if stack.height() == 0 {
        let mut n = Node::detached();
        n.set_thread(0, NIL);
        n.set_thread(1, NIL);
        n.set_black();
        s.set_node(id, n);
        let root = s.tree_root_mut();
        debug_assert_eq!(root.root, NIL);
        root.root = id;
        root.most_left = id;
        root.most_right = id;
        root.count = 1;
        return;
    }

    let mut k = stack.height() - 1;
    let parent = stack.node_at(k);
    let dir = stack.dir_at(k);
    let mut pn = s.node(parent);
    debug_assert!(pn.link_is_thread(dir));
    let neighbor = pn.link_index(dir);

    // The new node slides into the gap between `parent` and its old in-order
    // neighbor on that side; both of its links start as threads.
    let mut n = Node::detached();
    if dir == 0 {
        n.set_thread(0, neighbor);
        n.set_thread(1, parent);
    } else {
        n.set_thread(0, parent);
        n.set_thread(1, neighbor);
    }
    n.set_red();
    s.set_node(id, n);
    pn.set_child(dir, id);
    s.set_node(parent, pn);
    {
        let root = s.tree_root_mut();
        root.count += 1;
        if dir == 0 && root.most_left == parent {
            root.most_left = id;
        }
        if dir == 1 && root.most_right == parent {
            root.most_right = id;
        }
    }

    // Bottom-up fix-up: entry `k` is the parent of the red node under repair.
    loop {
        if k == 0 {
            break;
        }
        let p = stack.node_at(k);
        if s.node(p).is_black() {
            break;
        }
        let g = stack.node_at(k - 1);
        let pdir = stack.dir_at(k - 1);
        let gn = s.node(g);
        let udir = 1 - pdir;
        if gn.link_is_child(udir) && s.node(gn.link_index(udir)).is_red() {
            set_color(s, p, false);
            set_color(s, gn.link_index(udir), false);
            set_color(s, g, true);
            if k < 2 {
                break;
            }
            k -= 2;
            continue;
        }
        let cdir = stack.dir_at(k);
        let top = if cdir == pdir {
            set_color(s, p, false);
            set_color(s, g, true);
            rotate(s, g, 1 - pdir)
        } else {
            let c = rotate(s, p, 1 - cdir);
            link_child(s, g, pdir, c);
            set_color(s, c, false);
            set_color(s, g, true);
            rotate(s, g, 1 - pdir)
        };
        if k >= 2 {
            link_child(s, stack.node_at(k - 2), stack.dir_at(k - 2), top);
        } else {
            s.tree_root_mut().root = top;
        }
        break;
    }

    let r = s.tree_root().root;
    set_color(s, r, false);
}

/// Unlink the node on top of `stack` and rebalance. The slot is left in the
/// empty/tombstone state.
pub(crate) fn remove<S: TreeStore>(s: &mut S, stack: &mut PathStack) {
    let mut k = stack.height() - 1;
    let mut t = stack.node_at(k);

    // A node with two subtrees first trades places with its in-order
    // successor so the actual unlink happens where at most one subtree
    // hangs.
    let tn = s.node(t);
    if tn.link_is_child(0) && tn.link_is_child(1) {
        stack.set(k, t, 1);
        let mut q = tn.link_index(1);
        stack.push(q, 0);
        while s.node(q).link_is_child(0) {
            q = s.node(q).link_index(0);
            stack.push(q, 0);
        }
        let ks = stack.height() - 1;
        swap_with_successor(s, stack, k, ks, t, q);
        k = ks;
        t = stack.node_at(k);
    }

    let tn = s.node(t);
    let has_left = tn.link_is_child(0);
    let has_right = tn.link_is_child(1);

    if has_left || has_right {
        // One subtree: splice it up. Red-black shape forces the removed
        // node black and its lone child red.
        let (cdir, c) = if has_left {
            (0, tn.link_index(0))
        } else {
            (1, tn.link_index(1))
        };
        debug_assert!(tn.is_black());
        if cdir == 0 {
            let succ = tn.link_index(1);
            let mut m = c;
            while s.node(m).link_is_child(1) {
                m = s.node(m).link_index(1);
            }
            let mut mn = s.node(m);
            debug_assert_eq!(mn.link_index(1), t);
            mn.set_thread(1, succ);
            s.set_node(m, mn);
            if succ == NIL {
                s.tree_root_mut().most_right = m;
            }
        } else {
            let pred = tn.link_index(0);
            let mut m = c;
            while s.node(m).link_is_child(0) {
                m = s.node(m).link_index(0);
            }
            let mut mn = s.node(m);
            debug_assert_eq!(mn.link_index(0), t);
            mn.set_thread(0, pred);
            s.set_node(m, mn);
            if pred == NIL {
                s.tree_root_mut().most_left = m;
            }
        }
        if k == 0 {
            s.tree_root_mut().root = c;
        } else {
            link_child(s, stack.node_at(k - 1), stack.dir_at(k - 1), c);
        }
        set_color(s, c, false);
    } else {
        // Leaf: the parent's link reverts to a thread.
        let pred = tn.link_index(0);
        let succ = tn.link_index(1);
        if k == 0 {
            let root = s.tree_root_mut();
            root.root = NIL;
            root.most_left = NIL;
            root.most_right = NIL;
        } else {
            let p = stack.node_at(k - 1);
            let d = stack.dir_at(k - 1);
            let mut pn = s.node(p);
            if d == 0 {
                pn.set_thread(0, pred);
            } else {
                pn.set_thread(1, succ);
            }
            s.set_node(p, pn);
            if pred == NIL {
                s.tree_root_mut().most_left = succ;
            }
            if succ == NIL {
                s.tree_root_mut().most_right = pred;
            }
            if tn.is_black() {
                remove_fixup(s, stack, k);
            }
        }
    }

    let root = s.tree_root_mut();
    root.count -= 1;
    s.set_node(t, Node::empty());
    let r = s.tree_root().root;
    if r != NIL {
        set_color(s, r, false);
    }
}

/// Exchange the tree positions of `t` and its in-order successor `sc`
/// (colors travel with the positions, ids stay put). Stack entries `k`
/// (t's old slot) and `ks` (sc's old slot) are rewritten to match.
fn swap_with_successor<S: TreeStore>(
    s: &mut S,
    stack: &mut PathStack,
    k: usize,
    ks: usize,
    t: u32,
    sc: u32,
) {
    let tn = s.node(t);
    let scn = s.node(sc);
    debug_assert!(scn.link_is_thread(0) && scn.link_index(0) == t);
    let direct = ks == k + 1;
    let l = tn.link_index(0);
    let sc_right_is_thread = scn.link_is_thread(1);
    let sc_right = scn.link_index(1);

    // The rightmost node of t's left subtree threads to t; its successor
    // becomes sc.
    let mut x = l;
    while s.node(x).link_is_child(1) {
        x = s.node(x).link_index(1);
    }
    let mut xn = s.node(x);
    debug_assert_eq!(xn.link_index(1), t);
    xn.set_thread(1, sc);
    s.set_node(x, xn);

    let mut new_sc = Node::detached();
    new_sc.set_child(0, l);
    if direct {
        new_sc.set_child(1, t);
    } else {
        new_sc.set_child(1, tn.link_index(1));
    }
    if tn.is_red() {
        new_sc.set_red();
    }

    let mut new_t = Node::detached();
    new_t.set_thread(0, sc);
    if sc_right_is_thread {
        new_t.set_thread(1, sc_right);
    } else {
        new_t.set_child(1, sc_right);
    }
    if scn.is_red() {
        new_t.set_red();
    }

    s.set_node(sc, new_sc);
    s.set_node(t, new_t);

    if k == 0 {
        s.tree_root_mut().root = sc;
    } else {
        link_child(s, stack.node_at(k - 1), stack.dir_at(k - 1), sc);
    }
    if !direct {
        link_child(s, stack.node_at(ks - 1), 0, t);
    }

    if sc_right_is_thread {
        if sc_right == NIL {
            s.tree_root_mut().most_right = t;
        }
    } else {
        // The leftmost node of sc's right subtree threads back to sc; its
        // predecessor is now t.
        let mut m = sc_right;
        while s.node(m).link_is_child(0) {
            m = s.node(m).link_index(0);
        }
        let mut mn = s.node(m);
        debug_assert_eq!(mn.link_index(0), sc);
        mn.set_thread(0, t);
        s.set_node(m, mn);
    }

    stack.set(k, sc, 1);
    stack.set(ks, t, if direct { 1 } else { 0 });
}

/// Restore the black-height after unlinking a black leaf. `k` is the stack
/// level where the removed node hung; the deficient side is the branch
/// direction recorded at level `k - 1`.
fn remove_fixup<S: TreeStore>(s: &mut S, stack: &mut PathStack, mut k: usize) {
    loop {
        if k == 0 {
            return;
        }
        let p = stack.node_at(k - 1);
        let d = stack.dir_at(k - 1);
        let pn = s.node(p);
        debug_assert!(pn.link_is_child(1 - d));
        let w = pn.link_index(1 - d);

        if s.node(w).is_red() {
            // Red sibling: rotate it above the parent to expose a black one.
            set_color(s, w, false);
            set_color(s, p, true);
            let top = rotate(s, p, d);
            debug_assert_eq!(top, w);
            if k >= 2 {
                link_child(s, stack.node_at(k - 2), stack.dir_at(k - 2), top);
            } else {
                s.tree_root_mut().root = top;
            }
            stack.set(k - 1, w, d);
            stack.set(k, p, d);
            k += 1;
            continue;
        }

        let wn = s.node(w);
        let near_red = wn.link_is_child(d) && s.node(wn.link_index(d)).is_red();
        let far_red = wn.link_is_child(1 - d) && s.node(wn.link_index(1 - d)).is_red();

        if !near_red && !far_red {
            // All-black sibling side: drop one black there and push the
            // deficiency up.
            set_color(s, w, true);
            if s.node(p).is_red() {
                set_color(s, p, false);
                return;
            }
            k -= 1;
            continue;
        }

        let w_final = if far_red {
            w
        } else {
            // Near nephew red: rotate it over the sibling first.
            let nn = wn.link_index(d);
            set_color(s, nn, false);
            set_color(s, w, true);
            let top = rotate(s, w, 1 - d);
            debug_assert_eq!(top, nn);
            link_child(s, p, 1 - d, top);
            nn
        };

        // Far nephew red: one rotation at the parent settles the deficit.
        let p_red = s.node(p).is_red();
        set_color(s, w_final, p_red);
        set_color(s, p, false);
        let far = s.node(w_final).link_index(1 - d);
        set_color(s, far, false);
        let top = rotate(s, p, d);
        debug_assert_eq!(top, w_final);
        if k >= 2 {
            link_child(s, stack.node_at(k - 2), stack.dir_at(k - 2), top);
        } else {
            s.tree_root_mut().root = top;
        }
        return;
    }
}
