//! Self-balancing ordered index.
//!
//! [`OrderedIndex`] is a generic AVL map from a totally-ordered key to an
//! owned value. It has no knowledge of filesystem semantics; the watch
//! registry layers those on top. Every node exclusively owns both of its
//! child subtrees, so the structure carries no parent pointers and no
//! external aliasing of node identity.
//!
//! After every completed `insert` or `remove` each node's balance factor is
//! back in {-1, 0, 1}. A single insertion needs at most one rotation (single
//! or double) at the lowest unbalanced ancestor; a deletion may rotate at
//! every ancestor on the way back to the root, which is why both unwind
//! paths rebalance independently.

use std::cmp::Ordering;

type Link<K, V> = Option<Box<Node<K, V>>>;

#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    /// Height of the subtree rooted here; a leaf has height 1.
    height: u16,
    left: Link<K, V>,
    right: Link<K, V>,
}

impl<K, V> Node<K, V> {
    fn new(key: K, value: V) -> Self {
        Self {
            key,
            value,
            height: 1,
            left: None,
            right: None,
        }
    }
}

fn height<K, V>(link: &Link<K, V>) -> u16 {
    link.as_ref().map_or(0, |n| n.height)
}

fn update_height<K, V>(node: &mut Node<K, V>) {
    node.height = 1 + height(&node.left).max(height(&node.right));
}

/// Signed height difference (left minus right) of the node behind `link`.
fn balance_factor<K, V>(link: &Link<K, V>) -> i32 {
    link.as_ref()
        .map_or(0, |n| i32::from(height(&n.left)) - i32::from(height(&n.right)))
}

/// Right rotation: the left child becomes the subtree root.
fn rotate_right<K, V>(link: &mut Link<K, V>) {
    if let Some(mut node) = link.take() {
        if let Some(mut pivot) = node.left.take() {
            node.left = pivot.right.take();
            update_height(&mut node);
            pivot.right = Some(node);
            update_height(&mut pivot);
            *link = Some(pivot);
        } else {
            // Rotation is only requested for left-heavy nodes, which always
            // have a left child. Restore the node untouched otherwise.
            *link = Some(node);
        }
    }
}

/// Left rotation: the right child becomes the subtree root.
fn rotate_left<K, V>(link: &mut Link<K, V>) {
    if let Some(mut node) = link.take() {
        if let Some(mut pivot) = node.right.take() {
            node.right = pivot.left.take();
            update_height(&mut node);
            pivot.left = Some(node);
            update_height(&mut pivot);
            *link = Some(pivot);
        } else {
            *link = Some(node);
        }
    }
}

/// Recompute the height at `link` and restore the AVL invariant with at most
/// one single or double rotation.
fn rebalance<K, V>(link: &mut Link<K, V>) {
    let Some(node) = link.as_mut() else {
        return;
    };
    update_height(node);

    let bf = balance_factor(link);
    if bf > 1 {
        let Some(node) = link.as_mut() else {
            return;
        };
        if balance_factor(&node.left) < 0 {
            // Left-right shape: straighten the inner grandchild first.
            rotate_left(&mut node.left);
        }
        rotate_right(link);
    } else if bf < -1 {
        let Some(node) = link.as_mut() else {
            return;
        };
        if balance_factor(&node.right) > 0 {
            // Right-left shape.
            rotate_right(&mut node.right);
        }
        rotate_left(link);
    }
}

fn insert_at<K, V>(
    link: &mut Link<K, V>,
    key: K,
    value: V,
    cmp: fn(&K, &K) -> Ordering,
) -> Option<V> {
    let displaced = match link {
        None => {
            *link = Some(Box::new(Node::new(key, value)));
            return None;
        }
        Some(node) => match cmp(&key, &node.key) {
            Ordering::Less => insert_at(&mut node.left, key, value, cmp),
            Ordering::Greater => insert_at(&mut node.right, key, value, cmp),
            Ordering::Equal => return Some(std::mem::replace(&mut node.value, value)),
        },
    };
    rebalance(link);
    displaced
}

/// Detach the minimum node of the subtree, rebalancing the descent path.
/// Returns the detached node and what remains of the subtree.
fn detach_min<K, V>(mut node: Box<Node<K, V>>) -> (Box<Node<K, V>>, Link<K, V>) {
    match node.left.take() {
        None => {
            let rest = node.right.take();
            (node, rest)
        }
        Some(left) => {
            let (min, rest_left) = detach_min(left);
            node.left = rest_left;
            let mut link = Some(node);
            rebalance(&mut link);
            (min, link)
        }
    }
}

fn remove_at<K, V>(link: &mut Link<K, V>, key: &K, cmp: fn(&K, &K) -> Ordering) -> Option<V> {
    let ordering = match link.as_ref() {
        None => return None,
        Some(node) => cmp(key, &node.key),
    };

    let removed = match ordering {
        Ordering::Less => link
            .as_mut()
            .and_then(|node| remove_at(&mut node.left, key, cmp)),
        Ordering::Greater => link
            .as_mut()
            .and_then(|node| remove_at(&mut node.right, key, cmp)),
        Ordering::Equal => link.take().map(|mut node| {
            *link = match (node.left.take(), node.right.take()) {
                (None, None) => None,
                (Some(child), None) | (None, Some(child)) => Some(child),
                (Some(left), Some(right)) => {
                    // Replace with the in-order successor, detached from the
                    // right subtree with its extraction path rebalanced.
                    let (mut succ, rest_right) = detach_min(right);
                    succ.left = Some(left);
                    succ.right = rest_right;
                    Some(succ)
                }
            };
            node.value
        }),
    };

    if removed.is_some() {
        rebalance(link);
    }
    removed
}

/// A generic self-balancing ordered map keyed by a totally-ordered key.
///
/// Comparison is injected at construction as a three-way comparator; keys
/// that compare equal replace one another, so the index is a bijection from
/// key to value at all times.
#[derive(Debug)]
pub struct OrderedIndex<K, V> {
    root: Link<K, V>,
    len: usize,
    cmp: fn(&K, &K) -> Ordering,
}

impl<K: Ord, V> Default for OrderedIndex<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord, V> OrderedIndex<K, V> {
    /// Creates an empty index ordered by the key's natural `Ord`.
    #[must_use]
    pub fn new() -> Self {
        Self::with_comparator(K::cmp)
    }
}

impl<K, V> OrderedIndex<K, V> {
    /// Creates an empty index with an explicit three-way comparator.
    #[must_use]
    pub fn with_comparator(cmp: fn(&K, &K) -> Ordering) -> Self {
        Self {
            root: None,
            len: 0,
            cmp,
        }
    }

    /// Number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True if the index holds no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts a key/value pair.
    ///
    /// If the key already exists its value is replaced and the prior value
    /// returned; the key set is unchanged in that case. Ancestors on the
    /// insertion path are rebalanced bottom-up.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let displaced = insert_at(&mut self.root, key, value, self.cmp);
        if displaced.is_none() {
            self.len += 1;
        }
        displaced
    }

    /// Looks up a key. O(log n), side-effect free.
    #[must_use]
    pub fn lookup(&self, key: &K) -> Option<&V> {
        let cmp = self.cmp;
        let mut cur = self.root.as_deref();
        while let Some(node) = cur {
            match cmp(key, &node.key) {
                Ordering::Less => cur = node.left.as_deref(),
                Ordering::Greater => cur = node.right.as_deref(),
                Ordering::Equal => return Some(&node.value),
            }
        }
        None
    }

    /// Looks up a key, returning a mutable reference to its value.
    pub fn lookup_mut(&mut self, key: &K) -> Option<&mut V> {
        let cmp = self.cmp;
        let mut cur = &mut self.root;
        loop {
            match cur {
                None => return None,
                Some(node) => match cmp(key, &node.key) {
                    Ordering::Less => cur = &mut node.left,
                    Ordering::Greater => cur = &mut node.right,
                    Ordering::Equal => return Some(&mut node.value),
                },
            }
        }
    }

    /// Removes a key, returning its value if it was present.
    ///
    /// Deletion splices leaves and single-child nodes directly and replaces
    /// two-child nodes with their in-order successor, then rebalances from
    /// the deletion point back to the root. Removing an absent key is a
    /// no-op returning `None`.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let removed = remove_at(&mut self.root, key, self.cmp);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Lazy in-order traversal yielding `(key, value)` pairs ascending by
    /// key. Restartable: each call produces a fresh iterator.
    #[must_use]
    pub fn in_order(&self) -> InOrder<'_, K, V> {
        let mut iter = InOrder { stack: Vec::new() };
        iter.push_left_spine(&self.root);
        iter
    }

    /// Removes all entries.
    pub fn clear(&mut self) {
        self.root = None;
        self.len = 0;
    }

    /// Verifies the search-order and height-balance invariants.
    ///
    /// Intended for tests and debugging walks; returns a description of the
    /// first violated invariant.
    #[doc(hidden)]
    pub fn check_invariants(&self) -> Result<(), String> {
        fn walk<K, V>(
            link: &Link<K, V>,
            cmp: fn(&K, &K) -> Ordering,
        ) -> Result<u16, String> {
            let Some(node) = link.as_ref() else {
                return Ok(0);
            };

            if let Some(left) = node.left.as_ref() {
                if cmp(&left.key, &node.key) != Ordering::Less {
                    return Err("left child key is not less than parent key".to_string());
                }
            }
            if let Some(right) = node.right.as_ref() {
                if cmp(&right.key, &node.key) != Ordering::Greater {
                    return Err("right child key is not greater than parent key".to_string());
                }
            }

            let lh = walk(&node.left, cmp)?;
            let rh = walk(&node.right, cmp)?;

            let bf = i32::from(lh) - i32::from(rh);
            if !(-1..=1).contains(&bf) {
                return Err(format!("balance factor {bf} outside {{-1, 0, 1}}"));
            }

            let expected = 1 + lh.max(rh);
            if node.height != expected {
                return Err(format!(
                    "stored height {} does not match computed height {expected}",
                    node.height
                ));
            }

            Ok(expected)
        }

        walk(&self.root, self.cmp).map(|_| ())
    }
}

/// In-order iterator over an [`OrderedIndex`].
///
/// Holds the left spine of the unvisited portion on an explicit stack, so
/// iteration is lazy and O(log n) in memory.
#[derive(Debug)]
pub struct InOrder<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
}

impl<'a, K, V> InOrder<'a, K, V> {
    fn push_left_spine(&mut self, mut link: &'a Link<K, V>) {
        while let Some(node) = link.as_deref() {
            self.stack.push(node);
            link = &node.left;
        }
    }
}

impl<'a, K, V> Iterator for InOrder<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.push_left_spine(&node.right);
        Some((&node.key, &node.value))
    }
}
