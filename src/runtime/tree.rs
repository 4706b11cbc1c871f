use std::fmt;
use std::marker::PhantomData;

/// Index of a node in a [`LinkedTree`]. Index 0 is the root sentinel.
pub struct NodeId<T> {
    index: usize,
    marker: PhantomData<fn() -> T>,
}

impl<T> NodeId<T> {
    pub const ROOT: Self = Self::new(0);

    const fn new(index: usize) -> Self {
        Self {
            index,
            marker: PhantomData,
        }
    }

    pub fn index(self) -> usize {
        self.index
    }

    pub fn is_root(self) -> bool {
        self.index == 0
    }
}

impl<T> Clone for NodeId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeId<T> {}

impl<T> PartialEq for NodeId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for NodeId<T> {}

impl<T> std::hash::Hash for NodeId<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for NodeId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

struct Node<T> {
    parent: NodeId<T>,
    value: T,
}

/// Append-only arena of nodes that each point at their parent.
///
/// Many nodes may share a parent. A node is reclaimed on `pop` only while it
/// is the most recently pushed one, so ids handed out earlier stay valid.
pub struct LinkedTree<T> {
    nodes: Vec<Node<T>>,
}

impl<T> Default for LinkedTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LinkedTree<T> {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    pub fn root(&self) -> NodeId<T> {
        NodeId::ROOT
    }

    pub fn push(&mut self, parent: NodeId<T>, value: T) -> NodeId<T> {
        self.nodes.push(Node { parent, value });
        NodeId::new(self.nodes.len())
    }

    /// Returns the parent of `id`, dropping `id` if it was pushed last.
    pub fn pop(&mut self, id: NodeId<T>) -> NodeId<T> {
        let parent = self.parent(id);
        if self.is_last(id) {
            self.nodes.pop();
        }
        parent
    }

    pub fn is_last(&self, id: NodeId<T>) -> bool {
        !id.is_root() && id.index == self.nodes.len()
    }

    pub fn parent(&self, id: NodeId<T>) -> NodeId<T> {
        self.node(id).map(|node| node.parent).unwrap_or(NodeId::ROOT)
    }

    pub fn get(&self, id: NodeId<T>) -> Option<&T> {
        self.node(id).map(|node| &node.value)
    }

    pub fn get_mut(&mut self, id: NodeId<T>) -> Option<&mut T> {
        if id.is_root() {
            return None;
        }
        self.nodes.get_mut(id.index - 1).map(|node| &mut node.value)
    }

    pub fn contains(&self, id: NodeId<T>) -> bool {
        self.node(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Walks from `id` towards the root, excluding the root sentinel.
    pub fn ancestors(&self, id: NodeId<T>) -> Ancestors<'_, T> {
        Ancestors { tree: self, next: id }
    }

    fn node(&self, id: NodeId<T>) -> Option<&Node<T>> {
        if id.is_root() {
            return None;
        }
        self.nodes.get(id.index - 1)
    }
}

pub struct Ancestors<'a, T> {
    tree: &'a LinkedTree<T>,
    next: NodeId<T>,
}

impl<'a, T> Iterator for Ancestors<'a, T> {
    type Item = (NodeId<T>, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next;
        let node = self.tree.node(id)?;
        self.next = node.parent;
        Some((id, &node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_reclaims_only_the_last_node() {
        let mut tree = LinkedTree::new();
        let a = tree.push(tree.root(), "a");
        let b = tree.push(a, "b");
        let c = tree.push(a, "c");
        assert_eq!(tree.pop(b), a);
        assert!(tree.contains(b));
        assert_eq!(tree.pop(c), a);
        assert!(!tree.contains(c));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn ancestors_stop_at_root() {
        let mut tree = LinkedTree::new();
        let a = tree.push(tree.root(), 1);
        let b = tree.push(a, 2);
        let values: Vec<i32> = tree.ancestors(b).map(|(_, v)| *v).collect();
        assert_eq!(values, vec![2, 1]);
        assert_eq!(tree.ancestors(NodeId::ROOT).count(), 0);
    }
}
