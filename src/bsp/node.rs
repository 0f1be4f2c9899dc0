//! Tree nodes stored in an index arena.
//!
//! A node is either a branch, holding the [`Surface`] it splits on, or a leaf,
//! holding a [`Region`]. Branches always have two children: child 0 lies on
//! the positive side of the surface plane and child 1 on the non-positive side,
//! so a point `p` descends into child `(plane.distance(p) <= 0) as usize`.
//! Each node records its parent and its slot in the parent, so trees are
//! walked without recursion.

use std::ops::{Index, IndexMut};

/// Index of a node in a [`NodePool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// A run of coplanar triangles in the mesh buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surface {
    pub plane_index: u32,
    pub triangle_start: u32,
    pub triangle_stop: u32,
    /// Summed area of the triangles in the run.
    pub total_triangle_area: f32,
}

impl Surface {
    pub const fn triangles(&self) -> std::ops::Range<usize> {
        self.triangle_start as usize..self.triangle_stop as usize
    }

    pub const fn triangle_count(&self) -> u32 {
        self.triangle_stop - self.triangle_start
    }
}

/// Leaf payload. `side` is 0 (outside) or 1 (inside); on a combined tree it
/// packs operand A in bit 0 and operand B in bit 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub side: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NodeKind {
    Leaf(Region),
    Branch(Surface),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    /// Slot this node occupies in its parent.
    pub index: u8,
    pub children: [Option<NodeId>; 2],
}

impl Node {
    pub const fn leaf(side: u32) -> Self {
        Self {
            kind: NodeKind::Leaf(Region { side }),
            parent: None,
            index: 0,
            children: [None, None],
        }
    }

    pub const fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf(_))
    }

    pub const fn region(&self) -> Option<&Region> {
        match &self.kind {
            NodeKind::Leaf(region) => Some(region),
            NodeKind::Branch(_) => None,
        }
    }

    pub const fn surface(&self) -> Option<&Surface> {
        match &self.kind {
            NodeKind::Branch(surface) => Some(surface),
            NodeKind::Leaf(_) => None,
        }
    }

    /// Leaf side, or `None` for a branch.
    pub const fn side(&self) -> Option<u32> {
        match &self.kind {
            NodeKind::Leaf(region) => Some(region.side),
            NodeKind::Branch(_) => None,
        }
    }

    pub fn set_side(&mut self, side: u32) {
        self.kind = NodeKind::Leaf(Region { side });
    }

    pub const fn child(&self, index: usize) -> Option<NodeId> {
        self.children[index]
    }
}

#[derive(Debug, Clone)]
enum Slot {
    Used(Node),
    Free,
}

/// Arena owning the nodes of one solid.
#[derive(Debug, Clone, Default)]
pub struct NodePool {
    slots: Vec<Slot>,
    free: Vec<u32>,
    outstanding: usize,
    double_frees: usize,
}

impl NodePool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `node` (unlinked) and return its id.
    pub fn borrow(&mut self, node: Node) -> NodeId {
        self.outstanding += 1;
        match self.free.pop() {
            Some(id) => {
                self.slots[id as usize] = Slot::Used(node);
                NodeId(id)
            },
            None => {
                self.slots.push(Slot::Used(node));
                NodeId(self.slots.len() as u32 - 1)
            },
        }
    }

    /// Return a single node to the arena.
    pub fn replace(&mut self, id: NodeId) {
        match self.slots.get_mut(id.0 as usize) {
            Some(slot) if matches!(slot, Slot::Used(_)) => {
                *slot = Slot::Free;
                self.free.push(id.0);
                self.outstanding -= 1;
            },
            _ => self.double_frees += 1,
        }
    }

    pub const fn outstanding(&self) -> usize {
        self.outstanding
    }

    pub const fn double_frees(&self) -> usize {
        self.double_frees
    }

    /// Drop every slot. Returns `(still borrowed, double frees)` before the reset.
    pub fn clear(&mut self) -> (usize, usize) {
        let report = (self.outstanding, self.double_frees);
        self.slots.clear();
        self.free.clear();
        self.outstanding = 0;
        self.double_frees = 0;
        report
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        match self.slots.get(id.0 as usize) {
            Some(Slot::Used(node)) => Some(node),
            _ => None,
        }
    }

    /// Unlink `id` from its parent, if it has one.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self[id].parent {
            let index = self[id].index as usize;
            self[parent].children[index] = None;
            self[id].parent = None;
            self[id].index = 0;
        }
    }

    /// Make `child` the `index` child of `parent`, detaching whatever was there and
    /// detaching `child` from its previous parent.
    pub fn set_child(&mut self, parent: NodeId, index: usize, child: NodeId) {
        if let Some(old) = self[parent].children[index] {
            self.detach(old);
        }
        self.detach(child);
        self[parent].children[index] = Some(child);
        self[child].parent = Some(parent);
        self[child].index = index as u8;
    }

    /// Return `root` and every node beneath it to the arena.
    pub fn release_subtree(&mut self, root: NodeId) {
        self.detach(root);
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            stack.extend(self[id].children.iter().flatten().copied());
            self.replace(id);
        }
    }

    /// Pre-order walk from `root`, child 0 before child 1.
    pub fn iter(&self, root: NodeId) -> NodeIter<'_> {
        NodeIter {
            pool: self,
            walk: Walk::new(root),
        }
    }

    /// Ancestor surfaces of `leaf`, nearest first.
    pub fn surfaces(&self, leaf: NodeId) -> SurfaceIter<'_> {
        SurfaceIter { pool: self, node: leaf }
    }

    /// Copy the subtree at `root` of `source` into this arena. Returns the new root.
    pub fn clone_subtree(&mut self, source: &NodePool, root: NodeId) -> NodeId {
        let new_root = self.borrow(Node {
            parent: None,
            index: 0,
            children: [None, None],
            ..source[root]
        });
        let mut stack = vec![(root, new_root)];
        while let Some((src, dst)) = stack.pop() {
            for index in 0..2 {
                if let Some(child) = source[src].children[index] {
                    let copy = self.borrow(Node {
                        parent: None,
                        index: 0,
                        children: [None, None],
                        ..source[child]
                    });
                    self.set_child(dst, index, copy);
                    stack.push((child, copy));
                }
            }
        }
        new_root
    }
}

impl Index<NodeId> for NodePool {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match &self.slots[id.0 as usize] {
            Slot::Used(node) => node,
            Slot::Free => panic!("node {:?} used after release", id),
        }
    }
}

impl IndexMut<NodeId> for NodePool {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        match &mut self.slots[id.0 as usize] {
            Slot::Used(node) => node,
            Slot::Free => panic!("node {:?} used after release", id),
        }
    }
}

/// Pre-order walk state that does not hold a borrow of the pool, so the caller
/// can mutate nodes between steps. A node's children are read as the node is
/// returned: payload edits are safe, relinking nodes still to be visited is not.
#[derive(Debug, Clone)]
pub struct Walk {
    stack: Vec<NodeId>,
    next: Option<NodeId>,
}

impl Walk {
    pub fn new(root: NodeId) -> Self {
        Self {
            stack: Vec::new(),
            next: Some(root),
        }
    }

    pub fn next(&mut self, pool: &NodePool) -> Option<NodeId> {
        let current = self.next?;
        let node = &pool[current];
        if let Some(child1) = node.children[1] {
            self.stack.push(child1);
        }
        self.next = node.children[0].or_else(|| self.stack.pop());
        Some(current)
    }
}

pub struct NodeIter<'a> {
    pool: &'a NodePool,
    walk: Walk,
}

impl Iterator for NodeIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        self.walk.next(self.pool)
    }
}

/// Climbs from a node to the root, yielding each ancestor's surface together
/// with the side of it the start node lies on (the child slot taken).
pub struct SurfaceIter<'a> {
    pool: &'a NodePool,
    node: NodeId,
}

impl Iterator for SurfaceIter<'_> {
    type Item = (Surface, u32);

    fn next(&mut self) -> Option<(Surface, u32)> {
        loop {
            let node = &self.pool[self.node];
            let parent = node.parent?;
            let side = node.index as u32;
            self.node = parent;
            if let Some(surface) = self.pool[parent].surface() {
                return Some((*surface, side));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branch(plane_index: u32) -> Node {
        Node {
            kind: NodeKind::Branch(Surface {
                plane_index,
                triangle_start: 0,
                triangle_stop: 0,
                total_triangle_area: 0.0,
            }),
            ..Node::leaf(0)
        }
    }

    /// root(0) -> [leaf a, b(1) -> [leaf c, leaf d]]
    fn small_tree(pool: &mut NodePool) -> (NodeId, [NodeId; 5]) {
        let root = pool.borrow(branch(0));
        let a = pool.borrow(Node::leaf(0));
        let b = pool.borrow(branch(1));
        let c = pool.borrow(Node::leaf(0));
        let d = pool.borrow(Node::leaf(1));
        pool.set_child(root, 0, a);
        pool.set_child(root, 1, b);
        pool.set_child(b, 0, c);
        pool.set_child(b, 1, d);
        (root, [root, a, b, c, d])
    }

    #[test]
    fn preorder_visits_child0_first() {
        let mut pool = NodePool::new();
        let (root, ids) = small_tree(&mut pool);
        let order: Vec<NodeId> = pool.iter(root).collect();
        assert_eq!(order, ids.to_vec());
    }

    #[test]
    fn surface_iter_reports_slots() {
        let mut pool = NodePool::new();
        let (_, [_, _, _, c, _]) = small_tree(&mut pool);
        let chain: Vec<(u32, u32)> = pool.surfaces(c).map(|(s, side)| (s.plane_index, side)).collect();
        assert_eq!(chain, vec![(1, 0), (0, 1)]);
    }

    #[test]
    fn set_child_detaches_previous_owner() {
        let mut pool = NodePool::new();
        let (root, [_, a, b, c, _]) = small_tree(&mut pool);
        pool.set_child(b, 0, a);
        assert_eq!(pool[root].children[0], None);
        assert_eq!(pool[c].parent, None);
        assert_eq!(pool[a].parent, Some(b));
        pool.release_subtree(c);
        pool.release_subtree(root);
        assert_eq!(pool.outstanding(), 0);
    }

    #[test]
    fn clone_subtree_matches_shape() {
        let mut pool = NodePool::new();
        let (root, _) = small_tree(&mut pool);
        let mut other = NodePool::new();
        let copy = other.clone_subtree(&pool, root);
        let sides: Vec<Option<u32>> = other.iter(copy).map(|id| other[id].side()).collect();
        let expected: Vec<Option<u32>> = pool.iter(root).map(|id| pool[id].side()).collect();
        assert_eq!(sides, expected);
    }

    #[test]
    fn double_free_is_counted() {
        let mut pool = NodePool::new();
        let id = pool.borrow(Node::leaf(0));
        pool.replace(id);
        pool.replace(id);
        assert_eq!(pool.double_frees(), 1);
        assert_eq!(pool.clear(), (0, 1));
    }
}
