//! Connected-component analysis over active edges of one relationship kind.

use std::collections::BTreeMap;
use crate::ids::EntityId;

/// Union-Find with path compression and union by rank.
#[derive(Clone, Debug)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<usize>,
    size: Vec<usize>,
}

impl DisjointSet {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
            size: vec![1; n],
        }
    }

    pub fn find(&mut self, i: usize) -> usize {
        if self.parent[i] != i {
            let root = self.find(self.parent[i]);
            self.parent[i] = root;
        }
        self.parent[i]
    }

    pub fn union(&mut self, x: usize, y: usize) {
        let xroot = self.find(x);
        let yroot = self.find(y);
        if xroot == yroot {
            return;
        }
        let (big, small) = if self.rank[xroot] < self.rank[yroot] {
            (yroot, xroot)
        } else {
            (xroot, yroot)
        };
        self.parent[small] = big;
        self.size[big] += self.size[small];
        if self.rank[big] == self.rank[small] {
            self.rank[big] += 1;
        }
    }

    /// Size of the set containing `i`.
    pub fn set_size(&mut self, i: usize) -> usize {
        let root = self.find(i);
        self.size[root]
    }
}

/// Components of an undirected edge list over a fixed node set, keeping
/// only those with at least `min_size` members.
///
/// Nodes come back grouped by component; each component is sorted by id and
/// the list is ordered by its smallest member so results are deterministic.
pub fn group_components(nodes: &[EntityId], edges: &[(EntityId, EntityId)], min_size: usize) -> Vec<Vec<EntityId>> {
    let index: BTreeMap<EntityId, usize> = nodes.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    let mut set = DisjointSet::new(nodes.len());
    for (a, b) in edges {
        if let (Some(&ia), Some(&ib)) = (index.get(a), index.get(b)) {
            set.union(ia, ib);
        }
    }

    let mut groups: BTreeMap<usize, Vec<EntityId>> = BTreeMap::new();
    for (i, id) in nodes.iter().enumerate() {
        if set.set_size(i) < min_size {
            continue;
        }
        let root = set.find(i);
        groups.entry(root).or_default().push(*id);
    }

    let mut components: Vec<Vec<EntityId>> = groups.into_values()
        .map(|mut members| {
            members.sort();
            members
        })
        .collect();
    components.sort_by_key(|c| c.first().copied());
    components
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_tracks_sizes() {
        let mut set = DisjointSet::new(5);
        set.union(0, 1);
        set.union(1, 2);
        assert_eq!(set.set_size(2), 3);
        assert_eq!(set.set_size(3), 1);
        assert_eq!(set.find(0), set.find(2));
        set.union(0, 2);
        assert_eq!(set.set_size(0), 3);
    }

    #[test]
    fn test_group_components_is_ordered() {
        let nodes = vec![EntityId(5), EntityId(1), EntityId(3), EntityId(2)];
        let edges = vec![(EntityId(5), EntityId(3)), (EntityId(1), EntityId(2))];
        let comps = group_components(&nodes, &edges, 1);
        assert_eq!(comps, vec![
            vec![EntityId(1), EntityId(2)],
            vec![EntityId(3), EntityId(5)],
        ]);
    }

    #[test]
    fn test_group_components_drops_small_sets() {
        let nodes = vec![EntityId(1), EntityId(2), EntityId(3), EntityId(4), EntityId(7)];
        let edges = vec![(EntityId(1), EntityId(2)), (EntityId(2), EntityId(3))];
        assert_eq!(group_components(&nodes, &edges, 1).len(), 3);
        assert_eq!(group_components(&nodes, &edges, 2), vec![vec![EntityId(1), EntityId(2), EntityId(3)]]);
        assert!(group_components(&nodes, &edges, 4).is_empty());
    }
}
