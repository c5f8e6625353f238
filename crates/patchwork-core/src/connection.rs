//! Connections between node ports.
//!
//! [`ConnectionTable`] keeps arcs sorted on
//! `(source, source_port, dest, dest_port)` so insertion, removal and exact
//! lookup are binary searches. Reachability queries for node ordering go
//! through [`InputLookup`], a per-destination index built from the table.

use std::collections::{BTreeMap, HashSet};

use crate::node::NodeId;

/// A directed arc from an output port to an input port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Connection {
    /// Source node.
    pub source: NodeId,
    /// Output port index on the source.
    pub source_port: usize,
    /// Destination node.
    pub dest: NodeId,
    /// Input port index on the destination.
    pub dest_port: usize,
}

impl Connection {
    /// Creates a connection.
    pub fn new(source: NodeId, source_port: usize, dest: NodeId, dest_port: usize) -> Self {
        Self {
            source,
            source_port,
            dest,
            dest_port,
        }
    }

    /// True if either endpoint is `node`.
    pub fn touches(&self, node: NodeId) -> bool {
        self.source == node || self.dest == node
    }
}

/// Sorted set of connections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionTable {
    arcs: Vec<Connection>,
}

impl ConnectionTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections.
    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    /// Returns true if there are no connections.
    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    /// Inserts in sorted position. Returns false if already present.
    pub fn insert(&mut self, arc: Connection) -> bool {
        match self.arcs.binary_search(&arc) {
            Ok(_) => false,
            Err(pos) => {
                self.arcs.insert(pos, arc);
                true
            }
        }
    }

    /// Removes one connection. Returns false if it was not present.
    pub fn remove(&mut self, arc: &Connection) -> bool {
        match self.arcs.binary_search(arc) {
            Ok(pos) => {
                self.arcs.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    /// True if the exact connection exists.
    pub fn contains(&self, arc: &Connection) -> bool {
        self.arcs.binary_search(arc).is_ok()
    }

    /// Looks up the connection between two ports.
    pub fn get_between(
        &self,
        source: NodeId,
        source_port: usize,
        dest: NodeId,
        dest_port: usize,
    ) -> Option<&Connection> {
        let key = Connection::new(source, source_port, dest, dest_port);
        self.arcs.binary_search(&key).ok().map(|i| &self.arcs[i])
    }

    /// True if any port of `source` feeds any port of `dest`.
    pub fn is_connected(&self, source: NodeId, dest: NodeId) -> bool {
        self.from_node(source).any(|c| c.dest == dest)
    }

    /// Connections leaving `source`, in port order.
    pub fn from_node(&self, source: NodeId) -> impl Iterator<Item = &Connection> {
        let start = self.arcs.partition_point(|c| c.source < source);
        self.arcs[start..].iter().take_while(move |c| c.source == source)
    }

    /// Connections leaving one output port.
    pub fn from_port(&self, source: NodeId, source_port: usize) -> impl Iterator<Item = &Connection> {
        let start = self
            .arcs
            .partition_point(|c| (c.source, c.source_port) < (source, source_port));
        self.arcs[start..]
            .iter()
            .take_while(move |c| c.source == source && c.source_port == source_port)
    }

    /// Connections arriving at one input port.
    pub fn to_port(&self, dest: NodeId, dest_port: usize) -> impl Iterator<Item = &Connection> {
        self.arcs
            .iter()
            .filter(move |c| c.dest == dest && c.dest_port == dest_port)
    }

    /// Connections arriving at `dest`.
    pub fn to_node(&self, dest: NodeId) -> impl Iterator<Item = &Connection> {
        self.arcs.iter().filter(move |c| c.dest == dest)
    }

    /// Removes every connection touching `node`. Returns how many were removed.
    pub fn remove_node(&mut self, node: NodeId) -> usize {
        let before = self.arcs.len();
        self.arcs.retain(|c| !c.touches(node));
        before - self.arcs.len()
    }

    /// Keeps only connections for which `keep` returns true.
    /// Returns how many were removed.
    pub fn retain(&mut self, keep: impl FnMut(&Connection) -> bool) -> usize {
        let before = self.arcs.len();
        self.arcs.retain(keep);
        before - self.arcs.len()
    }

    /// Iterates connections in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.arcs.iter()
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.arcs.clear();
    }
}

impl<'a> IntoIterator for &'a ConnectionTable {
    type Item = &'a Connection;
    type IntoIter = core::slice::Iter<'a, Connection>;

    fn into_iter(self) -> Self::IntoIter {
        self.arcs.iter()
    }
}

/// Index from each node to the nodes feeding it directly.
#[derive(Debug, Default)]
pub struct InputLookup {
    sources: BTreeMap<NodeId, Vec<NodeId>>,
}

impl InputLookup {
    /// Builds the index from a connection table.
    pub fn new(table: &ConnectionTable) -> Self {
        let mut sources: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
        for c in table {
            sources.entry(c.dest).or_default().push(c.source);
        }
        for list in sources.values_mut() {
            list.sort_unstable();
            list.dedup();
        }
        Self { sources }
    }

    /// Nodes feeding `dest` directly.
    pub fn direct_sources(&self, dest: NodeId) -> &[NodeId] {
        self.sources.get(&dest).map_or(&[], Vec::as_slice)
    }

    /// True if `input` feeds `dest` directly or through at most `max_depth`
    /// intermediate hops.
    ///
    /// Breadth-first over an explicit frontier with a visited set, so cycles
    /// and deep chains terminate without recursion.
    pub fn is_an_input_to(&self, input: NodeId, dest: NodeId, max_depth: usize) -> bool {
        let mut visited = HashSet::new();
        let mut frontier = vec![dest];
        let mut next = Vec::new();
        let mut depth = 0;

        while !frontier.is_empty() && depth <= max_depth {
            for node in frontier.drain(..) {
                for &src in self.direct_sources(node) {
                    if src == input {
                        return true;
                    }
                    if visited.insert(src) {
                        next.push(src);
                    }
                }
            }
            core::mem::swap(&mut frontier, &mut next);
            depth += 1;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u32) -> NodeId {
        NodeId::new(n)
    }

    fn arc(s: u32, sp: usize, d: u32, dp: usize) -> Connection {
        Connection::new(id(s), sp, id(d), dp)
    }

    #[test]
    fn test_insert_keeps_sorted_and_rejects_duplicates() {
        let mut table = ConnectionTable::new();
        assert!(table.insert(arc(3, 0, 1, 0)));
        assert!(table.insert(arc(1, 1, 2, 0)));
        assert!(table.insert(arc(1, 0, 2, 0)));
        assert!(!table.insert(arc(1, 0, 2, 0)));

        let order: Vec<_> = table.iter().copied().collect();
        assert_eq!(order, vec![arc(1, 0, 2, 0), arc(1, 1, 2, 0), arc(3, 0, 1, 0)]);
        assert!(table.get_between(id(1), 1, id(2), 0).is_some());
        assert!(table.get_between(id(1), 2, id(2), 0).is_none());
    }

    #[test]
    fn test_port_queries() {
        let mut table = ConnectionTable::new();
        table.insert(arc(1, 0, 2, 0));
        table.insert(arc(1, 0, 3, 0));
        table.insert(arc(1, 1, 3, 1));
        table.insert(arc(4, 0, 3, 0));

        assert_eq!(table.from_port(id(1), 0).count(), 2);
        assert_eq!(table.from_node(id(1)).count(), 3);
        assert_eq!(table.to_port(id(3), 0).count(), 2);
        assert!(table.is_connected(id(4), id(3)));
        assert!(!table.is_connected(id(3), id(4)));
    }

    #[test]
    fn test_remove_node_drops_both_directions() {
        let mut table = ConnectionTable::new();
        table.insert(arc(1, 0, 2, 0));
        table.insert(arc(2, 0, 3, 0));
        table.insert(arc(1, 0, 3, 0));
        assert_eq!(table.remove_node(id(2)), 2);
        assert_eq!(table.len(), 1);
        assert!(table.remove(&arc(1, 0, 3, 0)));
        assert!(!table.remove(&arc(1, 0, 3, 0)));
    }

    #[test]
    fn test_is_an_input_to_transitive() {
        let mut table = ConnectionTable::new();
        table.insert(arc(1, 0, 2, 0));
        table.insert(arc(2, 0, 3, 0));
        table.insert(arc(3, 0, 4, 0));
        let lookup = InputLookup::new(&table);

        assert!(lookup.is_an_input_to(id(1), id(2), 4));
        assert!(lookup.is_an_input_to(id(1), id(4), 4));
        assert!(!lookup.is_an_input_to(id(4), id(1), 4));
        // 1 -> 4 needs two intermediate hops
        assert!(!lookup.is_an_input_to(id(1), id(4), 1));
    }

    #[test]
    fn test_is_an_input_to_terminates_on_cycle() {
        let mut table = ConnectionTable::new();
        table.insert(arc(1, 0, 2, 0));
        table.insert(arc(2, 0, 3, 0));
        table.insert(arc(3, 0, 1, 0));
        let lookup = InputLookup::new(&table);

        assert!(lookup.is_an_input_to(id(2), id(1), 3));
        assert!(!lookup.is_an_input_to(id(9), id(1), 3));
    }
}
