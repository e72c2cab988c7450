//! The session ledger: identity, sharing, and ownership for one
//! save/load session.
//!
//! # Invariants
//!
//! - Ids are unique and strictly increasing; never reused while a symbol
//!   is still referenced.
//! - An object carries at most one symbol; re-creating a node symbol for
//!   an object that already owns one is a fatal caller error.
//! - `ref_count > 1` keeps a symbol in the persisted shared section after
//!   its owning branch graph is flushed.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use arbor_types::{object_key, BranchGraphId, GraphObject, ObjectKey, SymbolId};

use crate::error::{SymbolError, SymbolResult};
use crate::symbol::{Category, Ownership, Symbol};

/// One independently addressable root subtree: the unit of save/load
/// granularity.
#[derive(Clone, Debug)]
pub struct BranchGraph {
    pub id: BranchGraphId,
    /// Symbol of the graph's root object.
    pub root: SymbolId,
    /// Absolute offset of the graph's record in the container.
    pub file_offset: u64,
    /// Symbols in other (possibly not-yet-written) graphs this graph
    /// depends on. Empty once all of them are flushed.
    pub dependencies: HashSet<SymbolId>,
}

/// The identity/sharing/ownership ledger for one container session.
#[derive(Default)]
pub struct SymbolTable {
    symbols: HashMap<SymbolId, Symbol>,
    /// Write-side identity map: allocation address -> symbol.
    by_object: HashMap<ObjectKey, SymbolId>,
    named: HashMap<String, SymbolId>,
    graphs: Vec<BranchGraph>,
    current_graph: Option<BranchGraphId>,
    next_id: u32,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Self::default()
        }
    }

    /// Number of live symbols.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// The next id that will be assigned.
    pub fn next_free_id(&self) -> u32 {
        self.next_id
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(&id)
    }

    /// The materialized object for a symbol, if any.
    pub fn object(&self, id: SymbolId) -> Option<GraphObject> {
        self.symbols.get(&id).and_then(|s| s.object.clone())
    }

    /// The symbol already registered for an object, if any.
    pub fn symbol_for(&self, obj: &GraphObject) -> Option<SymbolId> {
        self.by_object.get(&object_key(obj)).copied()
    }

    fn alloc_id(&mut self) -> SymbolId {
        let id = SymbolId::new(self.next_id);
        self.next_id += 1;
        id
    }

    // ---------------------------------------------------------------
    // Write-pass mutation
    // ---------------------------------------------------------------

    /// Register the symbol for a node record that is being written at
    /// `file_position`.
    ///
    /// A dangling symbol created by an earlier reference is claimed here:
    /// it becomes owned by the current graph and gains the structural
    /// parent edge. An object that already owns a written node symbol is a
    /// fatal double registration, never silently merged.
    pub fn create_symbol(
        &mut self,
        obj: &GraphObject,
        file_position: u64,
    ) -> SymbolResult<SymbolId> {
        if let Some(id) = self.symbol_for(obj) {
            let current = self.current_graph;
            let is_current_root = current
                .and_then(|g| self.graphs.get(g.raw() as usize))
                .map(|bg| bg.root == id)
                .unwrap_or(false);
            let sym = self.symbols.get_mut(&id).expect("indexed symbol exists");
            if is_current_root && !sym.is_written() && !sym.is_component {
                // The current graph's own root record being written; the
                // symbol was registered when the graph began.
                sym.file_position = file_position;
                return Ok(id);
            }
            if !sym.ownership.is_unowned() || sym.is_written() || sym.is_component {
                return Err(SymbolError::NodeSymbolExists { id });
            }
            sym.ref_count += 1;
            sym.file_position = file_position;
            if let Some(g) = current {
                sym.ownership = Ownership::Owned(g);
            }
            debug!(symbol = %id, "claimed dangling symbol");
            return Ok(id);
        }

        let id = self.alloc_id();
        let mut sym = Symbol::new(id, false, Some(obj.clone()));
        sym.file_position = file_position;
        if let Some(g) = self.current_graph {
            sym.ownership = Ownership::Owned(g);
        }
        self.symbols.insert(id, sym);
        self.by_object.insert(object_key(obj), id);
        Ok(id)
    }

    /// Register the symbol for a branch-graph root about to be written.
    ///
    /// Unlike [`create_symbol`] this is not a referencing edge: a root has
    /// no structural parent, so an existing dangling symbol is returned
    /// unchanged. A root that some graph already owns cannot be begun
    /// again.
    ///
    /// [`create_symbol`]: SymbolTable::create_symbol
    pub fn root_symbol(&mut self, obj: &GraphObject) -> SymbolResult<SymbolId> {
        if let Some(id) = self.symbol_for(obj) {
            let sym = self.symbols.get(&id).expect("indexed symbol exists");
            if sym.ownership.graph().is_some() || sym.is_written() || sym.is_component {
                return Err(SymbolError::NodeSymbolExists { id });
            }
            return Ok(id);
        }
        let id = self.alloc_id();
        self.symbols.insert(id, Symbol::new(id, false, Some(obj.clone())));
        self.by_object.insert(object_key(obj), id);
        Ok(id)
    }

    /// Register one referencing edge to an object, creating a (possibly
    /// dangling) symbol on first sight.
    pub fn add_reference(&mut self, obj: &GraphObject, category: Category) -> SymbolId {
        if let Some(id) = self.symbol_for(obj) {
            let sym = self.symbols.get_mut(&id).expect("indexed symbol exists");
            sym.ref_count += 1;
            // A category-neutral edge (a name binding) may precede the
            // first structural reference; adopt the component category as
            // long as no record has been written.
            if category == Category::Component && !sym.is_written() {
                sym.is_component = true;
            }
            if sym.ref_count == 2 {
                debug!(symbol = %id, "promoted to shared");
            }
            return id;
        }

        let id = self.alloc_id();
        let sym = Symbol::new(id, category == Category::Component, Some(obj.clone()));
        self.symbols.insert(id, sym);
        self.by_object.insert(object_key(obj), id);
        id
    }

    /// Begin a branch graph rooted at `root`, establishing the current
    /// graph context used to classify subsequent references.
    pub fn set_branch_graph_root(
        &mut self,
        root: SymbolId,
        file_offset: u64,
    ) -> SymbolResult<BranchGraphId> {
        let sym = self
            .symbols
            .get_mut(&root)
            .ok_or(SymbolError::UnknownSymbol(root))?;
        if sym.ownership.graph().is_some() {
            // The root was already claimed; a graph cannot be begun twice.
            return Err(SymbolError::NodeSymbolExists { id: root });
        }

        let id = BranchGraphId::new(self.graphs.len() as u32);
        sym.ownership = Ownership::Owned(id);
        self.graphs.push(BranchGraph {
            id,
            root,
            file_offset,
            dependencies: HashSet::new(),
        });
        self.current_graph = Some(id);
        debug!(graph = %id, root = %root, offset = file_offset, "branch graph root set");
        Ok(id)
    }

    /// The graph currently being written, if any.
    pub fn current_graph(&self) -> Option<BranchGraphId> {
        self.current_graph
    }

    /// Drop the current-graph context after a graph is finished.
    pub fn clear_current_graph(&mut self) {
        self.current_graph = None;
    }

    /// Record that the current graph depends on a symbol owned by a
    /// different (possibly not-yet-written) graph. Resolved symbols and
    /// symbols owned by the current graph are not dependencies.
    pub fn add_inter_graph_dependency(&mut self, dep: SymbolId) -> SymbolResult<()> {
        let current = self.current_graph.ok_or(SymbolError::NoCurrentGraph)?;
        let sym = self
            .symbols
            .get(&dep)
            .ok_or(SymbolError::UnknownSymbol(dep))?;
        if sym.ownership.is_resolved() || sym.ownership.graph() == Some(current) {
            return Ok(());
        }
        let graph = &mut self.graphs[current.raw() as usize];
        if graph.dependencies.insert(dep) {
            debug!(graph = %current, symbol = %dep, "inter-graph dependency recorded");
        }
        Ok(())
    }

    /// Mark a symbol's graph as flushed: its ownership becomes resolved
    /// and every graph depending on it drops the dependency.
    pub fn confirm_inter_graph_dependency(&mut self, id: SymbolId) -> SymbolResult<()> {
        let sym = self
            .symbols
            .get_mut(&id)
            .ok_or(SymbolError::UnknownSymbol(id))?;
        if let Ownership::Owned(g) = sym.ownership {
            sym.ownership = Ownership::Resolved(g);
        }
        for graph in &mut self.graphs {
            graph.dependencies.remove(&id);
        }
        Ok(())
    }

    /// Record that a queued component's record was written at `pos`.
    /// The record write itself is not a referencing edge, so the count is
    /// untouched.
    pub fn mark_component_written(&mut self, id: SymbolId, pos: u64) -> SymbolResult<()> {
        let current = self.current_graph;
        let sym = self
            .symbols
            .get_mut(&id)
            .ok_or(SymbolError::UnknownSymbol(id))?;
        sym.file_position = pos;
        if sym.ownership.is_unowned() {
            if let Some(g) = current {
                sym.ownership = Ownership::Owned(g);
            }
        }
        Ok(())
    }

    /// After one branch graph is finished, drop every symbol that is
    /// neither shared, dangling, named, nor a graph root, and rebuild the
    /// identity index from the survivors. Bounds table growth over long
    /// sessions.
    pub fn clear_unshared(&mut self) {
        self.clear_unshared_retaining(&HashSet::new());
    }

    /// [`clear_unshared`], additionally keeping the symbols in `extra`.
    /// The read side passes the ids of parsed-but-unbuilt records, whose
    /// entries must survive until they are materialized.
    ///
    /// [`clear_unshared`]: SymbolTable::clear_unshared
    pub fn clear_unshared_retaining(&mut self, extra: &HashSet<SymbolId>) {
        let named: HashSet<SymbolId> = self.named.values().copied().collect();
        let roots: HashSet<SymbolId> = self.graphs.iter().map(|g| g.root).collect();
        let before = self.symbols.len();
        self.symbols.retain(|id, sym| {
            sym.is_shared()
                || sym.is_dangling()
                || named.contains(id)
                || roots.contains(id)
                || extra.contains(id)
        });
        self.by_object.clear();
        for (id, sym) in &self.symbols {
            if let Some(obj) = &sym.object {
                self.by_object.insert(object_key(obj), *id);
            }
        }
        debug!(dropped = before - self.symbols.len(), retained = self.symbols.len(), "cleared unshared symbols");
    }

    // ---------------------------------------------------------------
    // Named objects
    // ---------------------------------------------------------------

    /// Bind a unique name to a symbol. Rebinding to the same symbol is
    /// idempotent; to a different one, an error.
    pub fn set_named(&mut self, name: &str, id: SymbolId) -> SymbolResult<()> {
        if !self.symbols.contains_key(&id) {
            return Err(SymbolError::UnknownSymbol(id));
        }
        match self.named.get(name) {
            Some(&existing) if existing != id => Err(SymbolError::NameConflict {
                name: name.to_string(),
                existing,
            }),
            _ => {
                self.named.insert(name.to_string(), id);
                Ok(())
            }
        }
    }

    /// Look up a named symbol.
    pub fn named(&self, name: &str) -> Option<SymbolId> {
        self.named.get(name).copied()
    }

    /// All name bindings, in arbitrary order.
    pub fn named_iter(&self) -> impl Iterator<Item = (&str, SymbolId)> {
        self.named.iter().map(|(n, id)| (n.as_str(), *id))
    }

    // ---------------------------------------------------------------
    // Branch graphs
    // ---------------------------------------------------------------

    pub fn branch_graph(&self, id: BranchGraphId) -> Option<&BranchGraph> {
        self.graphs.get(id.raw() as usize)
    }

    pub fn graph_count(&self) -> usize {
        self.graphs.len()
    }

    pub fn graphs(&self) -> impl Iterator<Item = &BranchGraph> {
        self.graphs.iter()
    }

    /// Symbols the graph still depends on, in id order.
    pub fn unresolved_dependencies(&self, id: BranchGraphId) -> SymbolResult<Vec<SymbolId>> {
        let graph = self.branch_graph(id).ok_or(SymbolError::UnknownGraph(id))?;
        let mut deps: Vec<SymbolId> = graph.dependencies.iter().copied().collect();
        deps.sort();
        Ok(deps)
    }

    /// Owning graphs of the unresolved dependencies, where known.
    pub fn dependency_graphs(&self, id: BranchGraphId) -> SymbolResult<Vec<BranchGraphId>> {
        let mut out: Vec<BranchGraphId> = self
            .unresolved_dependencies(id)?
            .iter()
            .filter_map(|dep| self.get(*dep).and_then(|s| s.ownership.graph()))
            .collect();
        out.sort();
        out.dedup();
        Ok(out)
    }

    // ---------------------------------------------------------------
    // Read-pass mutation
    // ---------------------------------------------------------------

    /// Register a symbol observed in an object record whose entry was not
    /// part of any persisted table (an unshared inline node).
    pub fn observe_record(&mut self, id: SymbolId, is_component: bool, file_position: u64) {
        let current = self.current_graph;
        let sym = self.symbols.entry(id).or_insert_with(|| {
            let mut s = Symbol::new(id, is_component, None);
            if let Some(g) = current {
                s.ownership = Ownership::Owned(g);
            }
            s
        });
        if sym.file_position == 0 {
            sym.file_position = file_position;
        }
        self.next_id = self.next_id.max(id.raw() + 1);
    }

    /// Register a symbol first seen as a reference inside some payload,
    /// before its own record or table entry has been read. Ownership is
    /// left unresolved; a later record or persisted entry fills it in.
    pub fn observe_reference(&mut self, id: SymbolId, category: Category) {
        self.symbols
            .entry(id)
            .or_insert_with(|| Symbol::new(id, category == Category::Component, None));
        self.next_id = self.next_id.max(id.raw() + 1);
    }

    /// Merge one entry from a persisted table. Idempotent: reading the
    /// same entry twice (stream units share a session table) leaves the
    /// table unchanged, and an already-materialized object is never
    /// discarded.
    pub fn insert_persisted(&mut self, entry: Symbol) {
        self.next_id = self.next_id.max(entry.id.raw() + 1);
        match self.symbols.get_mut(&entry.id) {
            Some(existing) => {
                existing.ref_count = existing.ref_count.max(entry.ref_count);
                if existing.file_position == 0 {
                    existing.file_position = entry.file_position;
                }
                if existing.ownership.is_unowned() {
                    existing.ownership = entry.ownership;
                }
            }
            None => {
                self.symbols.insert(entry.id, entry);
            }
        }
    }

    /// Merge a persisted branch-graph root entry. Graph ids are assigned
    /// sequentially by the writer, so entries must arrive dense.
    pub fn insert_graph(
        &mut self,
        id: BranchGraphId,
        root: SymbolId,
        file_offset: u64,
    ) -> SymbolResult<()> {
        let idx = id.raw() as usize;
        if idx < self.graphs.len() {
            if self.graphs[idx].root != root {
                return Err(SymbolError::Corrupt(format!(
                    "branch graph {id} re-read with different root"
                )));
            }
            return Ok(());
        }
        if idx != self.graphs.len() {
            return Err(SymbolError::Corrupt(format!(
                "branch graph ids not sequential: got {id}, expected graph-{}",
                self.graphs.len()
            )));
        }
        self.graphs.push(BranchGraph {
            id,
            root,
            file_offset,
            dependencies: HashSet::new(),
        });
        Ok(())
    }

    /// Union persisted dependencies into a graph's dependency set.
    pub fn merge_dependencies(
        &mut self,
        id: BranchGraphId,
        deps: impl IntoIterator<Item = SymbolId>,
    ) -> SymbolResult<()> {
        let graph = self
            .graphs
            .get_mut(id.raw() as usize)
            .ok_or(SymbolError::UnknownGraph(id))?;
        graph.dependencies.extend(deps);
        Ok(())
    }

    /// Attach the materialized object to a symbol.
    pub fn set_object(&mut self, id: SymbolId, obj: GraphObject) -> SymbolResult<()> {
        let sym = self
            .symbols
            .get_mut(&id)
            .ok_or(SymbolError::UnknownSymbol(id))?;
        self.by_object.insert(object_key(&obj), id);
        sym.object = Some(obj);
        Ok(())
    }

    /// Mark a graph's root symbol as fully materialized.
    pub fn set_graph_built(&mut self, id: BranchGraphId) -> SymbolResult<()> {
        let root = self
            .branch_graph(id)
            .ok_or(SymbolError::UnknownGraph(id))?
            .root;
        let sym = self
            .symbols
            .get_mut(&root)
            .ok_or(SymbolError::UnknownSymbol(root))?;
        sym.graph_built = true;
        Ok(())
    }

    /// Establish the read-side current graph (for classifying observed
    /// records during one graph's parse).
    pub fn begin_graph_read(&mut self, id: BranchGraphId) -> SymbolResult<()> {
        if self.branch_graph(id).is_none() {
            return Err(SymbolError::UnknownGraph(id));
        }
        self.current_graph = Some(id);
        Ok(())
    }

    /// Raise the next-free-id watermark to at least `v` (merging a
    /// persisted table must never allow id reuse).
    pub fn observe_next_free(&mut self, v: u32) {
        self.next_id = self.next_id.max(v);
    }

    /// Iterate the symbols that survive into a persisted table.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn obj() -> GraphObject {
        Arc::new(0u32)
    }

    #[test]
    fn ids_start_at_one_and_increase() {
        let mut t = SymbolTable::new();
        let a = obj();
        let b = obj();
        let ia = t.create_symbol(&a, 10).unwrap();
        let ib = t.create_symbol(&b, 20).unwrap();
        assert_eq!(ia.raw(), 1);
        assert_eq!(ib.raw(), 2);
        assert_eq!(t.next_free_id(), 3);
    }

    #[test]
    fn double_node_registration_is_fatal() {
        let mut t = SymbolTable::new();
        let a = obj();
        t.create_symbol(&a, 10).unwrap();
        let err = t.create_symbol(&a, 20).unwrap_err();
        assert!(matches!(err, SymbolError::NodeSymbolExists { .. }));
    }

    #[test]
    fn reference_counts_edges() {
        let mut t = SymbolTable::new();
        let a = obj();
        let id = t.add_reference(&a, Category::Component);
        assert_eq!(t.get(id).unwrap().ref_count, 1);
        assert!(!t.get(id).unwrap().is_shared());
        let id2 = t.add_reference(&a, Category::Component);
        assert_eq!(id, id2);
        assert!(t.get(id).unwrap().is_shared());
    }

    #[test]
    fn dangling_claim_counts_parent_edge() {
        let mut t = SymbolTable::new();
        let a = obj();
        // Referenced before its graph is written: dangling.
        let id = t.add_reference(&a, Category::Node);
        assert!(t.get(id).unwrap().is_dangling());
        // Now written inline under a graph.
        let root = t.create_symbol(&obj(), 5).unwrap();
        t.set_branch_graph_root(root, 5).unwrap();
        let claimed = t.create_symbol(&a, 40).unwrap();
        assert_eq!(claimed, id);
        let sym = t.get(id).unwrap();
        assert_eq!(sym.ref_count, 2);
        assert!(!sym.is_dangling());
        assert_eq!(sym.ownership.graph(), Some(BranchGraphId::new(0)));
    }

    #[test]
    fn dependency_lifecycle() {
        let mut t = SymbolTable::new();
        let shared = obj();

        // Graph 0 references an object nobody owns yet.
        let r0 = t.create_symbol(&obj(), 100).unwrap();
        let g0 = t.set_branch_graph_root(r0, 100).unwrap();
        let dep = t.add_reference(&shared, Category::Node);
        t.add_inter_graph_dependency(dep).unwrap();
        t.confirm_inter_graph_dependency(r0).unwrap();
        t.clear_current_graph();
        assert_eq!(t.unresolved_dependencies(g0).unwrap(), vec![dep]);
        assert_eq!(t.dependency_graphs(g0).unwrap(), vec![]);

        // Graph 1 writes the object inline; the dependency resolves.
        let r1 = t.create_symbol(&obj(), 200).unwrap();
        let g1 = t.set_branch_graph_root(r1, 200).unwrap();
        let claimed = t.create_symbol(&shared, 220).unwrap();
        assert_eq!(claimed, dep);
        t.confirm_inter_graph_dependency(claimed).unwrap();
        t.confirm_inter_graph_dependency(r1).unwrap();
        t.clear_current_graph();

        assert!(t.unresolved_dependencies(g0).unwrap().is_empty());
        assert_eq!(t.get(dep).unwrap().ownership, Ownership::Resolved(g1));
    }

    #[test]
    fn same_graph_reference_is_not_a_dependency() {
        let mut t = SymbolTable::new();
        let r = t.create_symbol(&obj(), 10).unwrap();
        let g = t.set_branch_graph_root(r, 10).unwrap();
        let child = obj();
        let cid = t.create_symbol(&child, 30).unwrap();
        let rid = t.add_reference(&child, Category::Node);
        assert_eq!(cid, rid);
        t.add_inter_graph_dependency(rid).unwrap();
        assert!(t.unresolved_dependencies(g).unwrap().is_empty());
    }

    #[test]
    fn clear_unshared_retains_the_right_symbols() {
        let mut t = SymbolTable::new();
        let root = obj();
        let shared = obj();
        let plain = obj();
        let dangling = obj();
        let named = obj();

        let rid = t.create_symbol(&root, 10).unwrap();
        t.set_branch_graph_root(rid, 10).unwrap();
        let pid = t.create_symbol(&plain, 20).unwrap();
        let sid = t.add_reference(&shared, Category::Component);
        t.add_reference(&shared, Category::Component);
        t.mark_component_written(sid, 30).unwrap();
        let did = t.add_reference(&dangling, Category::Node);
        let nid = t.create_symbol(&named, 40).unwrap();
        t.set_named("keep-me", nid).unwrap();
        t.clear_current_graph();

        t.clear_unshared();

        assert!(t.get(rid).is_some(), "graph root retained");
        assert!(t.get(sid).is_some(), "shared symbol retained");
        assert!(t.get(did).is_some(), "dangling symbol retained");
        assert!(t.get(nid).is_some(), "named symbol retained");
        assert!(t.get(pid).is_none(), "unshared written symbol dropped");

        // Identity index rebuilt: survivors still resolve, dropped do not.
        assert_eq!(t.symbol_for(&shared), Some(sid));
        assert_eq!(t.symbol_for(&plain), None);

        // Ids are not reused after the drop.
        let fresh = t.create_symbol(&obj(), 50).unwrap();
        assert!(fresh.raw() > nid.raw());
    }

    #[test]
    fn name_conflict_rejected() {
        let mut t = SymbolTable::new();
        let a = t.create_symbol(&obj(), 10).unwrap();
        let b = t.create_symbol(&obj(), 20).unwrap();
        t.set_named("x", a).unwrap();
        t.set_named("x", a).unwrap(); // idempotent
        let err = t.set_named("x", b).unwrap_err();
        assert!(matches!(err, SymbolError::NameConflict { .. }));
    }

    #[test]
    fn insert_persisted_is_idempotent() {
        let mut t = SymbolTable::new();
        let mut entry = Symbol::new(SymbolId::new(9), true, None);
        entry.ref_count = 3;
        entry.file_position = 123;
        entry.ownership = Ownership::Resolved(BranchGraphId::new(0));
        t.insert_persisted(entry.clone());
        t.insert_persisted(entry);
        assert_eq!(t.len(), 1);
        let sym = t.get(SymbolId::new(9)).unwrap();
        assert_eq!(sym.ref_count, 3);
        assert_eq!(sym.file_position, 123);
        assert_eq!(t.next_free_id(), 10);
    }

    #[test]
    fn graph_ids_must_be_dense() {
        let mut t = SymbolTable::new();
        t.observe_record(SymbolId::new(1), false, 10);
        t.insert_graph(BranchGraphId::new(0), SymbolId::new(1), 10)
            .unwrap();
        // Re-inserting the same entry is fine.
        t.insert_graph(BranchGraphId::new(0), SymbolId::new(1), 10)
            .unwrap();
        let err = t
            .insert_graph(BranchGraphId::new(5), SymbolId::new(1), 10)
            .unwrap_err();
        assert!(matches!(err, SymbolError::Corrupt(_)));
    }
}
