use arbor_types::{BranchGraphId, GraphObject, SymbolId};

/// Category of the object behind a symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    /// A scene node; written inline within its owning branch graph.
    Node,
    /// A node-component; written in the batched component section.
    Component,
}

/// Which branch graph a symbol belongs to.
///
/// `Unowned` is the dangling state: the object was referenced before the
/// graph containing it was written. Claiming during a graph write moves it
/// to `Owned`; flushing that graph moves it to `Resolved`. No other
/// transitions exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ownership {
    Unowned,
    Owned(BranchGraphId),
    Resolved(BranchGraphId),
}

impl Ownership {
    /// The owning graph, if one has been established.
    pub fn graph(self) -> Option<BranchGraphId> {
        match self {
            Ownership::Unowned => None,
            Ownership::Owned(g) | Ownership::Resolved(g) => Some(g),
        }
    }

    /// Returns `true` while no graph has claimed the symbol.
    pub fn is_unowned(self) -> bool {
        matches!(self, Ownership::Unowned)
    }

    /// Returns `true` once the owning graph has been flushed.
    pub fn is_resolved(self) -> bool {
        matches!(self, Ownership::Resolved(_))
    }
}

/// Metadata record for one persisted object.
#[derive(Clone, Debug)]
pub struct Symbol {
    /// Session-unique id, assigned monotonically starting at 1.
    pub id: SymbolId,
    /// Number of referencing edges seen during the write pass.
    pub ref_count: u32,
    /// Node-component vs. node category.
    pub is_component: bool,
    /// Branch-graph ownership state.
    pub ownership: Ownership,
    /// Absolute offset of the object's record; 0 while unwritten.
    pub file_position: u64,
    /// Set once the owning branch graph has been materialized on read.
    pub graph_built: bool,
    /// The live object, retained while the symbol is live so reference
    /// identity stays stable.
    pub object: Option<GraphObject>,
}

impl Symbol {
    pub(crate) fn new(id: SymbolId, is_component: bool, object: Option<GraphObject>) -> Self {
        Self {
            id,
            ref_count: 1,
            is_component,
            ownership: Ownership::Unowned,
            file_position: 0,
            graph_built: false,
            object,
        }
    }

    /// Returns `true` once the object's record has been emitted.
    pub fn is_written(&self) -> bool {
        self.file_position != 0
    }

    /// Referenced by more than one parent; retained in the persisted
    /// shared section.
    pub fn is_shared(&self) -> bool {
        self.ref_count > 1
    }

    /// Dangling: referenced but its record was never written.
    pub fn is_dangling(&self) -> bool {
        !self.is_written()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_transitions() {
        let g = BranchGraphId::new(0);
        assert!(Ownership::Unowned.is_unowned());
        assert_eq!(Ownership::Unowned.graph(), None);
        assert_eq!(Ownership::Owned(g).graph(), Some(g));
        assert!(!Ownership::Owned(g).is_resolved());
        assert!(Ownership::Resolved(g).is_resolved());
    }

    #[test]
    fn fresh_symbol_is_dangling() {
        let s = Symbol::new(SymbolId::new(1), false, None);
        assert!(s.is_dangling());
        assert!(!s.is_shared());
        assert_eq!(s.ref_count, 1);
    }
}
