use std::fmt;

/// Identifier assigned to one persisted object by the symbol table.
///
/// Ids start at 1 and increase monotonically within a session; 0 is the
/// null id and never names a live symbol. Ids are never reused while the
/// symbol is still referenced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

impl SymbolId {
    /// The null id (no object).
    pub const NULL: SymbolId = SymbolId(0);

    /// Construct from a raw id value.
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw id value.
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Returns `true` for the null id.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sequential identifier of one branch graph within a container session.
///
/// Assigned in write order starting at 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchGraphId(u32);

impl BranchGraphId {
    /// Construct from a raw id value.
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// The raw id value.
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for BranchGraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph-{}", self.0)
    }
}
