//! Symbol table for the Arbor graph container.
//!
//! The table is the canonical identity/sharing/ownership ledger for one
//! save/load session: it maps domain objects to integer ids, counts
//! referencing edges, tracks which branch graph owns each object, records
//! cross-graph dependencies, and persists the shared remainder of all of
//! that as the container's trailing table record.

pub mod error;
pub mod io;
pub mod symbol;
pub mod table;

pub use error::{SymbolError, SymbolResult};
pub use symbol::{Category, Ownership, Symbol};
pub use table::{BranchGraph, SymbolTable};

#[cfg(test)]
mod proptests {
    use crate::symbol::Category;
    use crate::table::SymbolTable;
    use arbor_types::GraphObject;
    use proptest::prelude::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// One step against a pool of up to 8 distinct objects.
    #[derive(Clone, Debug)]
    enum Op {
        Reference(usize),
    }

    fn ops() -> impl Strategy<Value = Vec<Op>> {
        proptest::collection::vec((0usize..8).prop_map(Op::Reference), 1..64)
    }

    proptest! {
        /// Ids are assigned monotonically and refcounts equal the number
        /// of referencing edges, regardless of reference order.
        #[test]
        fn refcounts_match_edges(ops in ops()) {
            let mut table = SymbolTable::new();
            let pool: Vec<GraphObject> =
                (0..8).map(|_| Arc::new(0u64) as GraphObject).collect();
            let mut expected: HashMap<usize, u32> = HashMap::new();
            let mut last_id = 0u32;

            for Op::Reference(i) in ops {
                let fresh = !expected.contains_key(&i);
                let id = table.add_reference(&pool[i], Category::Component);
                *expected.entry(i).or_insert(0) += 1;
                if fresh {
                    prop_assert!(id.raw() > last_id, "ids must increase");
                    last_id = id.raw();
                }
            }

            for (i, count) in &expected {
                let id = table.symbol_for(&pool[*i]).expect("referenced object has a symbol");
                let sym = table.get(id).unwrap();
                prop_assert_eq!(sym.ref_count, *count);
                prop_assert_eq!(sym.is_shared(), *count > 1);
            }
            prop_assert_eq!(table.next_free_id(), last_id + 1);
        }
    }
}
