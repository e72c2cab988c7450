//! Persisted form of the symbol table.
//!
//! Four sections, written in this order: shared symbols, named objects,
//! branch-graph roots, per-graph dependency sets. The stream backend emits
//! them contiguously as one trailing record; the random-access backend
//! points fixed header slots at the section starts. Reading is idempotent
//! so stream units can merge into one session table.

use arbor_stream::{InputStream, OutputStream, ReadExt, WriteExt};
use arbor_types::{BranchGraphId, SymbolId};

use crate::error::{SymbolError, SymbolResult};
use crate::symbol::{Ownership, Symbol};
use crate::table::SymbolTable;

fn read_count(input: &mut dyn InputStream, what: &str) -> SymbolResult<usize> {
    let n = input.read_i32()?;
    if n < 0 {
        return Err(SymbolError::Corrupt(format!("negative {what} count {n}")));
    }
    Ok(n as usize)
}

/// Shared-symbol section: count, next free id, then one entry per
/// surviving symbol.
pub fn write_symbols(table: &SymbolTable, out: &mut dyn OutputStream) -> SymbolResult<()> {
    let mut syms: Vec<&Symbol> = table.symbols().collect();
    syms.sort_by_key(|s| s.id);
    out.write_i32(syms.len() as i32)?;
    out.write_i32(table.next_free_id() as i32)?;
    for sym in syms {
        out.write_u32(sym.id.raw())?;
        out.write_u32(sym.ref_count)?;
        out.write_u64(sym.file_position)?;
        out.write_bool(sym.is_component)?;
        match sym.ownership.graph() {
            Some(g) => {
                out.write_i32(g.raw() as i32)?;
                let ptr = table.branch_graph(g).map(|bg| bg.file_offset).unwrap_or(0);
                out.write_u64(ptr)?;
            }
            None => {
                out.write_i32(-1)?;
                out.write_u64(0)?;
            }
        }
    }
    Ok(())
}

pub fn read_symbols(table: &mut SymbolTable, input: &mut dyn InputStream) -> SymbolResult<()> {
    let count = read_count(input, "symbol")?;
    let next_free = input.read_i32()?;
    for _ in 0..count {
        let id = SymbolId::new(input.read_u32()?);
        let ref_count = input.read_u32()?;
        let file_position = input.read_u64()?;
        let is_component = input.read_bool()?;
        let graph_id = input.read_i32()?;
        let _graph_ptr = input.read_u64()?;

        if id.is_null() {
            return Err(SymbolError::Corrupt("null symbol id in table".into()));
        }
        let mut sym = Symbol::new(id, is_component, None);
        sym.ref_count = ref_count;
        sym.file_position = file_position;
        // A persisted owner has by definition been flushed.
        sym.ownership = if graph_id < 0 {
            Ownership::Unowned
        } else {
            Ownership::Resolved(BranchGraphId::new(graph_id as u32))
        };
        table.insert_persisted(sym);
    }
    if next_free >= 0 {
        table.observe_next_free(next_free as u32);
    }
    Ok(())
}

/// Named-object section: name/symbol pairs in name order.
pub fn write_named(table: &SymbolTable, out: &mut dyn OutputStream) -> SymbolResult<()> {
    let mut entries: Vec<(&str, SymbolId)> = table.named_iter().collect();
    entries.sort_by_key(|(name, _)| name.to_string());
    out.write_i32(entries.len() as i32)?;
    for (name, id) in entries {
        out.write_utf(name)?;
        out.write_u32(id.raw())?;
    }
    Ok(())
}

pub fn read_named(table: &mut SymbolTable, input: &mut dyn InputStream) -> SymbolResult<()> {
    let count = read_count(input, "named-object")?;
    for _ in 0..count {
        let name = input.read_utf()?;
        let id = SymbolId::new(input.read_u32()?);
        table.set_named(&name, id)?;
    }
    Ok(())
}

/// Branch-graph root section: one entry per graph, in graph-id order.
pub fn write_roots(table: &SymbolTable, out: &mut dyn OutputStream) -> SymbolResult<()> {
    out.write_i32(table.graph_count() as i32)?;
    for graph in table.graphs() {
        out.write_i32(graph.id.raw() as i32)?;
        out.write_u32(graph.root.raw())?;
        out.write_u64(graph.file_offset)?;
    }
    Ok(())
}

pub fn read_roots(table: &mut SymbolTable, input: &mut dyn InputStream) -> SymbolResult<()> {
    let count = read_count(input, "branch-graph")?;
    for _ in 0..count {
        let id = input.read_i32()?;
        let root = SymbolId::new(input.read_u32()?);
        let offset = input.read_u64()?;
        if id < 0 {
            return Err(SymbolError::Corrupt(format!("negative graph id {id}")));
        }
        table.insert_graph(BranchGraphId::new(id as u32), root, offset)?;
    }
    Ok(())
}

/// Per-graph dependency section, in graph-id order.
pub fn write_dependencies(table: &SymbolTable, out: &mut dyn OutputStream) -> SymbolResult<()> {
    out.write_i32(table.graph_count() as i32)?;
    for graph in table.graphs() {
        out.write_i32(graph.id.raw() as i32)?;
        let deps = table.unresolved_dependencies(graph.id)?;
        out.write_i32(deps.len() as i32)?;
        for dep in deps {
            out.write_u32(dep.raw())?;
        }
    }
    Ok(())
}

pub fn read_dependencies(table: &mut SymbolTable, input: &mut dyn InputStream) -> SymbolResult<()> {
    let count = read_count(input, "dependency-set")?;
    for _ in 0..count {
        let id = input.read_i32()?;
        let deps = read_count(input, "dependency")?;
        let mut set = Vec::with_capacity(deps);
        for _ in 0..deps {
            set.push(SymbolId::new(input.read_u32()?));
        }
        if id < 0 {
            return Err(SymbolError::Corrupt(format!("negative graph id {id}")));
        }
        table.merge_dependencies(BranchGraphId::new(id as u32), set)?;
    }
    Ok(())
}

/// Write the full table record: symbols, named objects, roots,
/// dependency sets.
pub fn write_table(table: &SymbolTable, out: &mut dyn OutputStream) -> SymbolResult<()> {
    write_symbols(table, out)?;
    write_named(table, out)?;
    write_roots(table, out)?;
    write_dependencies(table, out)
}

/// Read a full table record, merging into the session table.
pub fn read_table(table: &mut SymbolTable, input: &mut dyn InputStream) -> SymbolResult<()> {
    read_symbols(table, input)?;
    // Bindings may name symbols that only appear in the root section of a
    // later unit; symbols always precede names within one record though.
    read_named(table, input)?;
    read_roots(table, input)?;
    read_dependencies(table, input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Category;
    use arbor_stream::{CountingReader, CountingWriter};
    use arbor_types::GraphObject;
    use std::io::Cursor;
    use std::sync::Arc;

    fn obj() -> GraphObject {
        Arc::new(0u8)
    }

    fn populated() -> SymbolTable {
        let mut t = SymbolTable::new();
        let root = t.create_symbol(&obj(), 0).unwrap();
        t.set_branch_graph_root(root, 100).unwrap();
        let shared = obj();
        let sid = t.add_reference(&shared, Category::Component);
        t.add_reference(&shared, Category::Component);
        t.mark_component_written(sid, 140).unwrap();
        let dangling = t.add_reference(&obj(), Category::Node);
        t.add_inter_graph_dependency(dangling).unwrap();
        t.set_named("root", root).unwrap();
        t.confirm_inter_graph_dependency(root).unwrap();
        t.confirm_inter_graph_dependency(sid).unwrap();
        t.clear_current_graph();
        t
    }

    fn roundtrip(t: &SymbolTable) -> SymbolTable {
        let mut w = CountingWriter::new(Vec::new());
        write_table(t, &mut w).unwrap();
        let bytes = w.into_inner().unwrap();
        let mut back = SymbolTable::new();
        let mut r = CountingReader::new(Cursor::new(bytes));
        read_table(&mut back, &mut r).unwrap();
        back
    }

    #[test]
    fn table_roundtrip() {
        let t = populated();
        let back = roundtrip(&t);

        assert_eq!(back.len(), t.len());
        assert_eq!(back.next_free_id(), t.next_free_id());
        assert_eq!(back.graph_count(), 1);
        let root = back.named("root").unwrap();
        let g = BranchGraphId::new(0);
        assert_eq!(back.branch_graph(g).unwrap().root, root);
        assert_eq!(back.branch_graph(g).unwrap().file_offset, 100);
        assert_eq!(
            back.unresolved_dependencies(g).unwrap(),
            t.unresolved_dependencies(g).unwrap()
        );

        for sym in t.symbols() {
            let got = back.get(sym.id).expect("symbol survives");
            assert_eq!(got.ref_count, sym.ref_count);
            assert_eq!(got.file_position, sym.file_position);
            assert_eq!(got.is_component, sym.is_component);
        }
    }

    #[test]
    fn double_read_is_idempotent() {
        let t = populated();
        let mut w = CountingWriter::new(Vec::new());
        write_table(&t, &mut w).unwrap();
        let bytes = w.into_inner().unwrap();

        let mut back = SymbolTable::new();
        let mut r = CountingReader::new(Cursor::new(bytes.clone()));
        read_table(&mut back, &mut r).unwrap();
        let len = back.len();
        let mut r = CountingReader::new(Cursor::new(bytes));
        read_table(&mut back, &mut r).unwrap();
        assert_eq!(back.len(), len);
        assert_eq!(back.graph_count(), 1);
    }

    #[test]
    fn truncated_table_rejected() {
        let t = populated();
        let mut w = CountingWriter::new(Vec::new());
        write_table(&t, &mut w).unwrap();
        let mut bytes = w.into_inner().unwrap();
        bytes.truncate(bytes.len() / 2);
        let mut back = SymbolTable::new();
        let mut r = CountingReader::new(Cursor::new(bytes));
        assert!(read_table(&mut back, &mut r).is_err());
    }
}
