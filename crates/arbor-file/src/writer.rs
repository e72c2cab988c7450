//! Write side of the random-access container.
//!
//! The session is append-only: branch graphs are written in call order,
//! each immediately followed by its component batch, and the table
//! sections land at the end. Close back-patches the fixed header slots;
//! until then the container is deliberately unreadable (zero pointers).

use std::fs::File;
use std::io::{Seek, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use arbor_codec::{Controller, TypeRegistry};
use arbor_stream::{OutputStream, SeekWriter, WriteExt};
use arbor_symtab::{io as table_io, Category};
use arbor_types::{BranchGraphId, GraphObject};

use crate::error::{FileError, FileResult};
use crate::header::{
    FORMAT_VERSION, MAGIC, OFFSET_BRANCH_COUNT, OFFSET_BRANCH_DIR_PTR, OFFSET_NAMED_PTR,
    OFFSET_REGISTRY_PTR, OFFSET_SYMBOL_TABLE_PTR, OFFSET_UNIVERSE_PTR, OFFSET_VERSION,
};

/// Writing session over a seekable container.
///
/// Dropping a writer without [`close`](FileWriter::close) leaves the
/// header pointers zeroed, so readers reject the file as unfinalized
/// rather than parse a truncated session.
pub struct FileWriter<W: Write + Seek> {
    out: SeekWriter<W>,
    ctl: Controller,
    universe_ptr: u64,
}

impl FileWriter<File> {
    /// Create a container file at `path`.
    pub fn create(
        path: impl AsRef<Path>,
        registry: Arc<TypeRegistry>,
        description: &str,
        session_data: &[u8],
    ) -> FileResult<Self> {
        let file = File::create(path)?;
        Self::new(file, registry, description, session_data)
    }
}

impl<W: Write + Seek> FileWriter<W> {
    /// Start a writing session on `inner`, emitting the header, the
    /// description, and the opaque session user data.
    pub fn new(
        inner: W,
        registry: Arc<TypeRegistry>,
        description: &str,
        session_data: &[u8],
    ) -> FileResult<Self> {
        let mut out = SeekWriter::new(inner);
        out.write_utf(MAGIC)?;
        out.seek_forward(OFFSET_VERSION)?;
        out.write_i32(FORMAT_VERSION)?;
        // Pointer slots at 24..64 stay zero until close.
        for _ in 0..5 {
            out.write_u64(0)?;
        }
        out.write_i32(0)?; // reserved
        out.write_i32(0)?; // branch count, patched at close
        debug_assert_eq!(out.position(), crate::header::OFFSET_DESCRIPTION);
        out.write_utf(description)?;
        out.write_blob(session_data)?;
        Ok(Self {
            out,
            ctl: Controller::new(registry),
            universe_ptr: 0,
        })
    }

    /// Write one branch graph: a record-count placeholder, the caller's
    /// opaque per-graph payload, the root's object record, and the
    /// trailing component batch. References into graphs not yet written
    /// are left as dependencies and resolve when those graphs arrive.
    pub fn write_branch_graph(
        &mut self,
        root: &GraphObject,
        user_data: &[u8],
    ) -> FileResult<BranchGraphId> {
        let graph_start = self.out.position();
        let count_slot = self.out.reserve_i32()?;
        self.out.write_blob(user_data)?;

        let (graph, _) = self.ctl.begin_branch_graph(root, graph_start)?;
        self.ctl.write_object(&mut self.out, Some(root))?;
        self.ctl.write_node_components(&mut self.out, true)?;
        let records = self.ctl.end_branch_graph()?;
        self.out.patch_i32(count_slot, records)?;

        self.ctl.table_mut().clear_unshared();
        debug!(graph = %graph, offset = graph_start, records, "branch graph written");
        Ok(graph)
    }

    /// Write the optional universe/config block. Its offset takes the
    /// dedicated header slot at close.
    pub fn write_universe(&mut self, data: &[u8]) -> FileResult<()> {
        if self.universe_ptr != 0 {
            return Err(FileError::Protocol(
                "universe block already written for this session".into(),
            ));
        }
        self.universe_ptr = self.out.position();
        self.out.write_blob(data)?;
        Ok(())
    }

    /// Bind a name to an object. Naming counts as a referencing edge, so
    /// an otherwise-unshared object should be named before the graph that
    /// owns it is written. A binding whose object never gets a record
    /// fails at [`close`](FileWriter::close).
    pub fn set_named_object(&mut self, name: &str, obj: &GraphObject) -> FileResult<()> {
        let id = match self.ctl.table().symbol_for(obj) {
            Some(id) => id,
            None => self.ctl.table_mut().add_reference(obj, Category::Node),
        };
        self.ctl.table_mut().set_named(name, id)?;
        Ok(())
    }

    /// Finish the session: persist the table sections and the builtin
    /// type-name list, then back-patch the header pointers and the branch
    /// count. Consumes the writer; the handle is released on return.
    ///
    /// Every name bound through
    /// [`set_named_object`](FileWriter::set_named_object) must point at an
    /// object whose record was written by now; a binding no reader could
    /// ever satisfy fails the close instead of being persisted.
    pub fn close(mut self) -> FileResult<()> {
        for (name, id) in self.ctl.table().named_iter() {
            let written = self
                .ctl
                .table()
                .get(id)
                .map(|s| s.is_written())
                .unwrap_or(false);
            if !written {
                return Err(FileError::UnwrittenName {
                    name: name.to_string(),
                    symbol: id,
                });
            }
        }

        let symtab_ptr = self.out.position();
        table_io::write_symbols(self.ctl.table(), &mut self.out)?;
        let named_ptr = self.out.position();
        table_io::write_named(self.ctl.table(), &mut self.out)?;
        let branch_dir_ptr = self.out.position();
        table_io::write_roots(self.ctl.table(), &mut self.out)?;
        table_io::write_dependencies(self.ctl.table(), &mut self.out)?;
        let registry_ptr = self.out.position();
        self.ctl.registry().write_registry(&mut self.out)?;

        self.out.patch_u64(OFFSET_SYMBOL_TABLE_PTR, symtab_ptr)?;
        self.out.patch_u64(OFFSET_BRANCH_DIR_PTR, branch_dir_ptr)?;
        self.out.patch_u64(OFFSET_NAMED_PTR, named_ptr)?;
        self.out.patch_u64(OFFSET_REGISTRY_PTR, registry_ptr)?;
        self.out.patch_u64(OFFSET_UNIVERSE_PTR, self.universe_ptr)?;
        self.out
            .patch_i32(OFFSET_BRANCH_COUNT, self.ctl.table().graph_count() as i32)?;
        self.out.flush()?;
        debug!(
            graphs = self.ctl.table().graph_count(),
            symtab_ptr, "container closed"
        );
        let _ = self.out.into_inner()?;
        Ok(())
    }
}
