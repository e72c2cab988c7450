//! Write side of the stream backend.
//!
//! Each unit is staged in a seekable in-memory buffer (based at the
//! transport position, so recorded offsets stay meaningful) because the
//! component-batch count is only known once the queue drains. The staged
//! bytes reach the transport only after the self-containment check
//! passes; a failed check flushes nothing.

use std::io::{Cursor, Write};
use std::sync::Arc;

use tracing::debug;

use arbor_codec::{Controller, TypeRegistry};
use arbor_stream::{CountingWriter, OutputStream, SeekWriter, WriteExt};
use arbor_symtab::io as table_io;
use arbor_types::{BranchGraphId, GraphObject};

use crate::error::{WireError, WireResult};
use crate::{FORMAT_VERSION, MAGIC};

/// Writing session over a forward-only transport. One symbol table spans
/// every unit written through the same session, so shared components are
/// serialized once and referenced by id afterwards.
pub struct StreamWriter<W: Write> {
    out: CountingWriter<W>,
    ctl: Controller,
    dead: bool,
}

impl<W: Write> StreamWriter<W> {
    /// Start a session on `inner`, emitting the stream magic and version.
    pub fn new(inner: W, registry: Arc<TypeRegistry>) -> WireResult<Self> {
        let mut out = CountingWriter::new(inner);
        out.write_utf(MAGIC)?;
        out.write_i32(FORMAT_VERSION)?;
        Ok(Self {
            out,
            ctl: Controller::new(registry),
            dead: false,
        })
    }

    /// Write one self-contained unit: the root's object record, the
    /// inline component batch, and the trailing symbol-table record.
    ///
    /// If the graph references an object whose record was never written
    /// in this session, the unit is not self-contained: nothing reaches
    /// the transport and the session is dead.
    pub fn write_branch_graph(&mut self, root: &GraphObject) -> WireResult<BranchGraphId> {
        if self.dead {
            return Err(WireError::DeadSession);
        }
        let base = self.out.position();
        let mut unit = SeekWriter::new_at(Cursor::new(Vec::new()), base);

        let (graph, _) = self.ctl.begin_branch_graph(root, base)?;
        self.ctl.write_object(&mut unit, Some(root))?;
        self.ctl.write_node_components(&mut unit, false)?;
        self.ctl.end_branch_graph()?;

        // Ending the graph confirmed every record written above, so the
        // dependency set now holds only references the unit did not carry
        // and no earlier unit resolved.
        let unresolved = self.ctl.table().unresolved_dependencies(graph)?;
        if !unresolved.is_empty() {
            self.dead = true;
            return Err(WireError::DanglingReferences {
                graph,
                symbols: unresolved,
            });
        }
        table_io::write_table(self.ctl.table(), &mut unit)?;

        let staged = unit.into_inner()?.into_inner();
        self.out.write_bytes(&staged)?;
        self.ctl.prune_unshared_keep_written();
        debug!(graph = %graph, bytes = staged.len(), "stream unit flushed");
        Ok(graph)
    }

    /// Flush and release the transport.
    pub fn into_inner(self) -> WireResult<W> {
        Ok(self.out.into_inner()?)
    }
}
