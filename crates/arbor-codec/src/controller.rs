//! The dispatch layer between container backends and payload codecs.
//!
//! Writing: every object record is `i32 type tag, u32 symbol id, payload`,
//! so any record can be cross-referenced by symbol regardless of where it
//! sits in the container. Components referenced during a graph are queued
//! and emitted in a trailing batch after the graph's node spine.
//!
//! Reading is two-phase: records are parsed into pending constructors
//! first, then materialized bottom-up once every referenced symbol has a
//! record available. A reference whose record is absent surfaces as
//! [`CodecError::NotLoaded`], which a random-access backend answers by
//! fetching the record at its known offset and retrying.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tracing::debug;

use arbor_stream::{InputStream, OutputStream, ReadExt, WriteExt};
use arbor_symtab::{Category, SymbolTable};
use arbor_types::{BranchGraphId, GraphObject, SymbolId};

use crate::context::{ReadContext, WriteContext};
use crate::error::{CodecError, CodecResult};
use crate::payload::{Materializer, PendingPayload, PendingRef};
use crate::registry::{TypeRegistry, WireTag};

struct PendingRecord {
    refs: Vec<SymbolId>,
    payload: PendingPayload,
}

/// Orchestrates record framing, symbol bookkeeping, and codec dispatch
/// for one container session.
pub struct Controller {
    registry: Arc<TypeRegistry>,
    table: SymbolTable,
    /// Batching frames; component references land in the innermost one,
    /// in reference order. A graph write opens the outermost frame.
    frames: Vec<VecDeque<SymbolId>>,
    queued: HashSet<SymbolId>,
    /// Parsed records awaiting materialization.
    pending: HashMap<SymbolId, PendingRecord>,
    /// Symbols whose records were written during the current graph; their
    /// ownership is confirmed when the graph ends.
    written: Vec<SymbolId>,
    /// Records framed (written or parsed) since the last
    /// [`take_record_count`](Controller::take_record_count).
    records: i32,
}

impl Controller {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            table: SymbolTable::new(),
            frames: Vec::new(),
            queued: HashSet::new(),
            pending: HashMap::new(),
            written: Vec::new(),
            records: 0,
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn table(&self) -> &SymbolTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut SymbolTable {
        &mut self.table
    }

    /// Records framed since the last call; resets the counter.
    pub fn take_record_count(&mut self) -> i32 {
        std::mem::take(&mut self.records)
    }

    // ---------------------------------------------------------------
    // Writing
    // ---------------------------------------------------------------

    /// Begin writing a branch graph whose record will start at
    /// `file_offset`, establishing the current-graph context.
    pub fn begin_branch_graph(
        &mut self,
        root: &GraphObject,
        file_offset: u64,
    ) -> CodecResult<(BranchGraphId, SymbolId)> {
        if self.table.current_graph().is_some() {
            return Err(CodecError::Protocol(
                "cannot begin a branch graph while another is being written".into(),
            ));
        }
        let root_id = self.table.root_symbol(root)?;
        let graph = self.table.set_branch_graph_root(root_id, file_offset)?;
        self.start_component_frame();
        self.records = 0;
        Ok((graph, root_id))
    }

    /// Open a nested batching frame. Component references recorded while
    /// it is open are drained by the next
    /// [`write_node_components`](Controller::write_node_components) call,
    /// so a sub-tree's components can be kept contiguous with it.
    pub fn start_component_frame(&mut self) {
        self.frames.push(VecDeque::new());
    }

    /// Close the innermost batching frame, which must have been drained.
    pub fn end_component_frame(&mut self) -> CodecResult<()> {
        match self.frames.pop() {
            Some(frame) if frame.is_empty() => Ok(()),
            Some(_) => Err(CodecError::Protocol(
                "component frame ended with queued components unwritten".into(),
            )),
            None => Err(CodecError::Protocol("no component frame open".into())),
        }
    }

    /// Write one object record at the current position. `None` is framed
    /// as the null tag with no symbol or payload.
    pub fn write_object(
        &mut self,
        out: &mut dyn OutputStream,
        obj: Option<&GraphObject>,
    ) -> CodecResult<()> {
        let Some(obj) = obj else {
            out.write_i32(-1)?;
            return Ok(());
        };
        let pos = out.position();
        let id = self.table.create_symbol(obj, pos)?;
        self.emit_record(out, obj, id)?;
        self.written.push(id);
        Ok(())
    }

    /// Write a node reference: the target's symbol id only, never its
    /// record. A target owned by another unflushed graph (or by no graph
    /// yet) becomes an inter-graph dependency of the current graph.
    pub fn write_node_ref(
        &mut self,
        out: &mut dyn OutputStream,
        obj: Option<&GraphObject>,
    ) -> CodecResult<()> {
        let Some(obj) = obj else {
            out.write_u32(0)?;
            return Ok(());
        };
        let id = self.table.add_reference(obj, Category::Node);
        self.table.add_inter_graph_dependency(id)?;
        out.write_u32(id.raw())?;
        Ok(())
    }

    /// Write a component reference: the symbol id, queueing the
    /// component's record for the trailing batch on first sight.
    pub fn write_component_ref(
        &mut self,
        out: &mut dyn OutputStream,
        obj: Option<&GraphObject>,
    ) -> CodecResult<()> {
        let Some(obj) = obj else {
            out.write_u32(0)?;
            return Ok(());
        };
        let id = self.table.add_reference(obj, Category::Component);
        let written = self.table.get(id).map(|s| s.is_written()).unwrap_or(false);
        if !written && self.queued.insert(id) {
            let frame = self.frames.last_mut().ok_or_else(|| {
                CodecError::Protocol("component reference outside a batching frame".into())
            })?;
            frame.push_back(id);
        }
        out.write_u32(id.raw())?;
        Ok(())
    }

    /// Drain the component queue into a trailing batch: an `i32` count
    /// (patched once the batch is complete), then per entry the symbol id,
    /// a `u64` next-entry offset, and the component's record. Batch
    /// records written while the batch drains (components referencing
    /// other components) extend the same batch.
    ///
    /// `emit_next_offsets` is false for forward-only transports, which
    /// write zero in the next-entry slots.
    pub fn write_node_components(
        &mut self,
        out: &mut dyn OutputStream,
        emit_next_offsets: bool,
    ) -> CodecResult<i32> {
        let count_slot = out.reserve_i32()?;
        let mut n = 0i32;
        while let Some(id) = self.frames.last_mut().and_then(VecDeque::pop_front) {
            out.write_i32(id.raw() as i32)?;
            let next_slot = out.reserve_u64()?;
            let record_pos = out.position();
            let obj = self.table.object(id).ok_or_else(|| {
                CodecError::Protocol(format!("queued component {id} has no object"))
            })?;
            self.table.mark_component_written(id, record_pos)?;
            self.emit_record(out, &obj, id)?;
            if emit_next_offsets {
                let end = out.position();
                out.patch_u64(next_slot, end)?;
            }
            self.queued.remove(&id);
            self.written.push(id);
            n += 1;
        }
        out.patch_i32(count_slot, n)?;
        debug!(components = n, "component batch written");
        Ok(n)
    }

    /// Finish the current branch graph: confirm ownership of everything
    /// written during it (dropping it from other graphs' dependency sets)
    /// and clear the current-graph context. Returns the record count for
    /// the graph's integrity field.
    pub fn end_branch_graph(&mut self) -> CodecResult<i32> {
        self.end_component_frame()?;
        if !self.frames.is_empty() {
            return Err(CodecError::Protocol(
                "branch graph ended with nested component frames open".into(),
            ));
        }
        for id in std::mem::take(&mut self.written) {
            self.table.confirm_inter_graph_dependency(id)?;
        }
        self.table.clear_current_graph();
        Ok(self.take_record_count())
    }

    fn emit_record(
        &mut self,
        out: &mut dyn OutputStream,
        obj: &GraphObject,
        id: SymbolId,
    ) -> CodecResult<()> {
        let (tag, codec) = self.registry.for_object(obj)?;
        match tag {
            WireTag::Builtin(i) => out.write_i32(i as i32 + 1)?,
            WireTag::Named(name) => {
                out.write_i32(0)?;
                out.write_utf(&name)?;
            }
        }
        out.write_u32(id.raw())?;
        let mut ctx = WriteContext { ctl: self, out };
        codec.write_payload(obj, &mut ctx)?;
        self.records += 1;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Reading
    // ---------------------------------------------------------------

    /// Establish the read-side current graph.
    pub fn begin_branch_graph_read(&mut self, graph: BranchGraphId) -> CodecResult<()> {
        self.table.begin_graph_read(graph)?;
        self.records = 0;
        Ok(())
    }

    /// Finish one graph's parse: mark its root materialized-as-a-graph
    /// and drop the current-graph context.
    pub fn end_branch_graph_read(&mut self, graph: BranchGraphId) -> CodecResult<()> {
        self.table.set_graph_built(graph)?;
        self.table.clear_current_graph();
        Ok(())
    }

    /// Parse one record at the current position into a pending
    /// constructor. The record's object is not built here.
    pub fn read_record(&mut self, input: &mut dyn InputStream) -> CodecResult<PendingRef> {
        self.read_record_tagged(input, false)
    }

    fn read_record_tagged(
        &mut self,
        input: &mut dyn InputStream,
        is_component: bool,
    ) -> CodecResult<PendingRef> {
        let pos = input.position();
        let tag = input.read_i32()?;
        let codec = match tag {
            -1 => return Ok(PendingRef::Null),
            0 => {
                let name = input.read_utf()?;
                self.registry.for_name(&name)?
            }
            t if t > 0 => self.registry.for_index(t as usize - 1)?,
            t => {
                return Err(CodecError::Format(format!(
                    "invalid type tag {t} at offset {pos}"
                )))
            }
        };
        let id = SymbolId::new(input.read_u32()?);
        if id.is_null() {
            return Err(CodecError::Format(format!(
                "record at offset {pos} carries the null symbol"
            )));
        }
        self.table.observe_record(id, is_component, pos);

        let mut ctx = ReadContext {
            ctl: self,
            input,
            refs: Vec::new(),
        };
        let payload = codec.read_payload(&mut ctx)?;
        let refs = ctx.refs;
        self.pending.insert(id, PendingRecord { refs, payload });
        self.records += 1;
        Ok(PendingRef::Symbol(id))
    }

    /// Register a symbol first seen as a reference inside a payload.
    pub(crate) fn observe_reference(
        &mut self,
        id: SymbolId,
        category: Category,
    ) -> CodecResult<()> {
        self.table.observe_reference(id, category);
        Ok(())
    }

    /// Parse a component batch written by
    /// [`write_node_components`](Controller::write_node_components).
    ///
    /// With `can_skip`, entries whose symbol already has a record (from an
    /// earlier graph in the same session) are skipped via their next-entry
    /// offset instead of being re-parsed.
    pub fn read_components(
        &mut self,
        input: &mut dyn InputStream,
        can_skip: bool,
    ) -> CodecResult<()> {
        let count = input.read_i32()?;
        if count < 0 {
            return Err(CodecError::Format(format!(
                "negative component count {count}"
            )));
        }
        for _ in 0..count {
            let raw = input.read_i32()?;
            if raw <= 0 {
                return Err(CodecError::Format(format!(
                    "invalid component symbol id {raw}"
                )));
            }
            let id = SymbolId::new(raw as u32);
            let next = input.read_u64()?;
            let known = self.table.object(id).is_some() || self.pending.contains_key(&id);
            if can_skip && known && next != 0 {
                input.seek_to(next)?;
                // A skipped record still counts toward the graph total.
                self.records += 1;
                continue;
            }
            let parsed = self.read_record_tagged(input, true)?;
            if parsed.id() != Some(id) {
                return Err(CodecError::Format(format!(
                    "component batch entry for {id} framed a record for {parsed:?}"
                )));
            }
        }
        Ok(())
    }

    /// Whether a symbol has a parsed-but-unbuilt record.
    pub fn has_pending(&self, id: SymbolId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Read-side prune: drop unshared symbols, keeping any whose parsed
    /// record has not been built yet.
    pub fn prune_unshared(&mut self) {
        let keep: HashSet<SymbolId> = self.pending.keys().copied().collect();
        self.table.clear_unshared_retaining(&keep);
    }

    /// Stream-session prune: like
    /// [`prune_unshared`](Controller::prune_unshared), but symbols with a
    /// record already on the transport also survive. A forward-only
    /// transport cannot be revisited, so a record sent once must stay
    /// addressable by id for the rest of the session.
    pub fn prune_unshared_keep_written(&mut self) {
        let mut keep: HashSet<SymbolId> = self.pending.keys().copied().collect();
        keep.extend(
            self.table
                .symbols()
                .filter(|s| s.is_written())
                .map(|s| s.id),
        );
        self.table.clear_unshared_retaining(&keep);
    }

    /// Build the object for a symbol, materializing every symbol it
    /// transitively references first.
    ///
    /// A reference with neither an object nor a pending record fails with
    /// [`CodecError::NotLoaded`]; the pending entries along the way are
    /// left in place, so fetching the missing record and calling again
    /// resumes cleanly.
    pub fn materialize(&mut self, id: SymbolId) -> CodecResult<GraphObject> {
        let mut stack = Vec::new();
        self.materialize_inner(id, &mut stack)
    }

    fn materialize_inner(
        &mut self,
        id: SymbolId,
        stack: &mut Vec<SymbolId>,
    ) -> CodecResult<GraphObject> {
        if let Some(obj) = self.table.object(id) {
            return Ok(obj);
        }
        if stack.contains(&id) {
            return Err(CodecError::Format(format!(
                "reference cycle through {id}"
            )));
        }
        if !self.pending.contains_key(&id) {
            return Err(CodecError::NotLoaded { symbol: id });
        }

        let refs = self.pending[&id].refs.clone();
        stack.push(id);
        for child in refs {
            if let Err(e) = self.materialize_inner(child, stack) {
                stack.pop();
                return Err(e);
            }
        }
        stack.pop();

        let record = self.pending.remove(&id).expect("checked above");
        let mut lookup = TableLookup { table: &self.table };
        let obj = match record.payload.build(&mut lookup) {
            Ok(obj) => obj,
            Err(e) => return Err(e),
        };
        self.table.set_object(id, obj.clone())?;
        debug!(symbol = %id, "materialized");
        Ok(obj)
    }
}

/// [`Materializer`] over the session table; valid once every referenced
/// symbol has been built.
struct TableLookup<'a> {
    table: &'a SymbolTable,
}

impl Materializer for TableLookup<'_> {
    fn resolve(&mut self, r: PendingRef) -> CodecResult<Option<GraphObject>> {
        match r {
            PendingRef::Null => Ok(None),
            PendingRef::Symbol(id) => match self.table.object(id) {
                Some(obj) => Ok(Some(obj)),
                None => Err(CodecError::NotLoaded { symbol: id }),
            },
        }
    }
}
