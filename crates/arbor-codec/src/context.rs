//! Per-record views handed to payload codecs.
//!
//! A codec never touches the symbol table or the backing stream directly;
//! it writes primitives and declares graph edges through these contexts,
//! which route identity bookkeeping through the controller.

use arbor_stream::{InputStream, OutputStream, ReadExt, WriteExt};
use arbor_symtab::Category;
use arbor_types::{GraphObject, SymbolId};

use crate::controller::Controller;
use crate::error::CodecResult;
use crate::payload::PendingRef;

/// Write-side view for one record's payload.
pub struct WriteContext<'a> {
    pub(crate) ctl: &'a mut Controller,
    pub(crate) out: &'a mut dyn OutputStream,
}

impl<'a> WriteContext<'a> {
    pub fn write_u8(&mut self, v: u8) -> CodecResult<()> {
        Ok(self.out.write_u8(v)?)
    }

    pub fn write_bool(&mut self, v: bool) -> CodecResult<()> {
        Ok(self.out.write_bool(v)?)
    }

    pub fn write_i32(&mut self, v: i32) -> CodecResult<()> {
        Ok(self.out.write_i32(v)?)
    }

    pub fn write_u32(&mut self, v: u32) -> CodecResult<()> {
        Ok(self.out.write_u32(v)?)
    }

    pub fn write_i64(&mut self, v: i64) -> CodecResult<()> {
        Ok(self.out.write_i64(v)?)
    }

    pub fn write_u64(&mut self, v: u64) -> CodecResult<()> {
        Ok(self.out.write_u64(v)?)
    }

    pub fn write_utf(&mut self, s: &str) -> CodecResult<()> {
        Ok(self.out.write_utf(s)?)
    }

    pub fn write_blob(&mut self, bytes: &[u8]) -> CodecResult<()> {
        Ok(self.out.write_blob(bytes)?)
    }

    /// Embed a full child record inline in this payload.
    pub fn write_object(&mut self, obj: Option<&GraphObject>) -> CodecResult<()> {
        self.ctl.write_object(self.out, obj)
    }

    /// Record an edge to a node and write its symbol id. The target's
    /// record is not written here; it belongs to the node's own graph.
    pub fn write_node_ref(&mut self, obj: Option<&GraphObject>) -> CodecResult<()> {
        self.ctl.write_node_ref(self.out, obj)
    }

    /// Record an edge to a shared component and write its symbol id,
    /// queueing the component's record for the trailing batch if it has
    /// not been written yet.
    pub fn write_component_ref(&mut self, obj: Option<&GraphObject>) -> CodecResult<()> {
        self.ctl.write_component_ref(self.out, obj)
    }
}

/// Read-side view for one record's payload.
///
/// Every reference a codec reads is collected so the controller can
/// materialize children before the parent.
pub struct ReadContext<'a> {
    pub(crate) ctl: &'a mut Controller,
    pub(crate) input: &'a mut dyn InputStream,
    pub(crate) refs: Vec<SymbolId>,
}

impl<'a> ReadContext<'a> {
    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.input.read_u8()?)
    }

    pub fn read_bool(&mut self) -> CodecResult<bool> {
        Ok(self.input.read_bool()?)
    }

    pub fn read_i32(&mut self) -> CodecResult<i32> {
        Ok(self.input.read_i32()?)
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        Ok(self.input.read_u32()?)
    }

    pub fn read_i64(&mut self) -> CodecResult<i64> {
        Ok(self.input.read_i64()?)
    }

    pub fn read_u64(&mut self) -> CodecResult<u64> {
        Ok(self.input.read_u64()?)
    }

    pub fn read_utf(&mut self) -> CodecResult<String> {
        Ok(self.input.read_utf()?)
    }

    pub fn read_blob(&mut self) -> CodecResult<Vec<u8>> {
        Ok(self.input.read_blob()?)
    }

    /// Parse a child record embedded inline in this payload.
    pub fn read_object(&mut self) -> CodecResult<PendingRef> {
        let pending = self.ctl.read_record(self.input)?;
        if let Some(id) = pending.id() {
            self.refs.push(id);
        }
        Ok(pending)
    }

    /// Read a node reference written by [`WriteContext::write_node_ref`].
    pub fn read_node_ref(&mut self) -> CodecResult<PendingRef> {
        self.read_ref(Category::Node)
    }

    /// Read a component reference written by
    /// [`WriteContext::write_component_ref`].
    pub fn read_component_ref(&mut self) -> CodecResult<PendingRef> {
        self.read_ref(Category::Component)
    }

    fn read_ref(&mut self, category: Category) -> CodecResult<PendingRef> {
        let raw = self.input.read_u32()?;
        let id = SymbolId::new(raw);
        if id.is_null() {
            return Ok(PendingRef::Null);
        }
        self.ctl.observe_reference(id, category)?;
        self.refs.push(id);
        Ok(PendingRef::Symbol(id))
    }
}
