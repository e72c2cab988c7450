//! Read side of the stream backend: one forward pass per unit, no seeks.

use std::io::Read;
use std::sync::Arc;

use tracing::debug;

use arbor_codec::{Controller, TypeRegistry};
use arbor_stream::{CountingReader, ReadExt};
use arbor_symtab::io as table_io;
use arbor_types::GraphObject;

use crate::error::{WireError, WireResult};
use crate::{FORMAT_VERSION, MAGIC};

/// Reading session over a forward-only transport. Units read through one
/// session merge into one symbol table, so a component serialized in an
/// earlier unit resolves by id in every later one.
pub struct StreamReader<R: Read> {
    input: CountingReader<R>,
    ctl: Controller,
    version: i32,
}

impl<R: Read> StreamReader<R> {
    /// Start a session on `inner`: verify the stream magic and version.
    pub fn new(inner: R, registry: Arc<TypeRegistry>) -> WireResult<Self> {
        let mut input = CountingReader::new(inner);
        let magic = input.read_utf().map_err(|_| WireError::InvalidMagic {
            found: String::new(),
        })?;
        if magic != MAGIC {
            return Err(WireError::InvalidMagic { found: magic });
        }
        let version = input.read_i32()?;
        if version > FORMAT_VERSION {
            return Err(WireError::UnsupportedVersion {
                found: version,
                supported: FORMAT_VERSION,
            });
        }
        Ok(Self {
            input,
            ctl: Controller::new(registry),
            version,
        })
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Read the next unit: object records, the inline component batch,
    /// the trailing table record, then build and return the unit's root.
    pub fn read_branch_graph(&mut self) -> WireResult<GraphObject> {
        let root_ref = self.ctl.read_record(&mut self.input)?;
        self.ctl.read_components(&mut self.input, false)?;
        table_io::read_table(self.ctl.table_mut(), &mut self.input)?;

        let root_id = root_ref
            .id()
            .ok_or_else(|| WireError::Format("unit frames a null root record".into()))?;
        let obj = self.ctl.materialize(root_id)?;

        let graph = self
            .ctl
            .table()
            .graphs()
            .find(|g| g.root == root_id)
            .map(|g| g.id);
        if let Some(graph) = graph {
            self.ctl.table_mut().set_graph_built(graph)?;
            debug!(graph = %graph, "stream unit built");
        }
        self.ctl.prune_unshared_keep_written();
        Ok(obj)
    }
}
