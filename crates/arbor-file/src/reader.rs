//! Read side of the random-access container.
//!
//! Opening parses the header and merges the persisted table sections;
//! no object records are touched until a graph, named object, or user
//! payload is asked for. Graph loads are memoized through the per-symbol
//! graph-built flag, and a reference into a graph or component record
//! that is not loaded yet triggers a targeted seek-and-parse rather than
//! a whole-file read.

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use arbor_codec::{CodecError, Controller, TypeRegistry};
use arbor_stream::{InputStream, ReadExt, SeekReader};
use arbor_symtab::{io as table_io, SymbolError};
use arbor_types::{BranchGraphId, GraphObject, SymbolId};

use crate::error::{FileError, FileResult};
use crate::header::{FORMAT_VERSION, MAGIC, OFFSET_VERSION};

/// Reading session over a seekable container.
pub struct FileReader<R: Read + Seek> {
    input: SeekReader<R>,
    ctl: Controller,
    version: i32,
    description: String,
    session_ptr: u64,
    universe_ptr: u64,
}

impl FileReader<File> {
    /// Open a container file at `path`.
    pub fn open(path: impl AsRef<Path>, registry: Arc<TypeRegistry>) -> FileResult<Self> {
        let file = File::open(path)?;
        Self::new(file, registry)
    }
}

impl<R: Read + Seek> FileReader<R> {
    /// Open a reading session on `inner`: verify magic and version, load
    /// the table sections, and check the persisted type registry against
    /// `registry`.
    pub fn new(inner: R, registry: Arc<TypeRegistry>) -> FileResult<Self> {
        let mut input = SeekReader::new(inner);
        let magic = input.read_utf().map_err(|_| FileError::InvalidMagic {
            found: String::new(),
        })?;
        if magic != MAGIC {
            return Err(FileError::InvalidMagic { found: magic });
        }

        input.seek_to(OFFSET_VERSION)?;
        let version = input.read_i32()?;
        if version > FORMAT_VERSION {
            return Err(FileError::UnsupportedVersion {
                found: version,
                supported: FORMAT_VERSION,
            });
        }
        let symtab_ptr = input.read_u64()?;
        let branch_dir_ptr = input.read_u64()?;
        let named_ptr = input.read_u64()?;
        let registry_ptr = input.read_u64()?;
        let universe_ptr = input.read_u64()?;
        let _reserved = input.read_i32()?;
        let branch_count = input.read_i32()?;
        let description = input.read_utf()?;
        let session_ptr = input.position();

        if symtab_ptr == 0 {
            return Err(FileError::NotFinalized);
        }

        let mut ctl = Controller::new(registry);
        input.seek_to(symtab_ptr)?;
        table_io::read_symbols(ctl.table_mut(), &mut input)?;
        input.seek_to(named_ptr)?;
        table_io::read_named(ctl.table_mut(), &mut input)?;
        input.seek_to(branch_dir_ptr)?;
        table_io::read_roots(ctl.table_mut(), &mut input)?;
        table_io::read_dependencies(ctl.table_mut(), &mut input)?;
        input.seek_to(registry_ptr)?;
        ctl.registry().check_registry(&mut input)?;

        if branch_count as usize != ctl.table().graph_count() {
            return Err(FileError::Format(format!(
                "header declares {branch_count} branch graphs, directory holds {}",
                ctl.table().graph_count()
            )));
        }
        debug!(version, branch_count, "container opened");

        Ok(Self {
            input,
            ctl,
            version,
            description,
            session_ptr,
            universe_ptr,
        })
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    /// Free-text container description, available without any graph load.
    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn branch_count(&self) -> usize {
        self.ctl.table().graph_count()
    }

    /// Names bound in this container, in arbitrary order.
    pub fn object_names(&self) -> Vec<String> {
        self.ctl
            .table()
            .named_iter()
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// The opaque session user data written at session start.
    pub fn session_data(&mut self) -> FileResult<Vec<u8>> {
        self.input.seek_to(self.session_ptr)?;
        Ok(self.input.read_blob()?)
    }

    /// The universe/config block, if one was written.
    pub fn universe(&mut self) -> FileResult<Option<Vec<u8>>> {
        if self.universe_ptr == 0 {
            return Ok(None);
        }
        self.input.seek_to(self.universe_ptr)?;
        Ok(Some(self.input.read_blob()?))
    }

    /// One graph's opaque user payload, with a single seek and no object
    /// parsing.
    pub fn branch_graph_user_data(&mut self, id: BranchGraphId) -> FileResult<Vec<u8>> {
        let offset = self.graph_offset(id)?;
        self.input.seek_to(offset)?;
        let _declared_records = self.input.read_i32()?;
        Ok(self.input.read_blob()?)
    }

    /// Build one branch graph, loading the graphs it depends on exactly
    /// once each and pruning unshared symbols afterwards. A graph that was
    /// already built returns its memoized root without touching the file.
    pub fn read_branch_graph(&mut self, id: BranchGraphId) -> FileResult<GraphObject> {
        let root = self
            .ctl
            .table()
            .branch_graph(id)
            .ok_or(SymbolError::UnknownGraph(id))?
            .root;
        if self.graph_built(id) {
            if let Some(obj) = self.ctl.table().object(root) {
                return Ok(obj);
            }
        } else {
            self.parse_graph(id)?;
        }
        let obj = self.resolve(root)?;
        self.ctl.prune_unshared();
        Ok(obj)
    }

    /// Look up and build a named object. Only the records it transitively
    /// needs are read.
    pub fn named_object(&mut self, name: &str) -> FileResult<GraphObject> {
        let id = self
            .ctl
            .table()
            .named(name)
            .ok_or_else(|| FileError::UnknownName(name.to_string()))?;
        self.resolve(id)
    }

    fn graph_offset(&self, id: BranchGraphId) -> FileResult<u64> {
        Ok(self
            .ctl
            .table()
            .branch_graph(id)
            .ok_or(SymbolError::UnknownGraph(id))?
            .file_offset)
    }

    fn graph_built(&self, id: BranchGraphId) -> bool {
        self.ctl
            .table()
            .branch_graph(id)
            .and_then(|g| self.ctl.table().get(g.root))
            .map(|s| s.graph_built)
            .unwrap_or(false)
    }

    /// Parse one graph's records into pending constructors and verify the
    /// back-patched record count. Components already known to the session
    /// are skipped via their next-record offsets.
    fn parse_graph(&mut self, id: BranchGraphId) -> FileResult<()> {
        let offset = self.graph_offset(id)?;
        self.input.seek_to(offset)?;
        let declared = self.input.read_i32()?;
        let _user_data = self.input.read_blob()?;

        self.ctl.begin_branch_graph_read(id)?;
        self.ctl.read_record(&mut self.input)?;
        self.ctl.read_components(&mut self.input, true)?;
        let actual = self.ctl.take_record_count();
        self.ctl.end_branch_graph_read(id)?;
        if actual != declared {
            return Err(FileError::RecordCountMismatch {
                graph: id,
                expected: declared,
                actual,
            });
        }
        debug!(graph = %id, records = actual, "branch graph parsed");
        Ok(())
    }

    /// Materialize a symbol, serving every not-loaded reference along the
    /// way: a reference into an unbuilt graph loads that whole graph (at
    /// most once), anything else is fetched as a single record at its
    /// table-recorded offset.
    fn resolve(&mut self, id: SymbolId) -> FileResult<GraphObject> {
        loop {
            match self.ctl.materialize(id) {
                Ok(obj) => return Ok(obj),
                Err(CodecError::NotLoaded { symbol }) => self.fetch(symbol)?,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn fetch(&mut self, symbol: SymbolId) -> FileResult<()> {
        let sym = self
            .ctl
            .table()
            .get(symbol)
            .ok_or(CodecError::UnknownSymbol(symbol))?;
        let owner = sym.ownership.graph();
        let pos = sym.file_position;

        if let Some(graph) = owner {
            if !self.graph_built(graph) {
                debug!(graph = %graph, symbol = %symbol, "loading dependency graph");
                return self.parse_graph(graph);
            }
        }
        if pos == 0 {
            // Nothing on disk for this symbol: a dangling reference from
            // an unclosed dependency.
            return Err(CodecError::NotLoaded { symbol }.into());
        }
        self.input.seek_to(pos)?;
        let parsed = self.ctl.read_record(&mut self.input)?;
        if parsed.id() != Some(symbol) {
            return Err(FileError::Format(format!(
                "record at offset {pos} does not belong to {symbol}"
            )));
        }
        debug!(symbol = %symbol, offset = pos, "lazily fetched record");
        Ok(())
    }
}
