//! Random-access container backend for the Arbor graph container.
//!
//! A container holds any number of independently addressable branch
//! graphs, written in any order, plus named objects, opaque user payloads,
//! and the persisted symbol table that makes selective and lazy loading
//! possible. The defining trait of this backend is the back-pointer
//! discipline: reserved fields are written as placeholders and patched
//! once their values are known, so readers can skip records with a single
//! seek instead of a structural parse.

pub mod error;
pub mod header;
pub mod reader;
pub mod writer;

pub use error::{FileError, FileResult};
pub use reader::FileReader;
pub use writer::FileWriter;

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::{Seek, SeekFrom, Write};
    use std::sync::Arc;

    use arbor_scene::{registry, Appearance, Color, Group, Link, Mesh, Shape};
    use arbor_types::{BranchGraphId, GraphObject};

    use crate::error::FileError;
    use crate::header::OFFSET_VERSION;
    use crate::reader::FileReader;
    use crate::writer::FileWriter;

    fn shape(appearance: Option<GraphObject>) -> GraphObject {
        Arc::new(Shape {
            appearance,
            mesh: Mesh {
                positions: vec![[0.0, 0.0, 0.0]],
                indices: vec![0],
            },
        })
    }

    fn appearance() -> GraphObject {
        Arc::new(Appearance {
            color: Color::WHITE,
            texture: None,
        })
    }

    #[test]
    fn round_trip_with_shared_component_and_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scene.arb");

        let shared = appearance();
        let root: GraphObject = Arc::new(Group::new(vec![
            Some(shape(Some(shared.clone()))),
            Some(shape(Some(shared.clone()))),
        ]));

        let mut w = FileWriter::create(&path, registry(), "demo scene", b"session-data").unwrap();
        w.set_named_object("material", &shared).unwrap();
        let g = w.write_branch_graph(&root, b"graph-meta").unwrap();
        w.write_universe(b"universe-block").unwrap();
        w.close().unwrap();

        let mut r = FileReader::open(&path, registry()).unwrap();
        assert_eq!(r.description(), "demo scene");
        assert_eq!(r.branch_count(), 1);
        assert_eq!(r.session_data().unwrap(), b"session-data");
        assert_eq!(r.universe().unwrap().unwrap(), b"universe-block");
        assert_eq!(r.branch_graph_user_data(g).unwrap(), b"graph-meta");

        let rebuilt = r.read_branch_graph(g).unwrap();
        let group = rebuilt.downcast_ref::<Group>().unwrap();
        assert_eq!(group.children.len(), 2);
        let a = group.children[0]
            .as_ref()
            .unwrap()
            .downcast_ref::<Shape>()
            .unwrap();
        let b = group.children[1]
            .as_ref()
            .unwrap()
            .downcast_ref::<Shape>()
            .unwrap();
        let pa = a.appearance.as_ref().unwrap();
        let pb = b.appearance.as_ref().unwrap();
        assert!(Arc::ptr_eq(pa, pb));

        // The binding resolves to the very same rebuilt component.
        let named = r.named_object("material").unwrap();
        assert!(Arc::ptr_eq(&named, pa));
    }

    #[test]
    fn graphs_written_out_of_order_resolve_on_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linked.arb");

        let target: GraphObject = Arc::new(Group::new(vec![Some(shape(None))]));
        let linker: GraphObject = Arc::new(Group::new(vec![Some(Arc::new(Link {
            target: Some(target.clone()),
        }) as GraphObject)]));

        let mut w = FileWriter::create(&path, registry(), "", b"").unwrap();
        // The linking graph goes first; its target is dangling until the
        // second graph is written.
        let g0 = w.write_branch_graph(&linker, b"").unwrap();
        let g1 = w.write_branch_graph(&target, b"").unwrap();
        w.close().unwrap();

        let mut r = FileReader::open(&path, registry()).unwrap();
        let rebuilt = r.read_branch_graph(g0).unwrap();
        let group = rebuilt.downcast_ref::<Group>().unwrap();
        let link = group.children[0]
            .as_ref()
            .unwrap()
            .downcast_ref::<Link>()
            .unwrap();
        let linked = link.target.as_ref().unwrap();

        // Reading the dependency graph afterwards is memoized: same root.
        let dep_root = r.read_branch_graph(g1).unwrap();
        assert!(Arc::ptr_eq(linked, &dep_root));
    }

    #[test]
    fn named_object_loads_lazily_and_idempotently() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lazy.arb");

        let shared = appearance();
        let root: GraphObject = Arc::new(Group::new(vec![
            Some(shape(Some(shared.clone()))),
            Some(shape(Some(shared.clone()))),
        ]));

        let mut w = FileWriter::create(&path, registry(), "", b"").unwrap();
        w.set_named_object("material", &shared).unwrap();
        w.write_branch_graph(&root, b"").unwrap();
        w.close().unwrap();

        // No read_branch_graph call: the name alone drives the load.
        let mut r = FileReader::open(&path, registry()).unwrap();
        let first = r.named_object("material").unwrap();
        assert!(first.downcast_ref::<Appearance>().is_some());
        let second = r.named_object("material").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        assert!(matches!(
            r.named_object("no-such-name"),
            Err(FileError::UnknownName(_))
        ));
    }

    #[test]
    fn name_bound_after_the_owning_graph_fails_at_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dead-name.arb");

        let material = appearance();
        let root: GraphObject = Arc::new(Group::new(vec![Some(shape(Some(material.clone())))]));

        let mut w = FileWriter::create(&path, registry(), "", b"").unwrap();
        w.write_branch_graph(&root, b"").unwrap();
        // The unshared component's symbol was pruned with its graph, so
        // this binds a fresh symbol that will never get a record.
        w.set_named_object("material", &material).unwrap();
        assert!(matches!(
            w.close(),
            Err(FileError::UnwrittenName { name, .. }) if name == "material"
        ));
    }

    #[test]
    fn rejects_wrong_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.arb");
        fs::write(&path, [0u8, 5, b'h', b'e', b'l', b'l', b'o', 0, 0, 0]).unwrap();
        assert!(matches!(
            FileReader::open(&path, registry()),
            Err(FileError::InvalidMagic { found }) if found == "hello"
        ));
    }

    #[test]
    fn rejects_newer_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("future.arb");

        let w = FileWriter::create(&path, registry(), "", b"").unwrap();
        w.close().unwrap();

        let mut f = fs::OpenOptions::new().write(true).open(&path).unwrap();
        f.seek(SeekFrom::Start(OFFSET_VERSION)).unwrap();
        f.write_all(&99i32.to_be_bytes()).unwrap();
        drop(f);

        assert!(matches!(
            FileReader::open(&path, registry()),
            Err(FileError::UnsupportedVersion {
                found: 99,
                supported: _
            })
        ));
    }

    #[test]
    fn rejects_unfinalized_container() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("truncated.arb");

        let mut w = FileWriter::create(&path, registry(), "", b"").unwrap();
        let root: GraphObject = Arc::new(Group::new(vec![Some(shape(None))]));
        w.write_branch_graph(&root, b"").unwrap();
        // Dropped without close: header pointers stay zero.
        drop(w);

        assert!(matches!(
            FileReader::open(&path, registry()),
            Err(FileError::NotFinalized)
        ));
    }

    #[test]
    fn rejects_mismatched_registry() {
        use arbor_codec::{
            CodecResult, PayloadCodec, PendingPayload, ReadContext, TypeRegistry, WriteContext,
        };

        struct NopCodec;
        impl PayloadCodec for NopCodec {
            fn write_payload(
                &self,
                _: &GraphObject,
                _: &mut WriteContext<'_>,
            ) -> CodecResult<()> {
                Ok(())
            }
            fn read_payload(&self, _: &mut ReadContext<'_>) -> CodecResult<PendingPayload> {
                Ok(PendingPayload::new(|_| Ok(Arc::new(()) as GraphObject)))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("other.arb");
        let w = FileWriter::create(&path, registry(), "", b"").unwrap();
        w.close().unwrap();

        let other = TypeRegistry::builder()
            .builtin::<u8>("other.Type", Arc::new(NopCodec))
            .build();
        assert!(FileReader::open(&path, other).is_err());
    }

    #[test]
    fn unknown_graph_id_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.arb");
        let w = FileWriter::create(&path, registry(), "", b"").unwrap();
        w.close().unwrap();

        let mut r = FileReader::open(&path, registry()).unwrap();
        assert!(r.read_branch_graph(BranchGraphId::new(0)).is_err());
    }
}
