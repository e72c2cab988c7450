//! The contract between the engine and per-type payload codecs.
//!
//! A codec sees only its own payload bytes plus the reference primitives
//! the contexts expose. Reading is two-phase: `read_payload` parses fields
//! and returns a deferred constructor; the engine invokes it once every
//! symbol the payload referenced has been materialized, so the closure can
//! resolve child handles bottom-up.

use arbor_types::{GraphObject, SymbolId};

use crate::context::{ReadContext, WriteContext};
use crate::error::{CodecError, CodecResult};

/// Serializes and deserializes the payload of one object type.
pub trait PayloadCodec: Send + Sync {
    /// Emit the payload for `obj`. Child objects go through the context:
    /// inline records for owned children, symbol references for shared
    /// nodes and node-components.
    fn write_payload(&self, obj: &GraphObject, ctx: &mut WriteContext<'_>) -> CodecResult<()>;

    /// Parse the payload and return a deferred constructor for the object.
    fn read_payload(&self, ctx: &mut ReadContext<'_>) -> CodecResult<PendingPayload>;
}

/// A parsed child reference: null, or the symbol of the referenced object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PendingRef {
    Null,
    Symbol(SymbolId),
}

impl PendingRef {
    /// The referenced symbol, if non-null.
    pub fn id(self) -> Option<SymbolId> {
        match self {
            PendingRef::Null => None,
            PendingRef::Symbol(id) => Some(id),
        }
    }
}

/// Resolves parsed references to materialized objects during the build
/// phase. Purely a table lookup: every referenced symbol is materialized
/// before the constructor runs.
pub trait Materializer {
    /// Resolve a reference; `None` for the null reference.
    fn resolve(&mut self, r: PendingRef) -> CodecResult<Option<GraphObject>>;

    /// Resolve a reference that the payload requires to be non-null.
    fn require(&mut self, r: PendingRef) -> CodecResult<GraphObject> {
        self.resolve(r)?.ok_or_else(|| {
            CodecError::Format("null reference where payload requires an object".into())
        })
    }
}

/// Deferred constructor produced by [`PayloadCodec::read_payload`].
pub struct PendingPayload {
    build: Box<dyn FnOnce(&mut dyn Materializer) -> CodecResult<GraphObject> + Send>,
}

impl PendingPayload {
    /// Wrap the constructor closure.
    pub fn new(
        build: impl FnOnce(&mut dyn Materializer) -> CodecResult<GraphObject> + Send + 'static,
    ) -> Self {
        Self {
            build: Box::new(build),
        }
    }

    /// Run the constructor. Consumes the payload.
    pub(crate) fn build(self, m: &mut dyn Materializer) -> CodecResult<GraphObject> {
        (self.build)(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct NullOnly;

    impl Materializer for NullOnly {
        fn resolve(&mut self, r: PendingRef) -> CodecResult<Option<GraphObject>> {
            match r {
                PendingRef::Null => Ok(None),
                PendingRef::Symbol(id) => Err(CodecError::NotLoaded { symbol: id }),
            }
        }
    }

    #[test]
    fn pending_ref_id() {
        assert_eq!(PendingRef::Null.id(), None);
        assert_eq!(
            PendingRef::Symbol(SymbolId::new(3)).id(),
            Some(SymbolId::new(3))
        );
    }

    #[test]
    fn require_rejects_null() {
        let mut m = NullOnly;
        assert!(m.resolve(PendingRef::Null).unwrap().is_none());
        assert!(matches!(
            m.require(PendingRef::Null),
            Err(CodecError::Format(_))
        ));
    }

    #[test]
    fn pending_payload_builds_once() {
        let p = PendingPayload::new(|_| Ok(Arc::new(5u32) as GraphObject));
        let mut m = NullOnly;
        let obj = p.build(&mut m).unwrap();
        assert_eq!(*obj.downcast_ref::<u32>().unwrap(), 5);
    }
}
