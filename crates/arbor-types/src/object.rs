use std::any::Any;
use std::sync::Arc;

/// Opaque handle to a domain object (node or node-component).
///
/// The engine never interprets the contents; payload codecs downcast to
/// their concrete types. Identity is reference identity: two handles refer
/// to the same object exactly when they share an allocation.
pub type GraphObject = Arc<dyn Any + Send + Sync>;

/// Hashable identity key for a [`GraphObject`].
///
/// Derived from the allocation address. Stable only while some handle to
/// the allocation is alive; the symbol table retains a handle for every
/// live symbol, so keys in the table never go stale.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectKey(usize);

/// Compute the identity key for an object handle.
pub fn object_key(obj: &GraphObject) -> ObjectKey {
    ObjectKey(Arc::as_ptr(obj) as *const () as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_identity() {
        let a: GraphObject = Arc::new(42u32);
        let b = a.clone();
        assert_eq!(object_key(&a), object_key(&b));
    }

    #[test]
    fn distinct_objects_differ() {
        let a: GraphObject = Arc::new(42u32);
        let b: GraphObject = Arc::new(42u32);
        assert_ne!(object_key(&a), object_key(&b));
    }

    #[test]
    fn downcast_roundtrip() {
        let a: GraphObject = Arc::new(String::from("leaf"));
        assert_eq!(a.downcast_ref::<String>().unwrap(), "leaf");
        assert!(a.downcast_ref::<u32>().is_none());
    }
}
