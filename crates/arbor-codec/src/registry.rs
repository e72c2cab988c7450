//! The closed, versioned type registry.
//!
//! Built-in types form a fixed, ordered list; an object of builtin type
//! `i` is tagged on disk as `i + 1`, so changing the order breaks every
//! existing container and must never happen silently. The list is
//! persisted at close and verified on open. Extra types registered
//! outside the builtin list are tagged `0` plus their explicit name.
//! Fallback rules are a prioritized list checked in declared order, never
//! inferred.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use arbor_stream::{InputStream, OutputStream, ReadExt, WriteExt};
use arbor_types::GraphObject;

use crate::error::{CodecError, CodecResult};
use crate::payload::PayloadCodec;

/// How an object's type is tagged in its record.
#[derive(Clone, Debug)]
pub enum WireTag {
    /// Builtin type at the given list index; written as `index + 1`.
    Builtin(usize),
    /// Extra type; written as `0` followed by the explicit name.
    Named(String),
}

struct Registered {
    name: String,
    codec: Arc<dyn PayloadCodec>,
}

#[derive(Clone, Copy)]
enum Slot {
    Builtin(usize),
    Extra(usize),
}

/// Prioritized substitution for a type name missing at load time.
#[derive(Clone, Debug)]
pub struct FallbackRule {
    /// The type name that failed to resolve.
    pub missing: String,
    /// Substitute names, tried in declared order.
    pub substitutes: Vec<String>,
}

/// Closed mapping from type tags to payload codecs.
pub struct TypeRegistry {
    builtin: Vec<Registered>,
    extra: Vec<Registered>,
    by_type: HashMap<TypeId, Slot>,
    by_name: HashMap<String, Slot>,
    fallbacks: Vec<FallbackRule>,
}

impl TypeRegistry {
    pub fn builder() -> TypeRegistryBuilder {
        TypeRegistryBuilder::default()
    }

    /// Locate the wire tag and codec for an object about to be written.
    pub fn for_object(&self, obj: &GraphObject) -> CodecResult<(WireTag, Arc<dyn PayloadCodec>)> {
        let type_id = obj.as_ref().type_id();
        match self.by_type.get(&type_id) {
            Some(&Slot::Builtin(i)) => {
                Ok((WireTag::Builtin(i), self.builtin[i].codec.clone()))
            }
            Some(&Slot::Extra(i)) => Ok((
                WireTag::Named(self.extra[i].name.clone()),
                self.extra[i].codec.clone(),
            )),
            None => Err(CodecError::MissingCodec {
                name: format!("{type_id:?}"),
            }),
        }
    }

    /// Codec for a builtin tag index read from a record.
    pub fn for_index(&self, index: usize) -> CodecResult<Arc<dyn PayloadCodec>> {
        self.builtin
            .get(index)
            .map(|r| r.codec.clone())
            .ok_or_else(|| {
                CodecError::Format(format!(
                    "builtin type index {index} out of range ({} registered)",
                    self.builtin.len()
                ))
            })
    }

    /// Codec for an explicit type name read from a record, applying the
    /// fallback rules in declared order when the name does not resolve.
    pub fn for_name(&self, name: &str) -> CodecResult<Arc<dyn PayloadCodec>> {
        if let Some(codec) = self.lookup_name(name) {
            return Ok(codec);
        }
        for rule in &self.fallbacks {
            if rule.missing != name {
                continue;
            }
            for substitute in &rule.substitutes {
                if let Some(codec) = self.lookup_name(substitute) {
                    warn!(missing = name, substitute, "substituting payload codec");
                    return Ok(codec);
                }
            }
        }
        Err(CodecError::MissingCodec {
            name: name.to_string(),
        })
    }

    fn lookup_name(&self, name: &str) -> Option<Arc<dyn PayloadCodec>> {
        self.by_name.get(name).map(|slot| match *slot {
            Slot::Builtin(i) => self.builtin[i].codec.clone(),
            Slot::Extra(i) => self.extra[i].codec.clone(),
        })
    }

    /// Number of builtin types.
    pub fn builtin_len(&self) -> usize {
        self.builtin.len()
    }

    /// Persist the ordered builtin name list.
    pub fn write_registry(&self, out: &mut dyn OutputStream) -> CodecResult<()> {
        out.write_i32(self.builtin.len() as i32)?;
        for reg in &self.builtin {
            out.write_utf(&reg.name)?;
        }
        Ok(())
    }

    /// Verify a persisted builtin name list against this registry.
    ///
    /// The stored list must be a prefix of the current one: builtin
    /// registries may only grow by appending.
    pub fn check_registry(&self, input: &mut dyn InputStream) -> CodecResult<()> {
        let count = input.read_i32()?;
        if count < 0 {
            return Err(CodecError::Format(format!("negative registry count {count}")));
        }
        if count as usize > self.builtin.len() {
            return Err(CodecError::Format(format!(
                "container registers {count} builtin types, reader knows {}",
                self.builtin.len()
            )));
        }
        for i in 0..count as usize {
            let stored = input.read_utf()?;
            if stored != self.builtin[i].name {
                return Err(CodecError::Format(format!(
                    "builtin type {i} is `{stored}` in the container but `{}` in the reader registry",
                    self.builtin[i].name
                )));
            }
        }
        Ok(())
    }
}

/// Builder for [`TypeRegistry`]. Registration order of builtins is the
/// on-disk tag order.
#[derive(Default)]
pub struct TypeRegistryBuilder {
    builtin: Vec<(TypeId, Registered)>,
    extra: Vec<(TypeId, Registered)>,
    fallbacks: Vec<FallbackRule>,
}

impl TypeRegistryBuilder {
    /// Append a builtin type to the closed list.
    pub fn builtin<T: Any>(mut self, name: &str, codec: Arc<dyn PayloadCodec>) -> Self {
        self.builtin.push((
            TypeId::of::<T>(),
            Registered {
                name: name.to_string(),
                codec,
            },
        ));
        self
    }

    /// Register an extra type, written by explicit name.
    pub fn extra<T: Any>(mut self, name: &str, codec: Arc<dyn PayloadCodec>) -> Self {
        self.extra.push((
            TypeId::of::<T>(),
            Registered {
                name: name.to_string(),
                codec,
            },
        ));
        self
    }

    /// Declare a fallback: when `missing` cannot be resolved at load time,
    /// try `substitutes` in order.
    pub fn fallback(mut self, missing: &str, substitutes: &[&str]) -> Self {
        self.fallbacks.push(FallbackRule {
            missing: missing.to_string(),
            substitutes: substitutes.iter().map(|s| s.to_string()).collect(),
        });
        self
    }

    pub fn build(self) -> Arc<TypeRegistry> {
        let mut by_type = HashMap::new();
        let mut by_name = HashMap::new();
        let mut builtin = Vec::with_capacity(self.builtin.len());
        let mut extra = Vec::with_capacity(self.extra.len());

        for (i, (type_id, reg)) in self.builtin.into_iter().enumerate() {
            by_type.insert(type_id, Slot::Builtin(i));
            by_name.insert(reg.name.clone(), Slot::Builtin(i));
            builtin.push(reg);
        }
        for (i, (type_id, reg)) in self.extra.into_iter().enumerate() {
            by_type.insert(type_id, Slot::Extra(i));
            by_name.insert(reg.name.clone(), Slot::Extra(i));
            extra.push(reg);
        }

        Arc::new(TypeRegistry {
            builtin,
            extra,
            by_type,
            by_name,
            fallbacks: self.fallbacks,
        })
    }
}
