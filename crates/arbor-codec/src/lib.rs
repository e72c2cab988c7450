//! Record framing, type registry, and codec dispatch for the Arbor graph
//! container.
//!
//! Backends hand this crate a positional stream; it frames object records
//! (type tag, symbol id, payload), keeps the symbol table current, queues
//! shared components into trailing batches, and on read parses records
//! into deferred constructors that are materialized bottom-up.

pub mod context;
pub mod controller;
pub mod error;
pub mod payload;
pub mod registry;

pub use context::{ReadContext, WriteContext};
pub use controller::Controller;
pub use error::{CodecError, CodecResult};
pub use payload::{Materializer, PayloadCodec, PendingPayload, PendingRef};
pub use registry::{FallbackRule, TypeRegistry, TypeRegistryBuilder, WireTag};
