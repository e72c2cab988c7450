//! Reference object model for the Arbor graph container.
//!
//! The engine itself is model-agnostic; this crate supplies a small,
//! complete scene-graph vocabulary plus the payload codecs and builtin
//! registry the container backends are exercised with.

pub mod codecs;
pub mod error;
pub mod model;

pub use codecs::registry;
pub use error::{SceneError, SceneResult};
pub use model::{as_scene, Appearance, Color, Group, Link, Mesh, Shape, Texture};
