//! A small scene-graph object model: groups own their children, links
//! reference shared subtrees by symbol, shapes and appearances reference
//! shared components. Value-only fields are plain serde structs.

use serde::{Deserialize, Serialize};

use arbor_types::GraphObject;

use crate::error::{SceneError, SceneResult};

/// Interior node owning an ordered list of children. Children are written
/// inline in the owning graph's record.
pub struct Group {
    pub children: Vec<Option<GraphObject>>,
}

impl Group {
    pub fn new(children: Vec<Option<GraphObject>>) -> Self {
        Self { children }
    }
}

/// Reference to a shared subtree rooted elsewhere, by symbol rather than
/// by inline record. The target may live in another branch graph.
pub struct Link {
    pub target: Option<GraphObject>,
}

/// Leaf node pairing a mesh with a shared appearance component.
pub struct Shape {
    pub appearance: Option<GraphObject>,
    pub mesh: Mesh,
}

/// Shared render-state component; may itself reference a shared texture.
pub struct Appearance {
    pub color: Color,
    pub texture: Option<GraphObject>,
}

/// Shared image component.
pub struct Texture {
    pub width: u32,
    pub height: u32,
    /// RGBA8, row-major.
    pub pixels: Vec<u8>,
}

impl Texture {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> SceneResult<Self> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(SceneError::Invalid(format!(
                "{width}x{height} RGBA texture needs {expected} bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const WHITE: Color = Color {
        r: 1.0,
        g: 1.0,
        b: 1.0,
        a: 1.0,
    };
}

/// Borrow a model struct back out of an engine handle.
pub fn as_scene<T: 'static>(obj: &GraphObject) -> Option<&T> {
    obj.downcast_ref::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn texture_size_is_validated() {
        assert!(Texture::new(2, 2, vec![0; 16]).is_ok());
        assert!(matches!(
            Texture::new(2, 2, vec![0; 15]),
            Err(SceneError::Invalid(_))
        ));
    }

    #[test]
    fn as_scene_downcasts() {
        use std::sync::Arc;
        let obj: GraphObject = Arc::new(Link { target: None });
        assert!(as_scene::<Link>(&obj).is_some());
        assert!(as_scene::<Group>(&obj).is_none());
    }
}
