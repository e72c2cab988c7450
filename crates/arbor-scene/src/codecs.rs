//! Payload codecs for the scene model, and the builtin registry built from
//! them.
//!
//! The builtin registration order below is the on-disk tag order and must
//! only ever grow by appending.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use arbor_codec::{
    CodecError, CodecResult, PayloadCodec, PendingPayload, ReadContext, TypeRegistry, WriteContext,
};
use arbor_types::GraphObject;

use crate::model::{Appearance, Color, Group, Link, Mesh, Shape, Texture};

fn expect<'a, T: 'static>(obj: &'a GraphObject) -> CodecResult<&'a T> {
    obj.downcast_ref::<T>().ok_or_else(|| {
        CodecError::Payload(format!(
            "object is not a {}",
            std::any::type_name::<T>()
        ))
    })
}

fn encode<T: Serialize>(value: &T, ctx: &mut WriteContext<'_>) -> CodecResult<()> {
    let bytes = bincode::serialize(value).map_err(|e| CodecError::Payload(e.to_string()))?;
    ctx.write_blob(&bytes)
}

fn decode<T: DeserializeOwned>(ctx: &mut ReadContext<'_>) -> CodecResult<T> {
    let bytes = ctx.read_blob()?;
    bincode::deserialize(&bytes).map_err(|e| CodecError::Payload(e.to_string()))
}

struct GroupCodec;

impl PayloadCodec for GroupCodec {
    fn write_payload(&self, obj: &GraphObject, ctx: &mut WriteContext<'_>) -> CodecResult<()> {
        let group = expect::<Group>(obj)?;
        ctx.write_i32(group.children.len() as i32)?;
        for child in &group.children {
            ctx.write_object(child.as_ref())?;
        }
        Ok(())
    }

    fn read_payload(&self, ctx: &mut ReadContext<'_>) -> CodecResult<PendingPayload> {
        let count = ctx.read_i32()?;
        if count < 0 {
            return Err(CodecError::Format(format!("negative child count {count}")));
        }
        let mut children = Vec::with_capacity(count as usize);
        for _ in 0..count {
            children.push(ctx.read_object()?);
        }
        Ok(PendingPayload::new(move |m| {
            let children = children
                .into_iter()
                .map(|r| m.resolve(r))
                .collect::<CodecResult<Vec<_>>>()?;
            Ok(Arc::new(Group { children }) as GraphObject)
        }))
    }
}

struct LinkCodec;

impl PayloadCodec for LinkCodec {
    fn write_payload(&self, obj: &GraphObject, ctx: &mut WriteContext<'_>) -> CodecResult<()> {
        ctx.write_node_ref(expect::<Link>(obj)?.target.as_ref())
    }

    fn read_payload(&self, ctx: &mut ReadContext<'_>) -> CodecResult<PendingPayload> {
        let target = ctx.read_node_ref()?;
        Ok(PendingPayload::new(move |m| {
            Ok(Arc::new(Link {
                target: m.resolve(target)?,
            }) as GraphObject)
        }))
    }
}

struct ShapeCodec;

impl PayloadCodec for ShapeCodec {
    fn write_payload(&self, obj: &GraphObject, ctx: &mut WriteContext<'_>) -> CodecResult<()> {
        let shape = expect::<Shape>(obj)?;
        ctx.write_component_ref(shape.appearance.as_ref())?;
        encode(&shape.mesh, ctx)
    }

    fn read_payload(&self, ctx: &mut ReadContext<'_>) -> CodecResult<PendingPayload> {
        let appearance = ctx.read_component_ref()?;
        let mesh: Mesh = decode(ctx)?;
        Ok(PendingPayload::new(move |m| {
            Ok(Arc::new(Shape {
                appearance: m.resolve(appearance)?,
                mesh,
            }) as GraphObject)
        }))
    }
}

struct AppearanceCodec;

impl PayloadCodec for AppearanceCodec {
    fn write_payload(&self, obj: &GraphObject, ctx: &mut WriteContext<'_>) -> CodecResult<()> {
        let appearance = expect::<Appearance>(obj)?;
        encode(&appearance.color, ctx)?;
        ctx.write_component_ref(appearance.texture.as_ref())
    }

    fn read_payload(&self, ctx: &mut ReadContext<'_>) -> CodecResult<PendingPayload> {
        let color: Color = decode(ctx)?;
        let texture = ctx.read_component_ref()?;
        Ok(PendingPayload::new(move |m| {
            Ok(Arc::new(Appearance {
                color,
                texture: m.resolve(texture)?,
            }) as GraphObject)
        }))
    }
}

struct TextureCodec;

impl PayloadCodec for TextureCodec {
    fn write_payload(&self, obj: &GraphObject, ctx: &mut WriteContext<'_>) -> CodecResult<()> {
        let texture = expect::<Texture>(obj)?;
        ctx.write_u32(texture.width)?;
        ctx.write_u32(texture.height)?;
        ctx.write_blob(&texture.pixels)
    }

    fn read_payload(&self, ctx: &mut ReadContext<'_>) -> CodecResult<PendingPayload> {
        let width = ctx.read_u32()?;
        let height = ctx.read_u32()?;
        let pixels = ctx.read_blob()?;
        Ok(PendingPayload::new(move |_| {
            Texture::new(width, height, pixels)
                .map(|t| Arc::new(t) as GraphObject)
                .map_err(|e| CodecError::Payload(e.to_string()))
        }))
    }
}

/// The scene registry. `arbor.scene.ImageTexture` is a retired name kept
/// readable through a fallback onto the plain texture codec.
pub fn registry() -> Arc<TypeRegistry> {
    TypeRegistry::builder()
        .builtin::<Group>("arbor.scene.Group", Arc::new(GroupCodec))
        .builtin::<Link>("arbor.scene.Link", Arc::new(LinkCodec))
        .builtin::<Shape>("arbor.scene.Shape", Arc::new(ShapeCodec))
        .builtin::<Appearance>("arbor.scene.Appearance", Arc::new(AppearanceCodec))
        .builtin::<Texture>("arbor.scene.Texture", Arc::new(TextureCodec))
        .fallback("arbor.scene.ImageTexture", &["arbor.scene.Texture"])
        .build()
}
