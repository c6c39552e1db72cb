use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use std::mem::size_of;
use std::ops::{Index, IndexMut};

#[repr(C)]
#[derive(Clone, Debug, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    pub const fn new(pos: [f32; 3], color: [f32; 3]) -> Self {
        Self { pos, color }
    }

    pub fn get_binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(0)
            .stride(size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    pub fn get_attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription::default()
                .location(0)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(memoffset::offset_of!(Vertex, pos) as u32),
            vk::VertexInputAttributeDescription::default()
                .location(1)
                .binding(0)
                .format(vk::Format::R32G32B32_SFLOAT)
                .offset(memoffset::offset_of!(Vertex, color) as u32),
        ]
    }
}

/// Per-drawable transform block, bound at set 0 / binding 0 of the vertex stage.
#[repr(C)]
#[derive(Clone, Debug, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub projection: Mat4,
    pub model: Mat4,
    pub view: Mat4,
}

impl Default for UniformBufferObject {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            model: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
        }
    }
}

/// The independently rendered objects. Each owns its geometry and uniform data,
/// all of them share one pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DrawableKind {
    Triangle,
    Grid,
    Axes,
}

impl DrawableKind {
    /// Every drawable, in draw order.
    pub const ALL: [DrawableKind; 3] = [DrawableKind::Triangle, DrawableKind::Grid, DrawableKind::Axes];

    pub const fn index(self) -> usize {
        match self {
            DrawableKind::Triangle => 0,
            DrawableKind::Grid => 1,
            DrawableKind::Axes => 2,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            DrawableKind::Triangle => "triangle",
            DrawableKind::Grid => "grid",
            DrawableKind::Axes => "axes",
        }
    }
}

/// One value per [`DrawableKind`], indexed by kind.
#[derive(Clone, Debug, PartialEq)]
pub struct PerDrawable<T>([T; 3]);

impl<T> PerDrawable<T> {
    /// Builds the collection by calling `f` once per kind, in draw order.
    pub fn from_fn(mut f: impl FnMut(DrawableKind) -> T) -> Self {
        Self(DrawableKind::ALL.map(|kind| f(kind)))
    }

    /// Fallible variant of [`PerDrawable::from_fn`]. Stops at the first error.
    pub fn try_from_fn<E>(mut f: impl FnMut(DrawableKind) -> Result<T, E>) -> Result<Self, E> {
        let triangle = f(DrawableKind::Triangle)?;
        let grid = f(DrawableKind::Grid)?;
        let axes = f(DrawableKind::Axes)?;
        Ok(Self([triangle, grid, axes]))
    }

    pub fn iter(&self) -> impl Iterator<Item = (DrawableKind, &T)> {
        DrawableKind::ALL.into_iter().zip(self.0.iter())
    }
}

impl<T: Clone> PerDrawable<T> {
    /// Same value for every drawable.
    pub fn splat(value: T) -> Self {
        Self([value.clone(), value.clone(), value])
    }
}

impl<T> Index<DrawableKind> for PerDrawable<T> {
    type Output = T;

    fn index(&self, kind: DrawableKind) -> &T {
        &self.0[kind.index()]
    }
}

impl<T> IndexMut<DrawableKind> for PerDrawable<T> {
    fn index_mut(&mut self, kind: DrawableKind) -> &mut T {
        &mut self.0[kind.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_attributes() {
        assert_eq!(size_of::<Vertex>(), 24);
        let attrs = Vertex::get_attribute_descriptions();
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 12);
        assert_eq!(Vertex::get_binding_description().stride, 24);
    }

    #[test]
    fn uniform_block_is_three_matrices() {
        assert_eq!(size_of::<UniformBufferObject>(), 3 * 64);
        let ubo = UniformBufferObject::default();
        assert_eq!(bytemuck::bytes_of(&ubo).len(), 192);
    }

    #[test]
    fn per_drawable_follows_draw_order() {
        let names = PerDrawable::from_fn(DrawableKind::name);
        let order: Vec<_> = names.iter().map(|(_, n)| *n).collect();
        assert_eq!(order, ["triangle", "grid", "axes"]);
        assert_eq!(names[DrawableKind::Axes], "axes");
    }

    #[test]
    fn try_from_fn_stops_on_first_error() {
        let mut calls = 0;
        let result: Result<PerDrawable<u32>, &str> = PerDrawable::try_from_fn(|kind| {
            calls += 1;
            if kind == DrawableKind::Grid {
                Err("grid failed")
            } else {
                Ok(1)
            }
        });
        assert_eq!(result, Err("grid failed"));
        assert_eq!(calls, 2);
    }
}
