//! Procedural line-list meshes: the outlined triangle, the ground grid and the axes gizmo.
//!
//! Every mesh here is meant for `LINE_LIST` topology. Index pairs describe independent
//! segments, no vertex is shared between two segments.

use shared::Vertex;

use crate::error::{Result, SceneError};

pub const WHITE: [f32; 3] = [1.0, 1.0, 1.0];
pub const RED: [f32; 3] = [1.0, 0.0, 0.0];
pub const GREEN: [f32; 3] = [0.0, 1.0, 0.0];
pub const BLUE: [f32; 3] = [0.0, 0.0, 1.0];

/// Upper bound on grid cells per side. Keeps the vertex count well inside `u32`.
pub const MAX_GRID_CELLS: i32 = 100_000;

/// CPU side vertex and index lists.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Resolves each index pair to its two endpoints.
    pub fn segments(&self) -> impl Iterator<Item = (&Vertex, &Vertex)> + '_ {
        self.indices
            .chunks_exact(2)
            .map(|pair| (&self.vertices[pair[0] as usize], &self.vertices[pair[1] as usize]))
    }

    /// Appends one segment with its own two vertices and two sequential indices.
    fn push_segment(&mut self, begin: [f32; 3], end: [f32; 3], color: [f32; 3]) {
        let base = self.vertices.len() as u32;
        self.vertices.push(Vertex::new(begin, color));
        self.vertices.push(Vertex::new(end, color));
        self.indices.extend_from_slice(&[base, base + 1]);
    }
}

/// Outline of a triangle in the z = 0 plane with red, green and blue corners.
pub fn generate_triangle() -> MeshData {
    MeshData {
        vertices: vec![
            Vertex::new([1.0, 1.0, 0.0], RED),
            Vertex::new([-1.0, 1.0, 0.0], GREEN),
            Vertex::new([0.0, -1.0, 0.0], BLUE),
        ],
        indices: vec![0, 1, 1, 2, 2, 0],
    }
}

/// White ground grid in the y = 0 plane, centered at the origin.
///
/// Emits `cell_count + 1` lines parallel to X followed by `cell_count + 1` lines
/// parallel to Z, each spanning `cell_count * cell_size`. With `cell_count == 0`
/// the result is a single cross of two `cell_size` long segments through the origin.
///
/// # Errors
///
/// [`SceneError::InvalidArgument`] when `cell_count` is negative or above
/// [`MAX_GRID_CELLS`], or when `cell_size` is not a positive finite number.
pub fn generate_grid(cell_count: i32, cell_size: f32) -> Result<MeshData> {
    if cell_count < 0 {
        return Err(SceneError::InvalidArgument(format!(
            "grid cell count must not be negative, got {cell_count}"
        )));
    }
    if cell_count > MAX_GRID_CELLS {
        return Err(SceneError::InvalidArgument(format!(
            "grid cell count {cell_count} exceeds the limit of {MAX_GRID_CELLS}"
        )));
    }
    if !cell_size.is_finite() || cell_size <= 0.0 {
        return Err(SceneError::InvalidArgument(format!(
            "grid cell size must be a positive finite number, got {cell_size}"
        )));
    }

    let extent = cell_count as f32 * cell_size;
    let half_extent = extent / 2.0;
    let half_span = if cell_count == 0 {
        cell_size / 2.0
    } else {
        half_extent
    };

    let lines = cell_count as usize + 1;
    let mut mesh = MeshData {
        vertices: Vec::with_capacity(4 * lines),
        indices: Vec::with_capacity(4 * lines),
    };

    for i in 0..lines {
        let z = -half_extent + i as f32 * cell_size;
        mesh.push_segment([-half_span, 0.0, z], [half_span, 0.0, z], WHITE);
    }
    for i in 0..lines {
        let x = -half_extent + i as f32 * cell_size;
        mesh.push_segment([x, 0.0, -half_span], [x, 0.0, half_span], WHITE);
    }

    tracing::debug!(
        "Generated grid: {} cells of {} -> {} vertices",
        cell_count,
        cell_size,
        mesh.vertex_count()
    );
    Ok(mesh)
}

/// Unit X (red), Y (green) and Z (blue) segments starting at the origin.
pub fn generate_axes() -> MeshData {
    let mut mesh = MeshData::default();
    mesh.push_segment([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], RED);
    mesh.push_segment([0.0, 0.0, 0.0], [0.0, 1.0, 0.0], GREEN);
    mesh.push_segment([0.0, 0.0, 0.0], [0.0, 0.0, 1.0], BLUE);
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn length(a: &Vertex, b: &Vertex) -> f32 {
        let d = [b.pos[0] - a.pos[0], b.pos[1] - a.pos[1], b.pos[2] - a.pos[2]];
        (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
    }

    #[test]
    fn grid_counts_follow_cell_count() {
        for (count, size) in [(0, 1.0), (1, 2.0), (3, 0.5), (20, 1.0), (7, 3.25)] {
            let mesh = generate_grid(count, size).unwrap();
            let expected = 4 * (count as usize + 1);
            assert_eq!(mesh.vertex_count(), expected, "cell_count={count}");
            assert_eq!(mesh.index_count(), expected, "cell_count={count}");
        }
    }

    #[test]
    fn grid_indices_are_sequential_pairs() {
        let mesh = generate_grid(4, 1.0).unwrap();
        let expected: Vec<u32> = (0..mesh.vertex_count() as u32).collect();
        assert_eq!(mesh.indices, expected);
    }

    #[test]
    fn grid_segments_span_the_full_extent() {
        let mesh = generate_grid(5, 1.5).unwrap();
        for (a, b) in mesh.segments() {
            assert_relative_eq!(length(a, b), 7.5, epsilon = 1e-5);
            assert_eq!(a.color, WHITE);
            assert_eq!(a.pos[1], 0.0);
            assert_eq!(b.pos[1], 0.0);
        }
    }

    #[test]
    fn grid_with_one_cell_starts_at_the_corner() {
        let mesh = generate_grid(1, 2.0).unwrap();
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.vertices[0].pos, [-1.0, 0.0, -1.0]);
        assert_eq!(mesh.vertices[1].pos, [1.0, 0.0, -1.0]);
        // second X-parallel line sits one cell further along Z
        assert_eq!(mesh.vertices[2].pos, [-1.0, 0.0, 1.0]);
        // first Z-parallel line
        assert_eq!(mesh.vertices[4].pos, [-1.0, 0.0, -1.0]);
        assert_eq!(mesh.vertices[5].pos, [-1.0, 0.0, 1.0]);
    }

    #[test]
    fn grid_is_centered_on_the_origin() {
        let mesh = generate_grid(20, 1.0).unwrap();
        let (mut min, mut max) = ([f32::MAX; 3], [f32::MIN; 3]);
        for v in &mesh.vertices {
            for axis in 0..3 {
                min[axis] = min[axis].min(v.pos[axis]);
                max[axis] = max[axis].max(v.pos[axis]);
            }
        }
        assert_relative_eq!(min[0], -10.0);
        assert_relative_eq!(max[0], 10.0);
        assert_relative_eq!(min[2], -10.0);
        assert_relative_eq!(max[2], 10.0);
    }

    #[test]
    fn zero_cells_is_a_cross_through_the_origin() {
        let mesh = generate_grid(0, 2.0).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        let segments: Vec<_> = mesh.segments().collect();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].0.pos, [-1.0, 0.0, 0.0]);
        assert_eq!(segments[0].1.pos, [1.0, 0.0, 0.0]);
        assert_eq!(segments[1].0.pos, [0.0, 0.0, -1.0]);
        assert_eq!(segments[1].1.pos, [0.0, 0.0, 1.0]);
        for (a, b) in segments {
            assert_relative_eq!(length(a, b), 2.0);
        }
    }

    #[test]
    fn grid_rejects_bad_parameters() {
        assert!(matches!(
            generate_grid(-1, 1.0),
            Err(SceneError::InvalidArgument(_))
        ));
        assert!(matches!(
            generate_grid(MAX_GRID_CELLS + 1, 1.0),
            Err(SceneError::InvalidArgument(_))
        ));
        for size in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            assert!(matches!(
                generate_grid(4, size),
                Err(SceneError::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn axes_are_unit_segments_from_the_origin() {
        let mesh = generate_axes();
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);

        let expected = [([1.0, 0.0, 0.0], RED), ([0.0, 1.0, 0.0], GREEN), ([0.0, 0.0, 1.0], BLUE)];
        for ((a, b), (tip, color)) in mesh.segments().zip(expected) {
            assert_eq!(a.pos, [0.0, 0.0, 0.0]);
            assert_eq!(b.pos, tip);
            assert_eq!(a.color, color);
            assert_eq!(b.color, color);
        }
        assert_eq!(generate_axes(), mesh);
    }

    #[test]
    fn triangle_outline_closes() {
        let mesh = generate_triangle();
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 1, 2, 2, 0]);
        assert_eq!(mesh.segments().count(), 3);
        assert_eq!(mesh.vertices[0].color, RED);
        assert_eq!(mesh.vertices[2].pos, [0.0, -1.0, 0.0]);
    }
}
