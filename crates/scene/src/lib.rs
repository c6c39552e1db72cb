mod camera;
mod error;
mod geometry;

pub use camera::{aspect_ratio, OrbitCamera, MAX_ZOOM_DISTANCE, MIN_ZOOM_DISTANCE};
pub use error::{Result, SceneError};
pub use geometry::{generate_axes, generate_grid, generate_triangle, MeshData, MAX_GRID_CELLS};

use std::sync::Arc;

use resource_manager::{Geometry, ResourceManager};
use shared::{DrawableKind, PerDrawable};

/// Parameters of the ground grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridParams {
    pub cell_count: i32,
    pub cell_size: f32,
}

impl Default for GridParams {
    fn default() -> Self {
        Self {
            cell_count: 20,
            cell_size: 1.0,
        }
    }
}

/// The drawables' CPU-side meshes plus the camera looking at them.
pub struct Scene {
    meshes: PerDrawable<MeshData>,
    pub camera: OrbitCamera,
}

impl Scene {
    /// Generates the triangle, grid and axes meshes.
    pub fn new(grid: GridParams) -> Result<Self> {
        let grid_mesh = generate_grid(grid.cell_count, grid.cell_size)?;
        let mut meshes = PerDrawable::splat(MeshData::default());
        meshes[DrawableKind::Triangle] = generate_triangle();
        meshes[DrawableKind::Grid] = grid_mesh;
        meshes[DrawableKind::Axes] = generate_axes();

        for (kind, mesh) in meshes.iter() {
            tracing::debug!(
                "{}: {} vertices, {} indices",
                kind.name(),
                mesh.vertex_count(),
                mesh.index_count()
            );
        }

        Ok(Self {
            meshes,
            camera: OrbitCamera::default(),
        })
    }

    pub fn mesh(&self, kind: DrawableKind) -> &MeshData {
        &self.meshes[kind]
    }

    /// Uploads every mesh into its own device-local [`Geometry`].
    pub fn upload(&self, resource_manager: &Arc<ResourceManager>) -> Result<PerDrawable<Geometry>> {
        let geometry = PerDrawable::try_from_fn(|kind| {
            let mesh = &self.meshes[kind];
            Geometry::new(
                Arc::clone(resource_manager),
                kind,
                &mesh.vertices,
                &mesh.indices,
            )
        })?;
        tracing::info!("Scene geometry uploaded.");
        Ok(geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_holds_one_mesh_per_drawable() {
        let scene = Scene::new(GridParams {
            cell_count: 2,
            cell_size: 1.0,
        })
        .unwrap();
        assert_eq!(scene.mesh(DrawableKind::Triangle).vertex_count(), 3);
        assert_eq!(scene.mesh(DrawableKind::Grid).vertex_count(), 12);
        assert_eq!(scene.mesh(DrawableKind::Axes).vertex_count(), 6);
    }

    #[test]
    fn invalid_grid_fails_scene_creation() {
        let result = Scene::new(GridParams {
            cell_count: -3,
            cell_size: 1.0,
        });
        assert!(matches!(result, Err(SceneError::InvalidArgument(_))));
    }
}
