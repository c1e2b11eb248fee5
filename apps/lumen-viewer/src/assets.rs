//! Asset paths and OBJ loading.

use std::path::{Path, PathBuf};

use anyhow::Context;
use lumen_render::{DecodedImage, MeshData, MeshSource};

pub const ASSET_ROOT: &str = "assets";

pub fn shader_path(name: &str) -> PathBuf {
    Path::new(ASSET_ROOT).join("shaders").join(format!("{name}.spv"))
}

pub fn asset_path(relative: &str) -> PathBuf {
    Path::new(ASSET_ROOT).join(relative)
}

/// Load every mesh of an OBJ file, triangulated with one index per vertex.
pub fn load_meshes(path: &Path) -> anyhow::Result<Vec<MeshData>> {
    let options = tobj::LoadOptions {
        triangulate: true,
        single_index: true,
        ..Default::default()
    };
    let (models, _materials) =
        tobj::load_obj(path, &options).with_context(|| format!("Failed to load {}", path.display()))?;

    models
        .iter()
        .map(|model| {
            mesh_source(&model.name, &model.mesh)
                .into_mesh_data()
                .with_context(|| format!("Invalid mesh in {}", path.display()))
        })
        .collect()
}

/// Decode every image in `paths`.
pub fn load_images(paths: &[&str]) -> anyhow::Result<Vec<DecodedImage>> {
    paths
        .iter()
        .map(|relative| DecodedImage::open(asset_path(relative)).map_err(anyhow::Error::from))
        .collect()
}

/// Regroup tobj's flat attribute arrays per vertex.
pub fn mesh_source(name: &str, mesh: &tobj::Mesh) -> MeshSource {
    let positions = triples(&mesh.positions);
    let normals = (!mesh.normals.is_empty()).then(|| triples(&mesh.normals));
    // OBJ vertex colors are RGB.
    let colors = (!mesh.vertex_color.is_empty()).then(|| {
        triples(&mesh.vertex_color)
            .into_iter()
            .map(|[r, g, b]| [r, g, b, 1.0])
            .collect()
    });
    let uv_channels = if mesh.texcoords.is_empty() {
        Vec::new()
    } else {
        vec![mesh
            .texcoords
            .chunks_exact(2)
            .map(|uv| [uv[0], uv[1]])
            .collect()]
    };
    let faces = mesh
        .indices
        .chunks_exact(3)
        .map(|face| [face[0], face[1], face[2]])
        .collect();

    MeshSource {
        name: name.to_string(),
        positions,
        normals,
        colors,
        uv_channels,
        faces,
    }
}

fn triples(values: &[f32]) -> Vec<[f32; 3]> {
    values
        .chunks_exact(3)
        .map(|v| [v[0], v[1], v[2]])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> tobj::Mesh {
        tobj::Mesh {
            positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 0.0],
            indices: vec![0, 1, 2, 2, 3, 0],
            ..Default::default()
        }
    }

    #[test]
    fn positions_and_faces_are_grouped() {
        let source = mesh_source("quad", &quad());
        assert_eq!(source.positions.len(), 4);
        assert_eq!(source.positions[2], [1.0, 1.0, 0.0]);
        assert_eq!(source.faces, vec![[0, 1, 2], [2, 3, 0]]);
        assert!(source.normals.is_none());
        assert!(source.colors.is_none());
        assert!(source.uv_channels.is_empty());
    }

    #[test]
    fn texcoords_become_one_channel() {
        let mut mesh = quad();
        mesh.texcoords = vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
        let data = mesh_source("quad", &mesh).into_mesh_data().unwrap();
        assert_eq!(data.vertices[0].uv, [0.0, 1.0]);
        assert_eq!(data.vertices[2].uv, [1.0, 0.0]);
    }

    #[test]
    fn rgb_colors_get_opaque_alpha() {
        let mut mesh = quad();
        mesh.vertex_color = vec![0.5; 12];
        let source = mesh_source("quad", &mesh);
        assert_eq!(source.colors.unwrap()[3], [0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn obj_file_loads_named_meshes() {
        let dir = std::env::temp_dir().join("lumen-viewer-assets-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("quad.obj");
        std::fs::write(
            &path,
            "o plate\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\nf 1/1 2/2 3/3 4/4\n",
        )
        .unwrap();

        let meshes = load_meshes(&path).unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].name, "plate");
        assert_eq!(meshes[0].indices.len(), 6);
        assert_eq!(meshes[0].vertices.len(), 4);
    }

    #[test]
    fn missing_obj_is_an_error() {
        assert!(load_meshes(Path::new("does/not/exist.obj")).is_err());
    }

    #[test]
    fn shader_paths_live_under_assets() {
        assert_eq!(
            shader_path("model.vert"),
            Path::new("assets").join("shaders").join("model.vert.spv")
        );
    }
}
