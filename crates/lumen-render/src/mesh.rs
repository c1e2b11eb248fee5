//! Conversion from loader output to GPU-ready vertex and index arrays.
//!
//! Loaders fill a [`MeshSource`] with whatever attributes the file carries;
//! [`MeshSource::into_mesh_data`] applies the defaults the shaders expect.

use crate::error::RenderError;
use crate::vertex::Vertex;

/// Raw mesh attributes as a loader produced them.
#[derive(Debug, Clone, Default)]
pub struct MeshSource {
    pub name: String,
    pub positions: Vec<[f32; 3]>,
    /// Per-vertex normals, if the file has them.
    pub normals: Option<Vec<[f32; 3]>>,
    /// Per-vertex RGBA colors, if the file has them.
    pub colors: Option<Vec<[f32; 4]>>,
    /// One entry per texture coordinate channel.
    pub uv_channels: Vec<Vec<[f32; 2]>>,
    /// Triangulated faces.
    pub faces: Vec<[u32; 3]>,
}

/// Vertices and flattened triangle indices for one mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

fn check_len(mesh: &str, attribute: &'static str, expected: usize, actual: usize) -> Result<(), RenderError> {
    if expected == actual {
        Ok(())
    } else {
        Err(RenderError::AttributeCount {
            mesh: mesh.to_string(),
            attribute,
            expected,
            actual,
        })
    }
}

impl MeshSource {
    /// Build GPU vertices.
    ///
    /// Missing normals are zero, missing colors are opaque white. Texture
    /// coordinates are only used when there is exactly one channel, with V
    /// flipped to `1 - v`; otherwise they are `(0, 0)`.
    pub fn into_mesh_data(self) -> Result<MeshData, RenderError> {
        let count = self.positions.len();
        if let Some(normals) = &self.normals {
            check_len(&self.name, "normals", count, normals.len())?;
        }
        if let Some(colors) = &self.colors {
            check_len(&self.name, "colors", count, colors.len())?;
        }
        let uvs = match self.uv_channels.as_slice() {
            [single] => {
                check_len(&self.name, "uvs", count, single.len())?;
                Some(single)
            }
            _ => None,
        };

        let vertices = self
            .positions
            .iter()
            .enumerate()
            .map(|(i, &position)| {
                let mut vertex = Vertex {
                    position,
                    ..Vertex::default()
                };
                if let Some(normals) = &self.normals {
                    vertex.normal = normals[i];
                }
                if let Some(colors) = &self.colors {
                    vertex.color = colors[i];
                }
                if let Some(uvs) = uvs {
                    let [u, v] = uvs[i];
                    vertex.uv = [u, 1.0 - v];
                }
                vertex
            })
            .collect();

        let indices: Vec<u32> = self.faces.iter().flatten().copied().collect();
        if let Some(&index) = indices.iter().find(|&&index| index as usize >= count) {
            return Err(RenderError::IndexOutOfBounds {
                mesh: self.name,
                index,
                vertex_count: count,
            });
        }

        Ok(MeshData {
            name: self.name,
            vertices,
            indices,
        })
    }
}
