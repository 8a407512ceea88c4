//! Triangle mesh container and Wavefront OBJ loading

use crate::{Error, Result};
use glam::Vec3;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A simple indexed triangle mesh
#[derive(Debug, Clone, Default)]
pub struct TriMesh {
    /// Vertices as a flat array of [x, y, z] coordinates
    pub vertices: Vec<f32>,
    /// Triangle indices, 3 per triangle
    pub indices: Vec<i32>,
}

impl TriMesh {
    /// Creates a new empty triangle mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices in the mesh
    pub fn vert_count(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Number of triangles in the mesh
    pub fn tri_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Returns the vertex at `index`
    pub fn vertex(&self, index: usize) -> Vec3 {
        Vec3::new(
            self.vertices[index * 3],
            self.vertices[index * 3 + 1],
            self.vertices[index * 3 + 2],
        )
    }

    /// Loads a mesh from an OBJ file
    pub fn from_obj<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut mesh = Self::new();
        for line in reader.lines() {
            mesh.parse_obj_line(&line?)?;
        }
        Ok(mesh)
    }

    /// Parses OBJ content already held in memory
    pub fn from_obj_str(content: &str) -> Result<Self> {
        let mut mesh = Self::new();
        for line in content.lines() {
            mesh.parse_obj_line(line)?;
        }
        Ok(mesh)
    }

    fn parse_obj_line(&mut self, line: &str) -> Result<()> {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => {
                for _ in 0..3 {
                    let value = tokens
                        .next()
                        .ok_or_else(|| {
                            Error::InvalidInput("vertex with fewer than 3 coordinates".to_string())
                        })?
                        .parse::<f32>()
                        .map_err(|_| {
                            Error::InvalidInput("vertex coordinate is not a number".to_string())
                        })?;
                    self.vertices.push(value);
                }
            }
            Some("f") => {
                // Faces may reference v, v/vt, v/vt/vn or v//vn; only the
                // position index matters here. Fan-triangulate polygons.
                let mut face = Vec::with_capacity(4);
                for token in tokens {
                    let position = token.split('/').next().unwrap_or(token);
                    let idx = position.parse::<i64>().map_err(|_| {
                        Error::InvalidInput("face index is not a number".to_string())
                    })?;
                    let vert_count = self.vertices.len() as i64 / 3;
                    // OBJ indices are 1-based; negative indices count from the end
                    let resolved = if idx < 0 { vert_count + idx } else { idx - 1 };
                    if resolved < 0 || resolved >= vert_count {
                        return Err(Error::InvalidInput(format!(
                            "face index {} out of range",
                            idx
                        )));
                    }
                    face.push(resolved as i32);
                }
                if face.len() < 3 {
                    return Err(Error::InvalidInput(
                        "face with fewer than 3 vertices".to_string(),
                    ));
                }
                for i in 2..face.len() {
                    self.indices.push(face[0]);
                    self.indices.push(face[i - 1]);
                    self.indices.push(face[i]);
                }
            }
            // Comments, normals, texture coordinates, groups: ignored
            _ => {}
        }
        Ok(())
    }

    /// Computes the mesh bounding box
    pub fn calculate_bounds(&self) -> (Vec3, Vec3) {
        crate::calc_bounds(&self.vertices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_obj_str_simple_triangle() {
        let content = "v 0 0 0\nv 1 0 0\nv 0.5 1 0\nf 1 2 3\n";
        let mesh = TriMesh::from_obj_str(content).unwrap();
        assert_eq!(mesh.vert_count(), 3);
        assert_eq!(mesh.tri_count(), 1);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_from_obj_str_quad_triangulation() {
        let content = "v 0 0 0\nv 1 0 0\nv 1 0 1\nv 0 0 1\nf 1 2 3 4\n";
        let mesh = TriMesh::from_obj_str(content).unwrap();
        assert_eq!(mesh.tri_count(), 2);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 2, 3]);
    }

    #[test]
    fn test_from_obj_str_face_with_normals() {
        let content = "v 0 0 0\nv 1 0 0\nv 0.5 1 0\nvn 0 1 0\nf 1//1 2//1 3//1\n";
        let mesh = TriMesh::from_obj_str(content).unwrap();
        assert_eq!(mesh.tri_count(), 1);
    }

    #[test]
    fn test_from_obj_str_negative_indices() {
        let content = "v 0 0 0\nv 1 0 0\nv 0.5 1 0\nf -3 -2 -1\n";
        let mesh = TriMesh::from_obj_str(content).unwrap();
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_from_obj_str_bad_face_index() {
        let content = "v 0 0 0\nv 1 0 0\nf 1 2 9\n";
        assert!(TriMesh::from_obj_str(content).is_err());
    }

    #[test]
    fn test_from_obj_str_skips_comments() {
        let content = "# a comment\nv 0 0 0\nv 1 0 0\nv 0.5 1 0\ng group\nf 1 2 3\n";
        let mesh = TriMesh::from_obj_str(content).unwrap();
        assert_eq!(mesh.tri_count(), 1);
    }
}
