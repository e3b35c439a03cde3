use std::mem::size_of;

use glam::Vec3;

use super::Vertex;

/// An indexed triangle list. Vertices are shared by equality.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Mesh {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_triangles(triangles: &[[Vertex; 3]]) -> Self {
        let mut mesh = Mesh::new();
        triangles.iter().for_each(|t| mesh.add_triangle(*t));
        mesh
    }

    /// A unit quad in the XY plane, facing +Z.
    pub fn quad() -> Self {
        let normal = Vec3::Z;
        let vertices = vec![
            Vertex::new(Vec3::new(-0.5, -0.5, 0.0), normal, Vec3::new(1.0, 0.0, 0.0)),
            Vertex::new(Vec3::new(0.5, -0.5, 0.0), normal, Vec3::new(0.0, 1.0, 0.0)),
            Vertex::new(Vec3::new(0.5, 0.5, 0.0), normal, Vec3::new(0.0, 0.0, 1.0)),
            Vertex::new(Vec3::new(-0.5, 0.5, 0.0), normal, Vec3::new(1.0, 1.0, 1.0)),
        ];
        Self {
            vertices,
            indices: vec![0, 1, 2, 2, 3, 0],
        }
    }

    pub fn add_triangle(&mut self, triangle: [Vertex; 3]) {
        for vertex in triangle {
            let index = match self.vertices.iter().position(|v| *v == vertex) {
                Some(index) => index,
                None => {
                    self.vertices.push(vertex);
                    self.vertices.len() - 1
                }
            };
            self.indices.push(index as u32);
        }
    }

    /// Replaces the contents with those of `other`.
    pub fn update_mesh(&mut self, other: &Mesh) {
        self.vertices.clone_from(&other.vertices);
        self.indices.clone_from(&other.indices);
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    pub fn vertex_buffer_size(&self) -> u64 {
        (self.vertices.len() * size_of::<Vertex>()) as u64
    }

    pub fn index_buffer_size(&self) -> u64 {
        (self.indices.len() * size_of::<u32>()) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(x: f32, y: f32) -> Vertex {
        Vertex::new(Vec3::new(x, y, 0.0), Vec3::Z, Vec3::ONE)
    }

    #[test]
    fn test_quad_sizes() {
        let mesh = Mesh::quad();
        assert_eq!(mesh.vertices().len(), 4);
        assert_eq!(mesh.indices().len(), 6);
        assert_eq!(mesh.vertex_buffer_size(), 4 * 36);
        assert_eq!(mesh.index_buffer_size(), 6 * 4);
        assert_eq!(mesh.vertex_bytes().len(), 144);
        assert_eq!(mesh.index_bytes().len(), 24);
    }

    #[test]
    fn test_add_triangle_shares_equal_vertices() {
        let (a, b, c, d) = (vertex(0.0, 0.0), vertex(1.0, 0.0), vertex(1.0, 1.0), vertex(0.0, 1.0));

        let mut mesh = Mesh::new();
        mesh.add_triangle([a, b, c]);
        mesh.add_triangle([c, d, a]);

        assert_eq!(mesh.vertices(), &[a, b, c, d]);
        assert_eq!(mesh.indices(), &[0, 1, 2, 2, 3, 0]);
    }

    #[test]
    fn test_vertices_differing_in_color_are_distinct() {
        let a = vertex(0.0, 0.0);
        let mut red = a;
        red.color = Vec3::X;

        let mesh = Mesh::from_triangles(&[[a, red, a]]);
        assert_eq!(mesh.vertices().len(), 2);
        assert_eq!(mesh.indices(), &[0, 1, 0]);
    }

    #[test]
    fn test_update_mesh_replaces_contents() {
        let mut mesh = Mesh::quad();
        let triangle = Mesh::from_triangles(&[[vertex(0.0, 0.0), vertex(1.0, 0.0), vertex(0.0, 1.0)]]);

        mesh.update_mesh(&triangle);
        assert_eq!(mesh, triangle);
        assert_eq!(mesh.index_buffer_size(), 12);

        mesh.clear();
        assert!(mesh.is_empty());
        assert_eq!(mesh.vertex_buffer_size(), 0);
    }
}
