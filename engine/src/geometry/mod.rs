mod mesh;
mod vertex;

pub use mesh::Mesh;
pub use vertex::Vertex;
