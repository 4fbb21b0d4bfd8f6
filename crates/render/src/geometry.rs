//! CPU-side vertex data: layout, bounding volumes, tangent frames.
//!
//! Vertex data is a flat, interleaved `f32` array. Attribute 0 is always the
//! position (3 floats). Attribute 1, when it has 3 floats, is the normal. The
//! first 2-float attribute is the texture coordinate.

use glam::{Mat3, Mat4, Vec2, Vec3};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MeshError {
    #[error("vertex layout has no attributes")]
    EmptyLayout,
    #[error("position attribute must have 3 floats, got {0}")]
    PositionSize(usize),
    #[error("expected {expected} floats for the layout, got {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("vertex layout has no texture coordinates")]
    NoTexCoords,
    #[error("{0} vertices do not form whole triangles")]
    NotTriangles(usize),
    #[error("node `{0}` has a different vertex layout")]
    LayoutMismatch(String),
    #[error("unknown parent node `{0}`")]
    UnknownParent(String),
    #[error("compound has no nodes")]
    EmptyCompound,
}

/// Smallest-ish sphere around a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoundingSphere {
    pub center: Vec3,
    pub radius: f32,
}

impl BoundingSphere {
    /// Ritter-style approximation: seed from the bounding box's diagonal,
    /// then grow toward every point still outside by half the overshoot.
    pub fn from_points(points: &[Vec3]) -> Self {
        let Some(&first) = points.first() else {
            return Self::default();
        };
        let (min, max) = points
            .iter()
            .fold((first, first), |(lo, hi), &p| (lo.min(p), hi.max(p)));

        let mut center = (min + max) * 0.5;
        let mut radius = (max - min).length() * 0.5;

        for &p in points {
            let distance = p.distance(center);
            if distance > radius {
                let grown = (radius + distance) * 0.5;
                center += (p - center) * ((grown - radius) / distance);
                radius = grown;
            }
        }
        Self { center, radius }
    }

    pub fn contains(&self, point: Vec3, epsilon: f32) -> bool {
        point.distance(self.center) <= self.radius + epsilon
    }

    /// Sphere enclosing this one after `model` is applied.
    pub fn transformed(&self, model: &Mat4) -> Self {
        let (scale, _, _) = model.to_scale_rotation_translation();
        Self {
            center: model.transform_point3(self.center),
            radius: self.radius * scale.abs().max_element(),
        }
    }
}

/// Interleaved vertex data with its attribute layout.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshData {
    floats: Vec<f32>,
    vertex_count: usize,
    attribute_sizes: Vec<usize>,
}

impl MeshData {
    pub fn new(
        floats: Vec<f32>,
        vertex_count: usize,
        attribute_sizes: Vec<usize>,
    ) -> Result<Self, MeshError> {
        match attribute_sizes.first() {
            None => return Err(MeshError::EmptyLayout),
            Some(&3) => {}
            Some(&other) => return Err(MeshError::PositionSize(other)),
        }
        let stride: usize = attribute_sizes.iter().sum();
        let expected = stride * vertex_count;
        if floats.len() != expected {
            return Err(MeshError::LengthMismatch {
                expected,
                got: floats.len(),
            });
        }
        Ok(Self {
            floats,
            vertex_count,
            attribute_sizes,
        })
    }

    pub fn floats(&self) -> &[f32] {
        &self.floats
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn attribute_sizes(&self) -> &[usize] {
        &self.attribute_sizes
    }

    /// Floats per vertex.
    pub fn stride(&self) -> usize {
        self.attribute_sizes.iter().sum()
    }

    /// Float offset of attribute `index` inside a vertex.
    pub fn attribute_offset(&self, index: usize) -> usize {
        self.attribute_sizes[..index].iter().sum()
    }

    fn vertex(&self, i: usize) -> &[f32] {
        let stride = self.stride();
        &self.floats[i * stride..(i + 1) * stride]
    }

    pub fn position(&self, i: usize) -> Vec3 {
        Vec3::from_slice(&self.vertex(i)[..3])
    }

    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        (0..self.vertex_count).map(|i| self.position(i))
    }

    fn normal_attribute(&self) -> Option<usize> {
        (self.attribute_sizes.get(1) == Some(&3)).then_some(1)
    }

    fn uv_attribute(&self) -> Option<usize> {
        self.attribute_sizes.iter().position(|&s| s == 2)
    }

    pub fn normal(&self, i: usize) -> Option<Vec3> {
        let offset = self.attribute_offset(self.normal_attribute()?);
        Some(Vec3::from_slice(&self.vertex(i)[offset..offset + 3]))
    }

    pub fn bounding_sphere(&self) -> BoundingSphere {
        let points: Vec<Vec3> = self.positions().collect();
        BoundingSphere::from_points(&points)
    }

    /// Append a flat tangent and bitangent (3 floats each) to every vertex.
    ///
    /// Vertices are read as a triangle list; all three corners of a triangle
    /// share the basis computed from that triangle alone.
    pub fn with_tangents(&self) -> Result<MeshData, MeshError> {
        let uv_index = self.uv_attribute().ok_or(MeshError::NoTexCoords)?;
        if self.vertex_count % 3 != 0 {
            return Err(MeshError::NotTriangles(self.vertex_count));
        }
        let uv_offset = self.attribute_offset(uv_index);
        let uv = |i: usize| Vec2::from_slice(&self.vertex(i)[uv_offset..uv_offset + 2]);

        let stride = self.stride();
        let mut floats = Vec::with_capacity((stride + 6) * self.vertex_count);
        for tri in 0..self.vertex_count / 3 {
            let [a, b, c] = [tri * 3, tri * 3 + 1, tri * 3 + 2];
            let (tangent, bitangent) = triangle_basis(
                [self.position(a), self.position(b), self.position(c)],
                [uv(a), uv(b), uv(c)],
            );
            for i in [a, b, c] {
                floats.extend_from_slice(self.vertex(i));
                floats.extend_from_slice(&tangent.to_array());
                floats.extend_from_slice(&bitangent.to_array());
            }
        }

        let mut attribute_sizes = self.attribute_sizes.clone();
        attribute_sizes.extend([3, 3]);
        MeshData::new(floats, self.vertex_count, attribute_sizes)
    }

    /// Per-vertex normal segments in world space, for debug drawing.
    pub fn normal_lines(&self, model: &Mat4, length: f32) -> Vec<[Vec3; 2]> {
        if self.normal_attribute().is_none() {
            return Vec::new();
        }
        let normal_matrix = Mat3::from_mat4(*model).inverse().transpose();
        (0..self.vertex_count)
            .filter_map(|i| {
                let n = self.normal(i)?;
                let p = model.transform_point3(self.position(i));
                let n = (normal_matrix * n).try_normalize()?;
                Some([p, p + n * length])
            })
            .collect()
    }

    /// Copy with every position transformed by `model` and normals by its
    /// inverse transpose.
    pub fn transformed(&self, model: &Mat4) -> MeshData {
        let stride = self.stride();
        let normal_offset = self.normal_attribute().map(|i| self.attribute_offset(i));
        let normal_matrix = Mat3::from_mat4(*model).inverse().transpose();
        let mut floats = self.floats.clone();
        for vertex in floats.chunks_exact_mut(stride) {
            let p = model.transform_point3(Vec3::from_slice(&vertex[..3]));
            vertex[..3].copy_from_slice(&p.to_array());
            if let Some(o) = normal_offset {
                let n = normal_matrix * Vec3::from_slice(&vertex[o..o + 3]);
                vertex[o..o + 3].copy_from_slice(&n.normalize_or_zero().to_array());
            }
        }
        Self {
            floats,
            vertex_count: self.vertex_count,
            attribute_sizes: self.attribute_sizes.clone(),
        }
    }

    /// Unit quad in the XY plane facing +Z, layout `[3, 3, 2]`.
    pub fn quad() -> MeshData {
        let p = 0.5_f32;
        #[rustfmt::skip]
        let floats = vec![
            -p, -p, 0.0,  0.0, 0.0, 1.0,  0.0, 0.0,
             p, -p, 0.0,  0.0, 0.0, 1.0,  1.0, 0.0,
             p,  p, 0.0,  0.0, 0.0, 1.0,  1.0, 1.0,
             p,  p, 0.0,  0.0, 0.0, 1.0,  1.0, 1.0,
            -p,  p, 0.0,  0.0, 0.0, 1.0,  0.0, 1.0,
            -p, -p, 0.0,  0.0, 0.0, 1.0,  0.0, 0.0,
        ];
        Self {
            floats,
            vertex_count: 6,
            attribute_sizes: vec![3, 3, 2],
        }
    }

    /// Unit cube centred at the origin, layout `[3, 3, 2]`, outward faces.
    pub fn cube() -> MeshData {
        // (normal, u axis, v axis) per face
        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        ];
        let corners = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)];
        let mut floats = Vec::with_capacity(36 * 8);
        for (normal, u, v) in faces {
            for (s, t) in corners {
                let p = normal * 0.5 + u * (s - 0.5) + v * (t - 0.5);
                floats.extend_from_slice(&p.to_array());
                floats.extend_from_slice(&normal.to_array());
                floats.extend_from_slice(&[s, t]);
            }
        }
        Self {
            floats,
            vertex_count: 36,
            attribute_sizes: vec![3, 3, 2],
        }
    }

    /// Full-screen triangle pair in clip space, layout `[3, 3, 2]`.
    pub fn screen_quad() -> MeshData {
        let mut quad = Self::quad();
        for vertex in quad.floats.chunks_exact_mut(8) {
            vertex[0] *= 2.0;
            vertex[1] *= 2.0;
        }
        quad
    }

    /// Reverse the winding of every triangle so the inside faces are front faces.
    pub fn inverted(&self) -> MeshData {
        let stride = self.stride();
        let mut floats = self.floats.clone();
        for tri in floats.chunks_exact_mut(stride * 3) {
            let (first, rest) = tri.split_at_mut(stride);
            first.swap_with_slice(&mut rest[..stride]);
        }
        if let Some(o) = self.normal_attribute().map(|i| self.attribute_offset(i)) {
            for vertex in floats.chunks_exact_mut(stride) {
                for n in &mut vertex[o..o + 3] {
                    *n = -*n;
                }
            }
        }
        Self {
            floats,
            vertex_count: self.vertex_count,
            attribute_sizes: self.attribute_sizes.clone(),
        }
    }
}

fn triangle_basis(p: [Vec3; 3], uv: [Vec2; 3]) -> (Vec3, Vec3) {
    let e1 = p[1] - p[0];
    let e2 = p[2] - p[0];
    let d1 = uv[1] - uv[0];
    let d2 = uv[2] - uv[0];
    let det = d1.x * d2.y - d2.x * d1.y;
    if det.abs() <= f32::EPSILON {
        return (Vec3::X, Vec3::Y);
    }
    let f = 1.0 / det;
    let tangent = (e1 * d2.y - e2 * d1.y) * f;
    let bitangent = (e2 * d1.x - e1 * d2.x) * f;
    (
        tangent.try_normalize().unwrap_or(Vec3::X),
        bitangent.try_normalize().unwrap_or(Vec3::Y),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn points_only(points: &[Vec3]) -> MeshData {
        let floats = points.iter().flat_map(|p| p.to_array()).collect();
        MeshData::new(floats, points.len(), vec![3]).unwrap()
    }

    #[test]
    fn layout_is_validated() {
        assert_eq!(MeshData::new(vec![], 0, vec![]), Err(MeshError::EmptyLayout));
        assert_eq!(
            MeshData::new(vec![0.0; 4], 1, vec![2, 2]),
            Err(MeshError::PositionSize(2))
        );
        assert_eq!(
            MeshData::new(vec![0.0; 7], 1, vec![3, 3]),
            Err(MeshError::LengthMismatch {
                expected: 6,
                got: 7
            })
        );
    }

    #[test]
    fn sphere_contains_cube_corners() {
        let cube = MeshData::cube();
        let sphere = cube.bounding_sphere();
        for p in cube.positions() {
            assert!(sphere.contains(p, 1e-4), "{p} outside {sphere:?}");
        }
        assert_abs_diff_eq!(sphere.center, Vec3::ZERO, epsilon = 1e-4);
        assert_abs_diff_eq!(sphere.radius, 3f32.sqrt() * 0.5, epsilon = 1e-4);
    }

    #[test]
    fn sphere_contains_random_clouds() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let n = rng.gen_range(1..200);
            let points: Vec<Vec3> = (0..n)
                .map(|_| {
                    Vec3::new(
                        rng.gen_range(-50.0..50.0),
                        rng.gen_range(-5.0..5.0),
                        rng.gen_range(-500.0..500.0),
                    )
                })
                .collect();
            let sphere = points_only(&points).bounding_sphere();
            for p in &points {
                assert!(sphere.contains(*p, sphere.radius * 1e-5 + 1e-4));
            }
        }
    }

    #[test]
    fn sphere_of_single_point_has_zero_radius() {
        let s = BoundingSphere::from_points(&[Vec3::new(1.0, 2.0, 3.0)]);
        assert_eq!(s.center, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(s.radius, 0.0);
    }

    #[test]
    fn tangents_are_flat_per_triangle() {
        let quad = MeshData::quad().with_tangents().unwrap();
        assert_eq!(quad.attribute_sizes(), &[3, 3, 2, 3, 3]);
        assert_eq!(quad.stride(), 14);
        let t_offset = quad.attribute_offset(3);
        for i in 0..quad.vertex_count() {
            let v = &quad.floats()[i * 14..(i + 1) * 14];
            let tangent = Vec3::from_slice(&v[t_offset..t_offset + 3]);
            let bitangent = Vec3::from_slice(&v[t_offset + 3..t_offset + 6]);
            assert_abs_diff_eq!(tangent, Vec3::X, epsilon = 1e-5);
            assert_abs_diff_eq!(bitangent, Vec3::Y, epsilon = 1e-5);
        }
    }

    #[test]
    fn tangents_need_uvs_and_triangles() {
        let no_uv = points_only(&[Vec3::ZERO, Vec3::X, Vec3::Y]);
        assert_eq!(no_uv.with_tangents(), Err(MeshError::NoTexCoords));

        let two = MeshData::new(vec![0.0; 10], 2, vec![3, 2]).unwrap();
        assert_eq!(two.with_tangents(), Err(MeshError::NotTriangles(2)));
    }

    #[test]
    fn normal_lines_follow_model_rotation() {
        let quad = MeshData::quad();
        let model = Mat4::from_rotation_x(-std::f32::consts::FRAC_PI_2);
        let lines = quad.normal_lines(&model, 2.0);
        assert_eq!(lines.len(), 6);
        for [a, b] in lines {
            assert_abs_diff_eq!(b - a, Vec3::new(0.0, 2.0, 0.0), epsilon = 1e-5);
        }
    }

    #[test]
    fn inverted_cube_points_normals_inward() {
        let cube = MeshData::cube().inverted();
        for i in 0..cube.vertex_count() {
            let n = cube.normal(i).unwrap();
            assert!(n.dot(cube.position(i)) < 0.0);
        }
    }

    #[test]
    fn transformed_sphere_scales_radius() {
        let s = BoundingSphere {
            center: Vec3::ZERO,
            radius: 1.0,
        };
        let t = s.transformed(&Mat4::from_scale_rotation_translation(
            Vec3::new(1.0, 3.0, 2.0),
            glam::Quat::IDENTITY,
            Vec3::X,
        ));
        assert_eq!(t.center, Vec3::X);
        assert_abs_diff_eq!(t.radius, 3.0, epsilon = 1e-5);
    }
}
