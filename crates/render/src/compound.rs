//! Rigs of named meshes with parent-relative transforms.
//!
//! `MeshCompound<MeshData>` is the CPU form loaded from an asset; mapping it
//! through a backend upload yields `MeshCompound<MeshId>` for drawing.
//!
//! # Invariants
//! - A node's parent always precedes it, so transforms resolve in one pass.

use crate::geometry::{MeshData, MeshError};
use glam::Mat4;
use std::collections::HashMap;

/// Local transform overrides keyed by node name, produced by an animator.
pub type Pose = HashMap<String, Mat4>;

#[derive(Debug, Clone)]
pub struct CompoundNode<M> {
    pub name: String,
    pub mesh: M,
    /// Transform relative to the parent node (or the compound root).
    pub local: Mat4,
    pub parent: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct MeshCompound<M = MeshData> {
    nodes: Vec<CompoundNode<M>>,
}

impl<M> Default for MeshCompound<M> {
    fn default() -> Self {
        Self { nodes: Vec::new() }
    }
}

impl<M> MeshCompound<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node under `parent` (by name). Returns the node index.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        mesh: M,
        local: Mat4,
        parent: Option<&str>,
    ) -> Result<usize, MeshError> {
        let parent = match parent {
            Some(p) => Some(
                self.index_of(p)
                    .ok_or_else(|| MeshError::UnknownParent(p.to_string()))?,
            ),
            None => None,
        };
        self.nodes.push(CompoundNode {
            name: name.into(),
            mesh,
            local,
            parent,
        });
        Ok(self.nodes.len() - 1)
    }

    pub fn nodes(&self) -> &[CompoundNode<M>] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| n.name == name)
    }

    /// Compound-space transform of every node, with `pose` replacing local
    /// transforms where it has an entry.
    pub fn world_transforms(&self, pose: Option<&Pose>) -> Vec<Mat4> {
        let mut world: Vec<Mat4> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let local = pose
                .and_then(|p| p.get(&node.name))
                .copied()
                .unwrap_or(node.local);
            let parent = node.parent.map_or(Mat4::IDENTITY, |i| world[i]);
            world.push(parent * local);
        }
        world
    }

    /// Convert every node's mesh, keeping names and hierarchy.
    pub fn try_map<N, E>(
        &self,
        mut f: impl FnMut(&M) -> Result<N, E>,
    ) -> Result<MeshCompound<N>, E> {
        let nodes = self
            .nodes
            .iter()
            .map(|n| {
                Ok(CompoundNode {
                    name: n.name.clone(),
                    mesh: f(&n.mesh)?,
                    local: n.local,
                    parent: n.parent,
                })
            })
            .collect::<Result<Vec<_>, E>>()?;
        Ok(MeshCompound { nodes })
    }
}

impl MeshCompound<MeshData> {
    /// Bake every node into one mesh in compound space, for static batching.
    pub fn flatten(&self) -> Result<MeshData, MeshError> {
        let first = self.nodes.first().ok_or(MeshError::EmptyCompound)?;
        let layout = first.mesh.attribute_sizes().to_vec();
        let world = self.world_transforms(None);

        let mut floats = Vec::new();
        let mut vertex_count = 0;
        for (node, model) in self.nodes.iter().zip(&world) {
            if node.mesh.attribute_sizes() != layout.as_slice() {
                return Err(MeshError::LayoutMismatch(node.name.clone()));
            }
            let baked = node.mesh.transformed(model);
            floats.extend_from_slice(baked.floats());
            vertex_count += baked.vertex_count();
        }
        MeshData::new(floats, vertex_count, layout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn rig() -> MeshCompound {
        let mut c = MeshCompound::new();
        c.add_node("body", MeshData::cube(), Mat4::IDENTITY, None).unwrap();
        c.add_node(
            "arm",
            MeshData::cube(),
            Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)),
            Some("body"),
        )
        .unwrap();
        c.add_node(
            "hand",
            MeshData::quad(),
            Mat4::from_translation(Vec3::new(1.0, 0.0, 0.0)),
            Some("arm"),
        )
        .unwrap();
        c
    }

    #[test]
    fn children_inherit_parent_transforms() {
        let c = rig();
        let world = c.world_transforms(None);
        assert_eq!(world[2].transform_point3(Vec3::ZERO), Vec3::new(3.0, 0.0, 0.0));
    }

    #[test]
    fn pose_overrides_local_transform() {
        let c = rig();
        let mut pose = Pose::new();
        pose.insert("arm".into(), Mat4::from_translation(Vec3::new(0.0, 5.0, 0.0)));
        let world = c.world_transforms(Some(&pose));
        assert_eq!(world[2].transform_point3(Vec3::ZERO), Vec3::new(1.0, 5.0, 0.0));
    }

    #[test]
    fn unknown_parent_is_rejected() {
        let mut c: MeshCompound = MeshCompound::new();
        let err = c
            .add_node("orphan", MeshData::quad(), Mat4::IDENTITY, Some("nobody"))
            .unwrap_err();
        assert_eq!(err, MeshError::UnknownParent("nobody".into()));
    }

    #[test]
    fn flatten_requires_shared_layout() {
        let mut c = rig();
        let point = MeshData::new(vec![0.0; 3], 1, vec![3]).unwrap();
        c.add_node("marker", point, Mat4::IDENTITY, Some("hand")).unwrap();
        assert_eq!(c.flatten(), Err(MeshError::LayoutMismatch("marker".into())));
        assert!(rig().flatten().is_ok());
        assert_eq!(
            MeshCompound::<MeshData>::new().flatten(),
            Err(MeshError::EmptyCompound)
        );
    }

    #[test]
    fn flatten_bakes_world_positions() {
        let mut c = MeshCompound::new();
        c.add_node("a", MeshData::cube(), Mat4::IDENTITY, None).unwrap();
        c.add_node(
            "b",
            MeshData::cube(),
            Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0)),
            Some("a"),
        )
        .unwrap();
        let flat = c.flatten().unwrap();
        assert_eq!(flat.vertex_count(), 72);
        let max_x = flat.positions().map(|p| p.x).fold(f32::MIN, f32::max);
        assert_eq!(max_x, 10.5);
    }

    #[test]
    fn try_map_keeps_hierarchy() {
        let c = rig();
        let mapped: MeshCompound<usize> = c
            .try_map(|m| Ok::<_, MeshError>(m.vertex_count()))
            .unwrap();
        assert_eq!(mapped.nodes()[2].mesh, 6);
        assert_eq!(mapped.nodes()[2].parent, Some(1));
    }
}
