//! Distance-based level-of-detail selection.

use crate::handles::MeshId;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LodLevel {
    pub mesh: MeshId,
    /// The level is used while the view distance is below this value.
    pub max_distance: f32,
}

/// Alternative meshes ordered from most to least detailed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LodGroup {
    levels: Vec<LodLevel>,
}

impl LodGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a level. Levels are kept sorted by `max_distance`.
    pub fn with_level(mut self, mesh: MeshId, max_distance: f32) -> Self {
        self.levels.push(LodLevel { mesh, max_distance });
        self.levels
            .sort_by(|a, b| a.max_distance.total_cmp(&b.max_distance));
        self
    }

    pub fn levels(&self) -> &[LodLevel] {
        &self.levels
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Mesh for a view distance. Beyond the last threshold the coarsest mesh
    /// is kept rather than culled.
    pub fn select(&self, distance: f32) -> Option<MeshId> {
        self.levels
            .iter()
            .find(|l| distance < l.max_distance)
            .or(self.levels.last())
            .map(|l| l.mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn selects_by_distance() {
        let mut meshes: SlotMap<MeshId, ()> = SlotMap::with_key();
        let (hi, mid, lo) = (meshes.insert(()), meshes.insert(()), meshes.insert(()));
        let lod = LodGroup::new()
            .with_level(lo, 100.0)
            .with_level(hi, 10.0)
            .with_level(mid, 40.0);

        assert_eq!(lod.select(0.0), Some(hi));
        assert_eq!(lod.select(10.0), Some(mid));
        assert_eq!(lod.select(99.0), Some(lo));
        assert_eq!(lod.select(5000.0), Some(lo));
        assert_eq!(LodGroup::new().select(1.0), None);
    }
}
