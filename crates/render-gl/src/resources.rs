//! Registry of every GPU resource, keyed by the handles render elements carry.
//!
//! Asset paths map to handles so each asset is uploaded once per context.
//!
//! # Invariants
//! - A handle stays valid until its resource is explicitly destroyed.
//! - A source mesh cannot be destroyed while it has live instances.

use crate::context::GlContext;
use crate::device::GlDevice;
use crate::error::GlError;
use crate::mesh::MeshStatic;
use crate::shader::{Shader, ShaderKind};
use crate::texture::Texture;
use slotmap::SlotMap;
use stagecraft_render::{
    MeshCompound, MeshData, MeshId, ParamType, ShaderId, ShaderParameter, TextureId,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Resources {
    shaders: SlotMap<ShaderId, Shader>,
    meshes: SlotMap<MeshId, MeshStatic>,
    textures: SlotMap<TextureId, Texture>,
    shader_paths: HashMap<String, ShaderId>,
    mesh_paths: HashMap<String, MeshId>,
    texture_paths: HashMap<String, TextureId>,
    white: Option<TextureId>,
}

impl Resources {
    pub fn new() -> Self {
        Self::default()
    }

    // --- Shaders ---

    /// Build and register a shader. A shader that fails to build is still
    /// registered, as not-ready.
    pub fn add_shader<D: GlDevice>(
        &mut self,
        gl: &mut GlContext<D>,
        mut shader: Shader,
    ) -> ShaderId {
        shader.build(gl);
        self.shaders.insert(shader)
    }

    pub fn shader(&self, id: ShaderId) -> Option<&Shader> {
        self.shaders.get(id)
    }

    pub fn is_ready(&self, id: ShaderId) -> bool {
        self.shaders.get(id).is_some_and(Shader::is_ready)
    }

    /// Load both stages from disk, once per pair of paths.
    pub fn shader_from_files<D: GlDevice>(
        &mut self,
        gl: &mut GlContext<D>,
        kind: ShaderKind,
        vertex: &Path,
        fragment: &Path,
    ) -> Result<ShaderId, GlError> {
        let key = format!("{}|{}", vertex.display(), fragment.display());
        if let Some(&id) = self.shader_paths.get(&key) {
            return Ok(id);
        }
        let shader = Shader::from_files(key.clone(), kind, vertex, fragment)?;
        let id = self.add_shader(gl, shader);
        self.shader_paths.insert(key, id);
        Ok(id)
    }

    pub fn shader_by_path(&self, vertex: &Path, fragment: &Path) -> Option<ShaderId> {
        let key = format!("{}|{}", vertex.display(), fragment.display());
        self.shader_paths.get(&key).copied()
    }

    /// Create a parameter, resolving its uniform location now.
    pub fn create_parameter<D: GlDevice>(
        &self,
        gl: &mut GlContext<D>,
        shader: ShaderId,
        name: &str,
        ty: ParamType,
    ) -> Result<Arc<ShaderParameter>, GlError> {
        let s = self.shaders.get(shader).ok_or(GlError::UnknownShader)?;
        let location = match s.program() {
            Some(program) => gl.device_mut().uniform_location(program, name),
            None => None,
        };
        if location.is_none() {
            tracing::warn!(
                shader = %s.name(),
                parameter = name,
                "uniform not found, parameter is inert"
            );
        }
        Ok(Arc::new(ShaderParameter::new(name, ty, shader, location)))
    }

    pub fn destroy_shader<D: GlDevice>(
        &mut self,
        gl: &mut GlContext<D>,
        id: ShaderId,
    ) -> Result<(), GlError> {
        let mut shader = self.shaders.remove(id).ok_or(GlError::UnknownShader)?;
        shader.destroy(gl);
        self.shader_paths.retain(|_, v| *v != id);
        Ok(())
    }

    pub fn shader_count(&self) -> usize {
        self.shaders.len()
    }

    pub fn shaders(&self) -> impl Iterator<Item = (ShaderId, &Shader)> {
        self.shaders.iter()
    }

    // --- Textures ---

    pub fn add_texture(&mut self, texture: Texture) -> TextureId {
        self.textures.insert(texture)
    }

    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id)
    }

    /// The shared 1x1 white texture, created on first use.
    pub fn white_texture<D: GlDevice>(
        &mut self,
        gl: &mut GlContext<D>,
    ) -> Result<TextureId, GlError> {
        if let Some(id) = self.white.filter(|id| self.textures.contains_key(*id)) {
            return Ok(id);
        }
        let id = self.add_texture(Texture::white(gl)?);
        self.white = Some(id);
        Ok(id)
    }

    pub fn texture_by_path(&self, path: &str) -> Option<TextureId> {
        self.texture_paths.get(path).copied()
    }

    /// Cached texture for `path`, loading it with `load` on a miss.
    pub fn texture_or_insert_with<D: GlDevice>(
        &mut self,
        gl: &mut GlContext<D>,
        path: &str,
        load: impl FnOnce(&mut GlContext<D>) -> Result<Texture, GlError>,
    ) -> Result<TextureId, GlError> {
        if let Some(id) = self.texture_by_path(path) {
            return Ok(id);
        }
        let id = self.add_texture(load(gl)?);
        self.texture_paths.insert(path.to_string(), id);
        Ok(id)
    }

    pub fn destroy_texture<D: GlDevice>(
        &mut self,
        gl: &mut GlContext<D>,
        id: TextureId,
    ) -> Result<(), GlError> {
        let texture = self.textures.remove(id).ok_or(GlError::UnknownTexture)?;
        texture.destroy(gl);
        self.texture_paths.retain(|_, v| *v != id);
        Ok(())
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    // --- Meshes ---

    pub fn create_mesh<D: GlDevice>(
        &mut self,
        gl: &mut GlContext<D>,
        data: &MeshData,
        build_tangents: bool,
    ) -> Result<MeshId, GlError> {
        let mesh = MeshStatic::setup_floats_array(gl, data, build_tangents)?;
        Ok(self.meshes.insert(mesh))
    }

    /// Share the buffers of `source` under a new handle.
    pub fn create_mesh_instance(&mut self, source: MeshId) -> Result<MeshId, GlError> {
        // Instances of instances share the original source.
        let mesh = self.meshes.get(source).ok_or(GlError::UnknownMesh)?;
        let root = mesh.source().unwrap_or(source);
        let instance = self
            .meshes
            .get_mut(root)
            .ok_or(GlError::UnknownMesh)?
            .create_instance(root);
        Ok(self.meshes.insert(instance))
    }

    pub fn mesh(&self, id: MeshId) -> Option<&MeshStatic> {
        self.meshes.get(id)
    }

    pub fn mesh_mut(&mut self, id: MeshId) -> Option<&mut MeshStatic> {
        self.meshes.get_mut(id)
    }

    /// Destroy a mesh. A source with live instances is refused.
    pub fn destroy_mesh<D: GlDevice>(
        &mut self,
        gl: &mut GlContext<D>,
        id: MeshId,
    ) -> Result<(), GlError> {
        let mesh = self.meshes.get(id).ok_or(GlError::UnknownMesh)?;
        if mesh.instance_count() > 0 {
            return Err(GlError::InstancesAlive(mesh.instance_count()));
        }
        let Some(mesh) = self.meshes.remove(id) else {
            return Err(GlError::UnknownMesh);
        };
        if let Some(source) = mesh.source().and_then(|s| self.meshes.get_mut(s)) {
            source.instance_released();
        }
        mesh.release(gl);
        self.mesh_paths.retain(|_, v| *v != id);
        Ok(())
    }

    pub fn mesh_by_path(&self, path: &str) -> Option<MeshId> {
        self.mesh_paths.get(path).copied()
    }

    /// Cached mesh for `path`, building the vertex data with `load` on a miss.
    pub fn mesh_or_insert_with<D: GlDevice>(
        &mut self,
        gl: &mut GlContext<D>,
        path: &str,
        build_tangents: bool,
        load: impl FnOnce() -> Result<MeshData, GlError>,
    ) -> Result<MeshId, GlError> {
        if let Some(id) = self.mesh_by_path(path) {
            return Ok(id);
        }
        let id = self.create_mesh(gl, &load()?, build_tangents)?;
        self.mesh_paths.insert(path.to_string(), id);
        Ok(id)
    }

    /// Upload every node of a rig, keeping its hierarchy.
    pub fn upload_compound<D: GlDevice>(
        &mut self,
        gl: &mut GlContext<D>,
        compound: &MeshCompound<MeshData>,
        build_tangents: bool,
    ) -> Result<MeshCompound<MeshId>, GlError> {
        compound.try_map(|data| self.create_mesh(gl, data, build_tangents))
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Destroy everything, instances before their sources.
    pub fn clear<D: GlDevice>(&mut self, gl: &mut GlContext<D>) {
        let (instances, sources): (Vec<_>, Vec<_>) = self
            .meshes
            .iter()
            .map(|(id, m)| (id, m.is_instance()))
            .partition(|(_, instance)| *instance);
        for (id, _) in instances.into_iter().chain(sources) {
            if let Err(err) = self.destroy_mesh(gl, id) {
                tracing::warn!(%err, "mesh left alive while clearing resources");
            }
        }
        for (_, mut shader) in self.shaders.drain() {
            shader.destroy(gl);
        }
        for (_, texture) in self.textures.drain() {
            texture.destroy(gl);
        }
        self.shader_paths.clear();
        self.texture_paths.clear();
        self.mesh_paths.clear();
        self.white = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{HeadlessDevice, ResourceKind};
    use crate::glsl;

    fn setup() -> (GlContext<HeadlessDevice>, Resources) {
        (GlContext::new(HeadlessDevice::new()), Resources::new())
    }

    #[test]
    fn instance_shares_buffers_with_source() {
        let (mut gl, mut res) = setup();
        let source = res.create_mesh(&mut gl, &MeshData::cube(), false).unwrap();
        let instance = res.create_mesh_instance(source).unwrap();
        let nested = res.create_mesh_instance(instance).unwrap();
        assert_eq!(gl.device().live(ResourceKind::Buffer), 1);
        assert_eq!(res.mesh(source).unwrap().instance_count(), 2);
        assert_eq!(res.mesh(nested).unwrap().source(), Some(source));

        // The source outlives its instances.
        let err = res.destroy_mesh(&mut gl, source).unwrap_err();
        assert!(matches!(err, GlError::InstancesAlive(2)));

        res.destroy_mesh(&mut gl, instance).unwrap();
        res.destroy_mesh(&mut gl, nested).unwrap();
        assert_eq!(gl.device().live(ResourceKind::Buffer), 1);
        assert_eq!(gl.device().live(ResourceKind::VertexArray), 1);

        res.destroy_mesh(&mut gl, source).unwrap();
        assert_eq!(gl.device().live(ResourceKind::Buffer), 0);
        assert_eq!(gl.device().live(ResourceKind::VertexArray), 0);
        assert!(matches!(
            res.destroy_mesh(&mut gl, source),
            Err(GlError::UnknownMesh)
        ));
    }

    #[test]
    fn instances_keep_their_own_default_shader() {
        let (mut gl, mut res) = setup();
        let shader = res.add_shader(&mut gl, Shader::phong("a", glsl::PHONG_FRAGMENT));
        let source = res.create_mesh(&mut gl, &MeshData::quad(), false).unwrap();
        let instance = res.create_mesh_instance(source).unwrap();
        res.mesh_mut(instance).unwrap().set_default_shader(Some(shader));
        assert_eq!(res.mesh(source).unwrap().default_shader(), None);
        assert_eq!(res.mesh(instance).unwrap().default_shader(), Some(shader));
    }

    #[test]
    fn tangents_extend_the_layout() {
        let (mut gl, mut res) = setup();
        let id = res.create_mesh(&mut gl, &MeshData::quad(), true).unwrap();
        assert_eq!(res.mesh(id).unwrap().attribute_sizes(), &[3, 3, 2, 3, 3]);
    }

    #[test]
    fn path_cache_loads_once() {
        let (mut gl, mut res) = setup();
        let mut loads = 0;
        for _ in 0..3 {
            res.mesh_or_insert_with(&mut gl, "meshes/cube", false, || {
                loads += 1;
                Ok(MeshData::cube())
            })
            .unwrap();
        }
        assert_eq!(loads, 1);
        assert_eq!(res.mesh_count(), 1);

        let t = res
            .texture_or_insert_with(&mut gl, "textures/white", Texture::white)
            .unwrap();
        assert_eq!(res.texture_by_path("textures/white"), Some(t));
        res.destroy_texture(&mut gl, t).unwrap();
        assert_eq!(res.texture_by_path("textures/white"), None);
    }

    #[test]
    fn parameters_resolve_locations_at_creation() {
        let (mut gl, mut res) = setup();
        let shader = res.add_shader(&mut gl, Shader::phong("a", glsl::PHONG_FRAGMENT));
        let p = res
            .create_parameter(&mut gl, shader, "uRoughness", ParamType::Float)
            .unwrap();
        assert!(p.location().is_some());
        let missing = res
            .create_parameter(&mut gl, shader, "uNope", ParamType::Float)
            .unwrap();
        assert!(missing.location().is_none());
    }

    #[test]
    fn clear_frees_everything() {
        let (mut gl, mut res) = setup();
        let source = res.create_mesh(&mut gl, &MeshData::cube(), false).unwrap();
        res.create_mesh_instance(source).unwrap();
        res.add_shader(&mut gl, Shader::from_source(&glsl::COMPOSITE));
        res.white_texture(&mut gl).unwrap();
        res.clear(&mut gl);
        for kind in [
            ResourceKind::Buffer,
            ResourceKind::Program,
            ResourceKind::Texture,
        ] {
            assert_eq!(gl.device().live(kind), 0, "{kind:?}");
        }
    }
}
