//! Static vertex buffers and their instances.
//!
//! # Invariants
//! - A source mesh owns its buffers; instances borrow them and never free them.
//! - A source is only freed once its instance count is zero (enforced by
//!   [`crate::Resources::destroy_mesh`]).

use crate::context::GlContext;
use crate::device::{GlDevice, PrimitiveMode, RawBuffer, RawVertexArray};
use crate::error::GlError;
use stagecraft_render::{BoundingSphere, MeshData, MeshId, ShaderId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GpuBuffers {
    buffer: RawBuffer,
    array: RawVertexArray,
}

#[derive(Debug)]
pub struct MeshStatic {
    buffers: GpuBuffers,
    vertex_count: usize,
    attribute_sizes: Vec<usize>,
    bounds: BoundingSphere,
    default_shader: Option<ShaderId>,
    /// Set on instances: the mesh whose buffers they share.
    source: Option<MeshId>,
    instances: usize,
}

impl MeshStatic {
    /// Upload interleaved vertex data. With `build_tangents` a flat tangent
    /// and bitangent are appended to every vertex first.
    pub fn setup_floats_array<D: GlDevice>(
        gl: &mut GlContext<D>,
        data: &MeshData,
        build_tangents: bool,
    ) -> Result<Self, GlError> {
        let with_tangents;
        let data = if build_tangents {
            with_tangents = data.with_tangents()?;
            &with_tangents
        } else {
            data
        };
        let (buffer, array) = gl
            .create_vertex_buffer(data.floats(), data.attribute_sizes())
            .map_err(GlError::Device)?;
        let bounds = data.bounding_sphere();
        tracing::debug!(
            vertices = data.vertex_count(),
            radius = bounds.radius,
            "mesh uploaded"
        );
        Ok(Self {
            buffers: GpuBuffers { buffer, array },
            vertex_count: data.vertex_count(),
            attribute_sizes: data.attribute_sizes().to_vec(),
            bounds,
            default_shader: None,
            source: None,
            instances: 0,
        })
    }

    /// A mesh sharing these buffers with its own default shader.
    /// `id` is this mesh's handle, recorded as the instance's source.
    pub(crate) fn create_instance(&mut self, id: MeshId) -> MeshStatic {
        self.instances += 1;
        MeshStatic {
            buffers: self.buffers,
            vertex_count: self.vertex_count,
            attribute_sizes: self.attribute_sizes.clone(),
            bounds: self.bounds,
            default_shader: None,
            source: Some(id),
            instances: 0,
        }
    }

    pub(crate) fn instance_released(&mut self) {
        self.instances = self.instances.saturating_sub(1);
    }

    /// Free the GPU buffers. Instances release nothing.
    pub(crate) fn release<D: GlDevice>(self, gl: &mut GlContext<D>) {
        if self.source.is_none() {
            gl.delete_vertex_buffer(self.buffers.buffer, self.buffers.array);
            tracing::debug!(vertices = self.vertex_count, "mesh buffers freed");
        }
    }

    pub fn is_instance(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<MeshId> {
        self.source
    }

    pub fn instance_count(&self) -> usize {
        self.instances
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn attribute_sizes(&self) -> &[usize] {
        &self.attribute_sizes
    }

    pub fn bounds(&self) -> BoundingSphere {
        self.bounds
    }

    pub fn default_shader(&self) -> Option<ShaderId> {
        self.default_shader
    }

    pub fn set_default_shader(&mut self, shader: Option<ShaderId>) {
        self.default_shader = shader;
    }

    pub fn draw<D: GlDevice>(&self, gl: &mut GlContext<D>) {
        gl.draw(self.buffers.array, PrimitiveMode::Triangles, self.vertex_count);
    }
}
