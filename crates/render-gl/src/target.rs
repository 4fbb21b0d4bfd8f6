//! Deferred render target: G-buffer, lighting accumulation, shadow map and
//! the displayable result.
//!
//! # Invariants
//! - Construction either allocates every image and framebuffer or frees what
//!   it made and returns an error.
//! - G-buffer and lighting images are `supersampling` times the display size;
//!   the result image is always display-sized.
//! - The lighting framebuffer shares the G-buffer depth image, so forward
//!   draws into it depth-test against opaque geometry.

use crate::context::GlContext;
use crate::device::{
    GlDevice, RawFramebuffer, RawTexture, TextureDesc, TextureFilter, TextureFormat,
};
use crate::error::TargetError;
use crate::texture::Texture;
use glam::Vec4;
use stagecraft_common::RenderSettings;

#[derive(Debug, Clone, Copy)]
struct Images {
    albedo: Texture,
    normal: Texture,
    position: Texture,
    emission: Texture,
    depth: Texture,
    lightning: Texture,
    shadow: Texture,
    result: Texture,
}

#[derive(Debug, Clone, Copy)]
struct Framebuffers {
    gbuffer: RawFramebuffer,
    lightning: RawFramebuffer,
    shadow: RawFramebuffer,
    result: RawFramebuffer,
}

#[derive(Debug)]
pub struct RenderTarget {
    width: u32,
    height: u32,
    supersampling: u32,
    shadow_size: u32,
    images: Images,
    framebuffers: Framebuffers,
}

/// Tracks what has been allocated so a failed build can free it.
struct Allocation<'a, D: GlDevice> {
    gl: &'a mut GlContext<D>,
    textures: Vec<Texture>,
    framebuffers: Vec<RawFramebuffer>,
}

impl<D: GlDevice> Allocation<'_, D> {
    fn image(&mut self, image: &'static str, desc: TextureDesc) -> Result<Texture, TargetError> {
        let texture = Texture::create(self.gl, desc, None).map_err(|e| TargetError::Allocation {
            image,
            reason: e.to_string(),
        })?;
        self.textures.push(texture);
        Ok(texture)
    }

    fn framebuffer(
        &mut self,
        framebuffer: &'static str,
        colors: &[RawTexture],
        depth: Option<RawTexture>,
    ) -> Result<RawFramebuffer, TargetError> {
        let fbo = self
            .gl
            .create_framebuffer(colors, depth)
            .map_err(|reason| TargetError::Incomplete {
                framebuffer,
                reason,
            })?;
        self.framebuffers.push(fbo);
        Ok(fbo)
    }

    fn rollback(self) {
        for fbo in self.framebuffers {
            self.gl.delete_framebuffer(fbo);
        }
        for texture in self.textures {
            texture.destroy(self.gl);
        }
    }
}

fn build<D: GlDevice>(
    alloc: &mut Allocation<'_, D>,
    (width, height): (u32, u32),
    (display_w, display_h): (u32, u32),
    shadow_size: u32,
) -> Result<(Images, Framebuffers), TargetError> {
    let gbuffer = |format| {
        TextureDesc::new(width, height, format)
            .filter(TextureFilter::Nearest)
            .clamped()
    };
    let albedo = alloc.image("gAlbedoSpec", gbuffer(TextureFormat::Rgba8))?;
    let normal = alloc.image("gNormal", gbuffer(TextureFormat::Rgba16F))?;
    let position = alloc.image("gPosition", gbuffer(TextureFormat::Rgba16F))?;
    let emission = alloc.image("gEmission", gbuffer(TextureFormat::Rgba16F))?;
    let depth = alloc.image("depth", gbuffer(TextureFormat::Depth32F))?;
    // Linear so a supersampled buffer filters down when composited.
    let lightning = alloc.image(
        "lightningTexture",
        TextureDesc::new(width, height, TextureFormat::Rgba16F).clamped(),
    )?;
    let shadow = alloc.image(
        "shadowTexture",
        TextureDesc::new(shadow_size, shadow_size, TextureFormat::Depth32F)
            .filter(TextureFilter::Nearest)
            .clamped(),
    )?;
    let result = alloc.image(
        "resultTexture",
        TextureDesc::new(display_w, display_h, TextureFormat::Rgba8).clamped(),
    )?;
    let images = Images {
        albedo,
        normal,
        position,
        emission,
        depth,
        lightning,
        shadow,
        result,
    };

    let framebuffers = Framebuffers {
        gbuffer: alloc.framebuffer(
            "gbuffer",
            &[albedo.raw(), normal.raw(), position.raw(), emission.raw()],
            Some(depth.raw()),
        )?,
        lightning: alloc.framebuffer("lightning", &[lightning.raw()], Some(depth.raw()))?,
        shadow: alloc.framebuffer("shadow", &[], Some(shadow.raw()))?,
        result: alloc.framebuffer("result", &[result.raw()], None)?,
    };
    Ok((images, framebuffers))
}

impl RenderTarget {
    pub fn new<D: GlDevice>(
        gl: &mut GlContext<D>,
        width: u32,
        height: u32,
        settings: &RenderSettings,
    ) -> Result<Self, TargetError> {
        let supersampling = settings.supersampling.clamp(1, RenderSettings::MAX_SUPERSAMPLING);
        let shadow_size = settings.quality.shadow_map_size();
        if width == 0 || height == 0 {
            return Err(TargetError::ZeroSize { width, height });
        }
        let _span = tracing::debug_span!("render_target", width, height, supersampling).entered();

        let mut alloc = Allocation {
            gl,
            textures: Vec::new(),
            framebuffers: Vec::new(),
        };
        let render = (width * supersampling, height * supersampling);
        let built = build(&mut alloc, render, (width, height), shadow_size);
        match built {
            Ok((images, framebuffers)) => {
                tracing::debug!(shadow_size, "render target created");
                Ok(Self {
                    width,
                    height,
                    supersampling,
                    shadow_size,
                    images,
                    framebuffers,
                })
            }
            Err(err) => {
                tracing::error!(%err, "render target allocation failed");
                alloc.rollback();
                Err(err)
            }
        }
    }

    /// Recreate every image at a new display size.
    pub fn resize<D: GlDevice>(
        &mut self,
        gl: &mut GlContext<D>,
        width: u32,
        height: u32,
        settings: &RenderSettings,
    ) -> Result<(), TargetError> {
        let fresh = RenderTarget::new(gl, width, height, settings)?;
        let old = std::mem::replace(self, fresh);
        old.destroy(gl);
        Ok(())
    }

    pub fn destroy<D: GlDevice>(self, gl: &mut GlContext<D>) {
        let f = self.framebuffers;
        for fbo in [f.gbuffer, f.lightning, f.shadow, f.result] {
            gl.delete_framebuffer(fbo);
        }
        let i = self.images;
        for t in [
            i.albedo, i.normal, i.position, i.emission, i.depth, i.lightning, i.shadow, i.result,
        ] {
            t.destroy(gl);
        }
    }

    /// Bind the G-buffer at render resolution.
    pub fn setup_new_frame<D: GlDevice>(&self, gl: &mut GlContext<D>, clear: bool) {
        gl.bind_framebuffer(Some(self.framebuffers.gbuffer));
        let (w, h) = self.render_size();
        gl.viewport(w, h);
        if clear {
            gl.clear(Some(Vec4::ZERO), true);
        }
    }

    /// Bind the lighting accumulation buffer. Clearing touches color only;
    /// the shared depth stays intact.
    pub fn setup_lightning<D: GlDevice>(&self, gl: &mut GlContext<D>, clear: bool) {
        gl.bind_framebuffer(Some(self.framebuffers.lightning));
        let (w, h) = self.render_size();
        gl.viewport(w, h);
        if clear {
            gl.clear(Some(Vec4::new(0.0, 0.0, 0.0, 1.0)), false);
        }
    }

    /// Bind the depth-only shadow framebuffer at shadow map resolution.
    pub fn setup_shadow<D: GlDevice>(&self, gl: &mut GlContext<D>, clear: bool) {
        gl.bind_framebuffer(Some(self.framebuffers.shadow));
        gl.viewport(self.shadow_size, self.shadow_size);
        if clear {
            gl.clear(None, true);
        }
    }

    /// Bind the result framebuffer at display resolution.
    pub fn use_result_buffer<D: GlDevice>(&self, gl: &mut GlContext<D>) {
        gl.bind_framebuffer(Some(self.framebuffers.result));
        gl.viewport(self.width, self.height);
    }

    pub fn display_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn render_size(&self) -> (u32, u32) {
        (self.width * self.supersampling, self.height * self.supersampling)
    }

    pub fn supersampling(&self) -> u32 {
        self.supersampling
    }

    pub fn shadow_map_size(&self) -> u32 {
        self.shadow_size
    }

    /// G-buffer images in output order: albedo, normal, position, emission.
    pub fn gbuffer_textures(&self) -> [RawTexture; 4] {
        let i = &self.images;
        [
            i.albedo.raw(),
            i.normal.raw(),
            i.position.raw(),
            i.emission.raw(),
        ]
    }

    pub fn lightning_texture(&self) -> &Texture {
        &self.images.lightning
    }

    pub fn shadow_texture(&self) -> &Texture {
        &self.images.shadow
    }

    /// The gamma-corrected image, for presenting or sampling downstream.
    pub fn result_texture(&self) -> &Texture {
        &self.images.result
    }

    pub fn result_framebuffer(&self) -> RawFramebuffer {
        self.framebuffers.result
    }
}
