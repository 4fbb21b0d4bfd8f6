use crate::context::GlContext;
use crate::device::{GlDevice, RawTexture, TexelData, TextureDesc, TextureFormat};
use crate::error::GlError;

/// A 2D image on the GPU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Texture {
    raw: RawTexture,
    desc: TextureDesc,
}

impl Texture {
    /// Allocate with optional initial data; `data` must cover every texel.
    pub fn create<D: GlDevice>(
        gl: &mut GlContext<D>,
        desc: TextureDesc,
        data: Option<TexelData<'_>>,
    ) -> Result<Self, GlError> {
        if let Some(data) = data {
            let expected = desc.texel_count() * desc.format.channels();
            if data.len() != expected {
                return Err(GlError::TextureSize {
                    expected,
                    got: data.len(),
                });
            }
        }
        let raw = gl.create_texture(&desc, data).map_err(GlError::Device)?;
        tracing::debug!(
            width = desc.width,
            height = desc.height,
            format = ?desc.format,
            "texture created"
        );
        Ok(Self { raw, desc })
    }

    pub fn rgba8<D: GlDevice>(
        gl: &mut GlContext<D>,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> Result<Self, GlError> {
        let desc = TextureDesc::new(width, height, TextureFormat::Rgba8);
        Self::create(gl, desc, Some(TexelData::U8(pixels)))
    }

    /// Half-float RGBA image from linear float data, for HDR environments.
    pub fn hdr<D: GlDevice>(
        gl: &mut GlContext<D>,
        width: u32,
        height: u32,
        pixels: &[f32],
    ) -> Result<Self, GlError> {
        let desc = TextureDesc::new(width, height, TextureFormat::Rgba16F);
        Self::create(gl, desc, Some(TexelData::F32(pixels)))
    }

    /// 1x1 opaque white, bound when a draw has no texture.
    pub fn white<D: GlDevice>(gl: &mut GlContext<D>) -> Result<Self, GlError> {
        Self::rgba8(gl, 1, 1, &[255; 4])
    }

    pub fn raw(&self) -> RawTexture {
        self.raw
    }

    pub fn desc(&self) -> &TextureDesc {
        &self.desc
    }

    pub fn size(&self) -> (u32, u32) {
        (self.desc.width, self.desc.height)
    }

    pub fn destroy<D: GlDevice>(self, gl: &mut GlContext<D>) {
        gl.delete_texture(self.raw);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{HeadlessDevice, ResourceKind};

    #[test]
    fn data_must_cover_every_texel() {
        let mut gl = GlContext::new(HeadlessDevice::new());
        let err = Texture::rgba8(&mut gl, 2, 2, &[0; 12]).unwrap_err();
        assert!(matches!(err, GlError::TextureSize { expected: 16, got: 12 }));
        let hdr = Texture::hdr(&mut gl, 2, 1, &[0.5; 8]).unwrap();
        assert_eq!(hdr.desc().format, TextureFormat::Rgba16F);
        hdr.destroy(&mut gl);
        assert_eq!(gl.device().live(ResourceKind::Texture), 0);
    }
}
