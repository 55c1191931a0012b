//! Texture loading and management

use std::path::Path;
use std::sync::Arc;

use image::{DynamicImage, GenericImageView};
use thiserror::Error;

use crate::backend::*;
use crate::render_graph::ResourceName;

/// Failure decoding an image asset
#[derive(Error, Debug)]
pub enum TextureLoadError {
    #[error("Failed to decode image '{path}': {source}")]
    Decode {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("Failed to read image '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Decoded image handed over by the asset layer
#[derive(Debug, Clone)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub pixels: Arc<[u8]>,
}

impl ImageData {
    /// Load an image from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TextureLoadError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| TextureLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_bytes(&bytes, &path.display().to_string())
    }

    /// Decode an image from memory. HDR sources keep 32-bit float channels.
    pub fn from_bytes(bytes: &[u8], path: &str) -> Result<Self, TextureLoadError> {
        let img = image::load_from_memory(bytes).map_err(|source| TextureLoadError::Decode {
            path: path.to_string(),
            source,
        })?;
        Ok(Self::from_image(img))
    }

    fn from_image(img: DynamicImage) -> Self {
        let (width, height) = img.dimensions();
        match img {
            DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
                let rgba = img.into_rgba32f();
                Self {
                    width,
                    height,
                    format: PixelFormat::R32G32B32A32_FLOAT,
                    pixels: bytemuck::cast_slice::<f32, u8>(rgba.as_raw()).into(),
                }
            }
            _ => Self::rgba8(width, height, img.into_rgba8().into_raw()),
        }
    }

    pub fn rgba8(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format: PixelFormat::R8G8B8A8_UNORM,
            pixels: pixels.into(),
        }
    }

    /// A 1x1 texture of a single color
    pub fn solid_color(color: [u8; 4]) -> Self {
        Self::rgba8(1, 1, color.to_vec())
    }

    /// Texture and sampler descriptors used to upload this image
    pub fn texture_desc(&self, label: &str) -> (GpuTextureDesc, SamplerDesc) {
        let desc = GpuTextureDesc {
            label: Some(label.to_string()),
            dimension: Dimension::Texture2D,
            width: self.width,
            height: self.height,
            format: self.format,
            bind_flags: BindFlags::SHADER_RESOURCE | BindFlags::RENDER_TARGET,
            misc_flags: ResourceMiscFlags::GENERATE_MIPS,
            mip_levels: 1,
            initial_data: Some(self.pixels.clone()),
            ..Default::default()
        };

        let sampler = if self.format.is_hdr() {
            SamplerDesc::linear_clamp()
        } else {
            SamplerDesc::linear_mipmap()
        };

        (desc, sampler)
    }
}

/// A live GPU texture owned by a resource table
#[derive(Debug)]
pub struct GpuTexture {
    pub handle: TextureHandle,
    pub desc: GpuTextureDesc,
    /// Register this texture is bound to when sampled or written as a UAV
    pub slot: Option<u32>,
    pub name: Option<ResourceName>,
}

impl GpuTexture {
    pub fn width(&self) -> u32 {
        self.desc.width
    }

    pub fn height(&self) -> u32 {
        self.desc.height
    }

    pub fn dimension(&self) -> Dimension {
        self.desc.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ldr_image_uses_mipmapped_sampler() {
        let image = ImageData::solid_color([255, 0, 0, 255]);
        let (desc, sampler) = image.texture_desc("@res://images/red.png");

        assert_eq!(desc.format, PixelFormat::R8G8B8A8_UNORM);
        assert!(desc.bind_flags.contains(BindFlags::SHADER_RESOURCE | BindFlags::RENDER_TARGET));
        assert!(desc.misc_flags.contains(ResourceMiscFlags::GENERATE_MIPS));
        assert_eq!(desc.mip_levels, 1);
        assert_eq!(sampler, SamplerDesc::linear_mipmap());
    }

    #[test]
    fn test_hdr_image_uses_linear_clamp() {
        let image = ImageData {
            width: 1,
            height: 1,
            format: PixelFormat::R32G32B32A32_FLOAT,
            pixels: vec![0u8; 16].into(),
        };
        let (_, sampler) = image.texture_desc("@res://images/brdf.hdr");
        assert_eq!(sampler, SamplerDesc::linear_clamp());
    }

    #[test]
    fn test_decode_png() {
        let mut bytes = Vec::new();
        let img = image::RgbaImage::from_pixel(2, 3, image::Rgba([1, 2, 3, 4]));
        DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageOutputFormat::Png)
            .unwrap();

        let data = ImageData::from_bytes(&bytes, "test.png").unwrap();
        assert_eq!((data.width, data.height), (2, 3));
        assert_eq!(&data.pixels[..4], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = ImageData::from_bytes(&[0, 1, 2, 3], "broken.png");
        assert!(matches!(result, Err(TextureLoadError::Decode { .. })));
    }
}
