//! Light Texture Upload
//!
//! The encoder only prepares CPU arrays. Anything implementing
//! [`LightTextureSink`] can receive them; [`GpuLightTextures`] does so with wgpu.

use crate::light_layout::{LightTextureFormat, TEXEL_CHANNELS};

/// Receiver of encoded light rows
pub trait LightTextureSink {
    /// RGBA8 rows, `texels_per_light` texels wide and `rows` tall
    fn upload_compact(&mut self, data: &[u8], texels_per_light: u32, rows: u32);

    /// RGBA32F rows, only called in the float format
    fn upload_float(&mut self, data: &[f32], texels_per_light: u32, rows: u32);
}

/// GPU textures holding the encoded lights
pub struct GpuLightTextures {
    format: LightTextureFormat,
    max_lights: u32,
    compact: wgpu::Texture,
    float: Option<wgpu::Texture>,
}

impl GpuLightTextures {
    /// Create textures for `max_lights` rows in the given format
    pub fn new(device: &wgpu::Device, format: LightTextureFormat, max_lights: u32) -> Self {
        let compact = create_light_texture(
            device,
            "LightsTexture8",
            format.compact_texels_per_light() as u32,
            max_lights,
            wgpu::TextureFormat::Rgba8Unorm,
        );
        let float = (format.float_texels_per_light() > 0).then(|| {
            create_light_texture(
                device,
                "LightsTextureFloat",
                format.float_texels_per_light() as u32,
                max_lights,
                wgpu::TextureFormat::Rgba32Float,
            )
        });

        log::debug!("Created light textures: {:?}, {} lights", format, max_lights);

        Self {
            format,
            max_lights,
            compact,
            float,
        }
    }

    /// Whether these textures fit the given layout
    pub fn matches(&self, format: LightTextureFormat, max_lights: u32) -> bool {
        self.format == format && self.max_lights == max_lights
    }

    /// Compact texture
    pub fn compact_texture(&self) -> &wgpu::Texture {
        &self.compact
    }

    /// Float texture, if the float format is active
    pub fn float_texture(&self) -> Option<&wgpu::Texture> {
        self.float.as_ref()
    }

    /// Bind this set of textures to a queue for one upload
    pub fn writer<'a>(&'a self, queue: &'a wgpu::Queue) -> GpuLightTextureWriter<'a> {
        GpuLightTextureWriter { textures: self, queue }
    }
}

fn create_light_texture(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn write_rows(queue: &wgpu::Queue, texture: &wgpu::Texture, data: &[u8], bytes_per_texel: u32, width: u32, rows: u32) {
    let size = wgpu::Extent3d {
        width,
        height: rows,
        depth_or_array_layers: 1,
    };
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        data,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(bytes_per_texel * width),
            rows_per_image: Some(rows),
        },
        size,
    );
}

/// Uploads encoded rows into [`GpuLightTextures`] through a queue
pub struct GpuLightTextureWriter<'a> {
    textures: &'a GpuLightTextures,
    queue: &'a wgpu::Queue,
}

impl LightTextureSink for GpuLightTextureWriter<'_> {
    fn upload_compact(&mut self, data: &[u8], texels_per_light: u32, rows: u32) {
        write_rows(
            self.queue,
            &self.textures.compact,
            data,
            TEXEL_CHANNELS as u32,
            texels_per_light,
            rows,
        );
    }

    fn upload_float(&mut self, data: &[f32], texels_per_light: u32, rows: u32) {
        let Some(texture) = &self.textures.float else {
            log::warn!("Float light data uploaded without a float light texture");
            return;
        };
        write_rows(
            self.queue,
            texture,
            bytemuck::cast_slice(data),
            (TEXEL_CHANNELS * std::mem::size_of::<f32>()) as u32,
            texels_per_light,
            rows,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lights_buffer::{EncoderFeatures, LightsBuffer, MAX_LIGHTS};

    #[derive(Default)]
    struct RecordingSink {
        compact: Option<(usize, u32, u32)>,
        float: Option<(usize, u32, u32)>,
    }

    impl LightTextureSink for RecordingSink {
        fn upload_compact(&mut self, data: &[u8], texels_per_light: u32, rows: u32) {
            self.compact = Some((data.len(), texels_per_light, rows));
        }

        fn upload_float(&mut self, data: &[f32], texels_per_light: u32, rows: u32) {
            self.float = Some((data.len(), texels_per_light, rows));
        }
    }

    #[test]
    fn test_upload_float_format() {
        let buffer = LightsBuffer::new(LightTextureFormat::Float, EncoderFeatures::default());
        let mut sink = RecordingSink::default();
        buffer.upload_textures(&mut sink);

        assert_eq!(sink.compact, Some((4 * 7 * MAX_LIGHTS, 7, MAX_LIGHTS as u32)));
        assert_eq!(sink.float, Some((4 * 8 * MAX_LIGHTS, 8, MAX_LIGHTS as u32)));
    }

    #[test]
    fn test_upload_eight_bit_format() {
        let buffer = LightsBuffer::new(LightTextureFormat::EightBit, EncoderFeatures::default());
        let mut sink = RecordingSink::default();
        buffer.upload_textures(&mut sink);

        assert_eq!(sink.compact, Some((4 * 36 * MAX_LIGHTS, 36, MAX_LIGHTS as u32)));
        assert!(sink.float.is_none());
    }
}
