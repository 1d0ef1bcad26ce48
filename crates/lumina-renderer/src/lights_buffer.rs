//! Light Data Encoder
//!
//! Serializes lights into the CPU-side arrays backing the two light textures.
//! Row `i` of each array belongs to the light with global index `i`; the
//! cluster grid refers to lights by the same index.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::gpu_upload::LightTextureSink;
use crate::light::{Light, LightShape, LightType};
use crate::light_layout::{
    Axis, CompactField, FloatTexel, LIGHT_LAYOUT_VERSION, LightTextureFormat, TEXEL_CHANNELS,
};
use crate::{LightingError, LightingResult};

/// Light budget imposed by 8-bit light indices in the cluster cells
pub const MAX_LIGHTS: usize = 255;

/// Smallest accepted compression range, keeps the inverse finite
const MIN_COMPRESSION_RANGE: f32 = 1.0e-4;

/// Optional light features the shader was built with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderFeatures {
    /// Shadow data is encoded for lights with an atlas slot
    pub shadows: bool,
    /// Cookie data is encoded for lights with an atlas slot
    pub cookies: bool,
    /// Area light half-vectors are encoded for non-punctual lights
    pub area_lights: bool,
}

impl Default for EncoderFeatures {
    fn default() -> Self {
        Self {
            shadows: true,
            cookies: false,
            area_lights: false,
        }
    }
}

/// Values the shader needs to undo the quantization
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct LightBufferUniforms {
    /// Scene bounds minimum xyz, max color value in w
    pub bounds_min: [f32; 4],
    /// Scene bounds extent xyz, max attenuation in w
    pub bounds_extent: [f32; 4],
    /// Compact texels per light, float texels per light, light rows, layout version
    pub texture_size: [f32; 4],
}

/// Projection data attached to a light this frame
enum LightProjection {
    /// Spot shadow or cookie projection
    Matrix(Mat4),
    /// Omni atlas slot
    AtlasViewport(Vec4),
    None,
}

/// CPU-side light texture data
pub struct LightsBuffer {
    format: LightTextureFormat,
    features: EncoderFeatures,
    max_lights: usize,
    /// RGBA8 rows, always present
    compact: Vec<u8>,
    /// RGBA32F rows, empty unless the float format is active
    float: Vec<f32>,
    max_attenuation: f32,
    max_color_value: f32,
    bounds_min: Vec3,
    bounds_extent: Vec3,
    ranges_set: bool,
}

impl LightsBuffer {
    /// Create a buffer sized for [`MAX_LIGHTS`]
    pub fn new(format: LightTextureFormat, features: EncoderFeatures) -> Self {
        let mut buffer = Self {
            format,
            features,
            max_lights: MAX_LIGHTS,
            compact: Vec::new(),
            float: Vec::new(),
            max_attenuation: 1.0,
            max_color_value: 1.0,
            bounds_min: Vec3::ZERO,
            bounds_extent: Vec3::ONE,
            ranges_set: false,
        };
        buffer.allocate();
        buffer
    }

    fn allocate(&mut self) {
        let compact_len = TEXEL_CHANNELS * self.format.compact_texels_per_light() * self.max_lights;
        let float_len = TEXEL_CHANNELS * self.format.float_texels_per_light() * self.max_lights;
        self.compact = vec![0; compact_len];
        self.float = vec![0.0; float_len];
    }

    /// Start a frame, reallocating when the capacity or format changed
    ///
    /// All rows are cleared; compression ranges must be set again before encoding.
    pub fn begin_frame(&mut self, max_lights: usize, format: LightTextureFormat) {
        let max_lights = max_lights.min(MAX_LIGHTS);
        if max_lights != self.max_lights || format != self.format {
            log::debug!(
                "Light buffer layout changed: {} lights, {:?} -> {} lights, {:?}",
                self.max_lights,
                self.format,
                max_lights,
                format
            );
            self.max_lights = max_lights;
            self.format = format;
            self.allocate();
        } else {
            self.compact.fill(0);
            self.float.fill(0.0);
        }
        self.ranges_set = false;
    }

    /// Set the global quantization ranges for color and attenuation
    pub fn set_compression_ranges(&mut self, max_attenuation: f32, max_color_value: f32) {
        self.max_attenuation = max_attenuation.max(MIN_COMPRESSION_RANGE);
        self.max_color_value = max_color_value.max(MIN_COMPRESSION_RANGE);
        self.ranges_set = true;
    }

    /// Anchor position quantization to the visible scene bounds
    pub fn set_scene_bounds(&mut self, min: Vec3, extent: Vec3) {
        self.bounds_min = min;
        self.bounds_extent = extent.max(Vec3::splat(MIN_COMPRESSION_RANGE));
    }

    /// Change the optional features
    pub fn set_features(&mut self, features: EncoderFeatures) {
        self.features = features;
    }

    /// Active format
    pub fn format(&self) -> LightTextureFormat {
        self.format
    }

    /// Light capacity
    pub fn max_lights(&self) -> usize {
        self.max_lights
    }

    /// Optional features
    pub fn features(&self) -> EncoderFeatures {
        self.features
    }

    fn compact_row_len(&self) -> usize {
        TEXEL_CHANNELS * self.format.compact_texels_per_light()
    }

    fn float_row_len(&self) -> usize {
        TEXEL_CHANNELS * self.format.float_texels_per_light()
    }

    /// Encode `light` into the rows of `index`
    pub fn encode(&mut self, light: &Light, index: usize, gamma_correction: bool) -> LightingResult<()> {
        if index >= self.max_lights {
            return Err(LightingError::OutOfCapacity {
                index,
                capacity: self.max_lights,
            });
        }
        debug_assert!(self.ranges_set, "compression ranges not set for this frame");

        let is_spot = light.light_type == LightType::Spot;
        // Without an atlas slot the light has no shadow map or cookie this frame
        let has_atlas_viewport = light.atlas_viewport.is_some();
        let is_cookie = self.features.cookies && light.cookie.is_some() && has_atlas_viewport;
        let is_area = self.features.area_lights && light.shape != LightShape::Punctual;
        let cast_shadows = self.features.shadows && light.cast_shadows && has_atlas_viewport;

        let viewport = light.atlas_viewport.unwrap_or(Vec4::ZERO);
        let projection = if is_spot {
            if cast_shadows {
                LightProjection::Matrix(light.shadow_matrix)
            } else if is_cookie {
                LightProjection::Matrix(light.spot_cookie_matrix(viewport))
            } else {
                LightProjection::None
            }
        } else if cast_shadows || is_cookie {
            LightProjection::AtlasViewport(viewport)
        } else {
            LightProjection::None
        };

        let row_len = self.compact_row_len();
        let row = &mut self.compact[index * row_len..(index + 1) * row_len];

        write_flags(row, light, is_spot, cast_shadows);
        write_color(row, light, gamma_correction, is_cookie, 1.0 / self.max_color_value);
        if is_spot {
            CompactField::SpotInnerCos.write(row, light.inner_cone_cos());
            CompactField::SpotOuterCos.write(row, light.outer_cone_cos());
        }
        if light.cast_shadows {
            let biases = light.shadow_biases();
            CompactField::ShadowBias.write(row, biases.bias);
            CompactField::NormalBias.write(row, biases.normal_bias);
        }
        if is_cookie {
            write_cookie(row, light);
        }

        let position = light.position();
        let range = light.range;

        match self.format {
            LightTextureFormat::Float => {
                let row_len = self.float_row_len();
                let row = &mut self.float[index * row_len..(index + 1) * row_len];

                put_vec4(row, FloatTexel::PositionRange, position.extend(range));
                if is_spot {
                    put_vec4(row, FloatTexel::SpotDirection, light.spot_direction().extend(0.0));
                }
                match projection {
                    LightProjection::Matrix(matrix) => {
                        let start = FloatTexel::ProjMat0.offset();
                        row[start..start + 16].copy_from_slice(&matrix.to_cols_array());
                    }
                    LightProjection::AtlasViewport(viewport) => {
                        let slot = Vec4::new(viewport.x, viewport.y, viewport.z / 3.0, 0.0);
                        put_vec4(row, FloatTexel::ATLAS_VIEWPORT, slot);
                    }
                    LightProjection::None => {}
                }
                if is_area {
                    let (half_width, half_height) = light.area_half_extents();
                    put_vec4(row, FloatTexel::AreaDataWidth, half_width.extend(0.0));
                    put_vec4(row, FloatTexel::AreaDataHeight, half_height.extend(0.0));
                }
            }
            LightTextureFormat::EightBit => {
                let normalized = (position - self.bounds_min) / self.bounds_extent;
                for axis in Axis::ALL {
                    CompactField::Position(axis).write(row, normalized[axis as usize]);
                }
                CompactField::Range.write(row, range / self.max_attenuation);

                if is_spot {
                    let direction = light.spot_direction();
                    for axis in Axis::ALL {
                        CompactField::SpotDirection(axis).write(row, direction[axis as usize]);
                    }
                }
                match projection {
                    LightProjection::Matrix(matrix) => {
                        for (element, value) in matrix.to_cols_array().into_iter().enumerate() {
                            CompactField::ProjMatrix(element as u8).write(row, value);
                        }
                    }
                    LightProjection::AtlasViewport(viewport) => {
                        CompactField::AtlasViewportX.write(row, viewport.x);
                        CompactField::AtlasViewportY.write(row, viewport.y);
                        CompactField::AtlasSlotSize.write(row, viewport.z / 3.0);
                    }
                    LightProjection::None => {}
                }
                if is_area {
                    let (half_width, half_height) = light.area_half_extents();
                    for axis in Axis::ALL {
                        CompactField::AreaHalfWidth(axis).write(row, half_width[axis as usize]);
                        CompactField::AreaHalfHeight(axis).write(row, half_height[axis as usize]);
                    }
                }
            }
        }

        Ok(())
    }

    /// Compact row of a light
    pub fn compact_row(&self, index: usize) -> &[u8] {
        let row_len = self.compact_row_len();
        &self.compact[index * row_len..(index + 1) * row_len]
    }

    /// Float row of a light, `None` in the 8-bit format
    pub fn float_row(&self, index: usize) -> Option<&[f32]> {
        let row_len = self.float_row_len();
        if row_len == 0 {
            return None;
        }
        Some(&self.float[index * row_len..(index + 1) * row_len])
    }

    /// Whole compact array, `4 * stride * max_lights` bytes
    pub fn compact_data(&self) -> &[u8] {
        &self.compact
    }

    /// Whole float array, `None` in the 8-bit format
    pub fn float_data(&self) -> Option<&[f32]> {
        (!self.float.is_empty()).then_some(self.float.as_slice())
    }

    /// World position and range of a light as the shader will reconstruct them
    pub fn decode_position_range(&self, index: usize) -> (Vec3, f32) {
        if let Some(row) = self.float_row(index) {
            let start = FloatTexel::PositionRange.offset();
            let data = Vec4::from_slice(&row[start..start + TEXEL_CHANNELS]);
            return (data.truncate(), data.w);
        }

        let row = self.compact_row(index);
        let normalized = Vec3::new(
            CompactField::Position(Axis::X).read(row),
            CompactField::Position(Axis::Y).read(row),
            CompactField::Position(Axis::Z).read(row),
        );
        let range = CompactField::Range.read(row) * self.max_attenuation;
        (self.bounds_min + normalized * self.bounds_extent, range)
    }

    /// Decoding constants for the shader
    pub fn uniforms(&self) -> LightBufferUniforms {
        LightBufferUniforms {
            bounds_min: self.bounds_min.extend(self.max_color_value).to_array(),
            bounds_extent: self.bounds_extent.extend(self.max_attenuation).to_array(),
            texture_size: [
                self.format.compact_texels_per_light() as f32,
                self.format.float_texels_per_light() as f32,
                self.max_lights as f32,
                LIGHT_LAYOUT_VERSION as f32,
            ],
        }
    }

    /// Hand the encoded arrays to the texture upload layer
    pub fn upload_textures<S: LightTextureSink + ?Sized>(&self, sink: &mut S) {
        let rows = self.max_lights as u32;
        sink.upload_compact(&self.compact, self.format.compact_texels_per_light() as u32, rows);
        if let Some(float) = self.float_data() {
            sink.upload_float(float, self.format.float_texels_per_light() as u32, rows);
        }
    }
}

fn put_vec4(row: &mut [f32], texel: FloatTexel, value: Vec4) {
    let start = texel.offset();
    value.write_to_slice(&mut row[start..start + TEXEL_CHANNELS]);
}

fn write_flags(row: &mut [u8], light: &Light, is_spot: bool, cast_shadows: bool) {
    CompactField::LightType.write_byte(row, if is_spot { 255 } else { 0 });
    CompactField::Shape.write_byte(row, light.shape as u8 * 64);
    CompactField::FalloffMode.write_byte(row, light.falloff as u8 * 255);
    let shadow_intensity = if cast_shadows { light.shadow.intensity } else { 0.0 };
    CompactField::ShadowIntensity.write(row, shadow_intensity);
}

fn write_color(row: &mut [u8], light: &Light, gamma_correction: bool, is_cookie: bool, inv_max_color: f32) {
    let color = light.final_color(gamma_correction) * inv_max_color;
    CompactField::ColorR.write(row, color.x);
    CompactField::ColorG.write(row, color.y);
    CompactField::ColorB.write(row, color.z);
    CompactField::CookieEnabled.write_byte(row, if is_cookie { 255 } else { 0 });
    CompactField::LightMask.write_byte(row, light.mask_code());
}

fn write_cookie(row: &mut [u8], light: &Light) {
    let Some(cookie) = &light.cookie else {
        return;
    };
    CompactField::CookieIntensity.write(row, cookie.intensity);
    match cookie.channel.mask() {
        None => CompactField::CookieRgb.write_byte(row, 255),
        Some(mask) => {
            CompactField::CookieRgb.write_byte(row, 0);
            for (channel, selected) in mask.into_iter().enumerate() {
                CompactField::CookieChannel(channel as u8).write_byte(row, if selected { 255 } else { 0 });
            }
        }
    }
}
