//! Light Data Model
//!
//! Scene lights as seen by the clustered lighting core. Lights are owned by the
//! scene's [`Arena`](lumina_core::Arena); layers and the composer only hold
//! [`LightId`] handles.

use std::f32::consts::FRAC_PI_2;

use bitflags::bitflags;
use glam::{Mat4, Quat, Vec3, Vec4};
use lumina_core::Handle;

/// Handle to a light owned by the scene
pub type LightId = Handle<Light>;

/// Light types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightType {
    /// Directional light (sun), never clustered
    Directional,
    /// Omni-directional point light
    Omni,
    /// Spot light shining down its local -Y axis
    Spot,
}

/// Emitter shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LightShape {
    /// Infinitely small emitter
    #[default]
    Punctual = 0,
    /// Rectangular area light
    Rect = 1,
    /// Disk area light
    Disk = 2,
    /// Sphere area light
    Sphere = 3,
}

/// Distance attenuation model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FalloffMode {
    /// Linear falloff to zero at the range
    #[default]
    Linear = 0,
    /// Physically based inverse-squared falloff
    InverseSquared = 1,
}

/// Shadow filtering technique
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ShadowType {
    /// 3x3 percentage closer filtering
    #[default]
    Pcf3,
    /// 5x5 percentage closer filtering
    Pcf5,
    /// 8-bit variance shadow map
    Vsm8,
    /// 16-bit variance shadow map
    Vsm16,
    /// 32-bit variance shadow map
    Vsm32,
}

impl ShadowType {
    /// Whether this is a variance shadow map technique
    pub fn is_vsm(self) -> bool {
        matches!(self, Self::Vsm8 | Self::Vsm16 | Self::Vsm32)
    }
}

bitflags! {
    /// Which kinds of geometry a light affects
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LightMask: u32 {
        const AFFECT_DYNAMIC = 0b001;
        const AFFECT_LIGHTMAPPED = 0b010;
        const BAKE = 0b100;
    }
}

impl Default for LightMask {
    fn default() -> Self {
        Self::AFFECT_DYNAMIC
    }
}

/// Texture channel(s) a cookie is sampled from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CookieChannel {
    R,
    G,
    B,
    A,
    #[default]
    Rgb,
}

impl CookieChannel {
    /// Single-channel selection mask, `None` for full color cookies
    pub fn mask(self) -> Option<[bool; 4]> {
        match self {
            Self::R => Some([true, false, false, false]),
            Self::G => Some([false, true, false, false]),
            Self::B => Some([false, false, true, false]),
            Self::A => Some([false, false, false, true]),
            Self::Rgb => None,
        }
    }
}

/// Opaque reference to a texture owned by the asset system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Projected cookie texture
#[derive(Debug, Clone, PartialEq)]
pub struct Cookie {
    /// Cookie texture
    pub texture: TextureId,
    /// Cookie intensity in 0..1
    pub intensity: f32,
    /// Channel(s) sampled from the texture
    pub channel: CookieChannel,
    /// UV transform (scale xy, offset zw)
    pub transform: Vec4,
}

impl Cookie {
    /// Create a full-intensity rgb cookie
    pub fn new(texture: TextureId) -> Self {
        Self {
            texture,
            intensity: 1.0,
            channel: CookieChannel::Rgb,
            transform: Vec4::new(1.0, 1.0, 0.0, 0.0),
        }
    }
}

/// Light shadow settings
#[derive(Debug, Clone, PartialEq)]
pub struct ShadowSettings {
    /// Shadow filtering technique
    pub shadow_type: ShadowType,
    /// Shadow strength in 0..1
    pub intensity: f32,
    /// Depth bias
    pub bias: f32,
    /// Normal offset bias
    pub normal_bias: f32,
    /// Bias used by variance shadow maps
    pub vsm_bias: f32,
    /// Shadow map resolution
    pub resolution: u32,
    /// Number of cascades (directional only)
    pub cascades: u32,
    /// Split distribution between linear and logarithmic (directional only)
    pub cascade_distribution: f32,
}

impl Default for ShadowSettings {
    fn default() -> Self {
        Self {
            shadow_type: ShadowType::Pcf3,
            intensity: 1.0,
            bias: 0.05,
            normal_bias: 0.0,
            vsm_bias: 0.01,
            resolution: 1024,
            cascades: 1,
            cascade_distribution: 0.5,
        }
    }
}

/// Depth bias pair uploaded for a shadow-casting light
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShadowBiases {
    pub bias: f32,
    pub normal_bias: f32,
}

/// Scene light
#[derive(Debug, Clone, PartialEq)]
pub struct Light {
    /// Light type
    pub light_type: LightType,
    /// Emitter shape
    pub shape: LightShape,
    /// Distance attenuation model
    pub falloff: FalloffMode,
    /// Light color in gamma space
    pub color: Vec3,
    /// Light intensity
    pub intensity: f32,
    /// Disabled lights stay registered but are never rendered
    pub enabled: bool,
    /// Whether the light casts shadows
    pub cast_shadows: bool,
    /// Shadow settings
    pub shadow: ShadowSettings,
    /// Optional projected texture
    pub cookie: Option<Cookie>,
    /// Attenuation end distance (omni/spot)
    pub range: f32,
    /// Inner cone angle in radians (spot)
    pub inner_cone_angle: f32,
    /// Outer cone angle in radians (spot)
    pub outer_cone_angle: f32,
    /// World transform of the light's node
    pub world_transform: Mat4,
    /// Slot in the shadow/cookie atlas allocated this frame: x, y, width, height in 0..1
    pub atlas_viewport: Option<Vec4>,
    /// Shadow map matrix written by the shadow renderer
    pub shadow_matrix: Mat4,
    /// Geometry the light affects
    pub mask: LightMask,
}

impl Light {
    fn with_type(light_type: LightType, color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            light_type,
            shape: LightShape::Punctual,
            falloff: FalloffMode::Linear,
            color,
            intensity,
            enabled: true,
            cast_shadows: false,
            shadow: ShadowSettings::default(),
            cookie: None,
            range,
            inner_cone_angle: 0.0,
            outer_cone_angle: 0.0,
            world_transform: Mat4::IDENTITY,
            atlas_viewport: None,
            shadow_matrix: Mat4::IDENTITY,
            mask: LightMask::AFFECT_DYNAMIC,
        }
    }

    /// Create a directional light
    pub fn directional(color: Vec3, intensity: f32) -> Self {
        let mut light = Self::with_type(LightType::Directional, color, intensity, f32::INFINITY);
        light.shadow.cascades = 4;
        light
    }

    /// Create an omni light
    pub fn omni(color: Vec3, intensity: f32, range: f32) -> Self {
        Self::with_type(LightType::Omni, color, intensity, range)
    }

    /// Create a spot light
    pub fn spot(color: Vec3, intensity: f32, range: f32, inner_angle: f32, outer_angle: f32) -> Self {
        let mut light = Self::with_type(LightType::Spot, color, intensity, range);
        light.inner_cone_angle = inner_angle;
        light.outer_cone_angle = outer_angle;
        light
    }

    /// Place the light at a world position
    pub fn at(mut self, position: Vec3) -> Self {
        self.world_transform = Mat4::from_translation(position);
        self
    }

    /// Whether the light is bucketed by the cluster grid
    pub fn is_clustered(&self) -> bool {
        self.light_type != LightType::Directional
    }

    /// World position
    pub fn position(&self) -> Vec3 {
        self.world_transform.w_axis.truncate()
    }

    /// Normalized world direction of a spot light (local -Y)
    pub fn spot_direction(&self) -> Vec3 {
        (-self.world_transform.y_axis.truncate()).normalize_or_zero()
    }

    /// Half-width and half-height vectors of an area light in world space
    pub fn area_half_extents(&self) -> (Vec3, Vec3) {
        (
            self.world_transform.transform_vector3(Vec3::new(-0.5, 0.0, 0.0)),
            self.world_transform.transform_vector3(Vec3::new(0.0, 0.0, 0.5)),
        )
    }

    /// Color scaled by intensity, linearized when gamma correction is active
    pub fn final_color(&self, gamma_correction: bool) -> Vec3 {
        let color = if gamma_correction {
            self.color.powf(2.2)
        } else {
            self.color
        };
        color * self.intensity
    }

    /// Cosine of the inner cone angle
    pub fn inner_cone_cos(&self) -> f32 {
        self.inner_cone_angle.cos()
    }

    /// Cosine of the outer cone angle
    pub fn outer_cone_cos(&self) -> f32 {
        self.outer_cone_angle.cos()
    }

    /// Biases as the shader expects them for this light type
    pub fn shadow_biases(&self) -> ShadowBiases {
        let shadow = &self.shadow;
        match self.light_type {
            LightType::Spot if shadow.shadow_type.is_vsm() => ShadowBiases {
                bias: -0.00001 * 20.0,
                normal_bias: shadow.vsm_bias / (self.range / 7.0),
            },
            LightType::Spot => ShadowBiases {
                bias: shadow.bias * 20.0,
                normal_bias: shadow.normal_bias,
            },
            LightType::Omni | LightType::Directional => ShadowBiases {
                bias: shadow.bias,
                normal_bias: shadow.normal_bias,
            },
        }
    }

    /// Shader mask code: 0 dynamic only, 127 dynamic and lightmapped, 255 lightmapped only
    pub fn mask_code(&self) -> u8 {
        let dynamic = self.mask.contains(LightMask::AFFECT_DYNAMIC);
        let lightmapped = self.mask.contains(LightMask::AFFECT_LIGHTMAPPED);
        match (dynamic, lightmapped) {
            (true, true) => 127,
            (false, true) => 255,
            _ => 0,
        }
    }

    /// Projection of a spot light's cookie into its atlas slot
    pub fn spot_cookie_matrix(&self, viewport: Vec4) -> Mat4 {
        const COOKIE_NEAR_CLIP: f32 = 0.01;

        let (_, rotation, translation) = self.world_transform.to_scale_rotation_translation();
        let camera = Mat4::from_rotation_translation(
            rotation * Quat::from_rotation_x(-FRAC_PI_2),
            translation,
        );
        let far = self.range.max(COOKIE_NEAR_CLIP * 2.0);
        let projection = Mat4::perspective_rh_gl(
            (self.outer_cone_angle * 2.0).max(f32::EPSILON),
            1.0,
            COOKIE_NEAR_CLIP,
            far,
        );

        viewport_matrix(viewport) * projection * camera.inverse()
    }
}

impl Default for Light {
    fn default() -> Self {
        Self::omni(Vec3::ONE, 1.0, 10.0)
    }
}

/// Maps clip space onto an atlas rectangle (x, y, width, height) and depth onto 0..1
fn viewport_matrix(viewport: Vec4) -> Mat4 {
    let half_width = viewport.z * 0.5;
    let half_height = viewport.w * 0.5;
    Mat4::from_cols(
        Vec4::new(half_width, 0.0, 0.0, 0.0),
        Vec4::new(0.0, half_height, 0.0, 0.0),
        Vec4::new(0.0, 0.0, 0.5, 0.0),
        Vec4::new(viewport.x + half_width, viewport.y + half_height, 0.5, 1.0),
    )
}
