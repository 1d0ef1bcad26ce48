//! Light Texture Layouts
//!
//! Row layouts of the two light textures and the shader defines generated from
//! them. Every light occupies one row; a row is a run of RGBA texels.
//!
//! The compact (8-bit) texture always stores flags, color and the other low
//! precision data. Position, direction, projection and area data go to the
//! float texture when the device supports it, otherwise they are packed into
//! extra texels of the compact texture.
//!
//! Field placement lives in exactly one table ([`CompactField::layout`]) which
//! both the encoder and the decoder read from.

use std::ops::Range;

/// Bumped whenever a texel or field moves; emitted into the shader source
pub const LIGHT_LAYOUT_VERSION: u32 = 1;

/// Channels per texel
pub const TEXEL_CHANNELS: usize = 4;

/// Padding keeping cosines and directions off the exact 0/1 ends of their range
pub const UNIT_VECTOR_PADDING: f32 = 1.0e-5;

/// Range applied to shadow depth bias
pub const SHADOW_BIAS_RANGE: (f32, f32) = (-1.0, 20.0);

/// Range applied to the first three columns of a light projection matrix
pub const PROJECTION_RANGE: (f32, f32) = (-2.0, 2.0);

/// Storage format of the high precision light data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightTextureFormat {
    /// High precision data lives in an RGBA32F texture
    Float,
    /// Everything is packed into the RGBA8 texture
    EightBit,
}

impl LightTextureFormat {
    /// Pick the format for a device
    ///
    /// The float layout binds two textures at once, so it is only used when the
    /// device also has more than eight texture units.
    pub fn detect(float_textures_supported: bool, max_texture_units: u32) -> Self {
        if float_textures_supported && max_texture_units > 8 {
            Self::Float
        } else {
            Self::EightBit
        }
    }

    /// Suffix of the selecting shader define
    pub fn define_suffix(self) -> &'static str {
        match self {
            Self::Float => "FLOAT",
            Self::EightBit => "8BIT",
        }
    }

    /// Texels per light in the compact texture
    pub fn compact_texels_per_light(self) -> usize {
        match self {
            Self::Float => CompactTexel::ALWAYS_COUNT,
            Self::EightBit => CompactTexel::COUNT,
        }
    }

    /// Texels per light in the float texture, zero when it is not used
    pub fn float_texels_per_light(self) -> usize {
        match self {
            Self::Float => FloatTexel::COUNT,
            Self::EightBit => 0,
        }
    }
}

/// Texel columns of the compact (RGBA8) light texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompactTexel {
    /// Light type, shape, falloff mode, shadow intensity
    Flags,
    /// Color red (2 bytes), color green (2 bytes)
    ColorA,
    /// Color blue (2 bytes), cookie enabled, light mask
    ColorB,
    /// Spot inner cosine (2 bytes), spot outer cosine (2 bytes)
    SpotAngles,
    /// Shadow bias (2 bytes), normal bias (2 bytes)
    ShadowBias,
    /// Cookie intensity, cookie is rgb
    CookieA,
    /// Cookie channel mask
    CookieB,
    PositionX,
    PositionY,
    PositionZ,
    Range,
    SpotDirectionX,
    SpotDirectionY,
    SpotDirectionZ,
    ProjMat00,
    ProjMat01,
    ProjMat02,
    ProjMat03,
    ProjMat10,
    ProjMat11,
    ProjMat12,
    ProjMat13,
    ProjMat20,
    ProjMat21,
    ProjMat22,
    ProjMat23,
    ProjMat30,
    ProjMat31,
    ProjMat32,
    ProjMat33,
    AreaDataWidthX,
    AreaDataWidthY,
    AreaDataWidthZ,
    AreaDataHeightX,
    AreaDataHeightY,
    AreaDataHeightZ,
}

impl CompactTexel {
    /// All texels in column order
    pub const ALL: [Self; 36] = [
        Self::Flags,
        Self::ColorA,
        Self::ColorB,
        Self::SpotAngles,
        Self::ShadowBias,
        Self::CookieA,
        Self::CookieB,
        Self::PositionX,
        Self::PositionY,
        Self::PositionZ,
        Self::Range,
        Self::SpotDirectionX,
        Self::SpotDirectionY,
        Self::SpotDirectionZ,
        Self::ProjMat00,
        Self::ProjMat01,
        Self::ProjMat02,
        Self::ProjMat03,
        Self::ProjMat10,
        Self::ProjMat11,
        Self::ProjMat12,
        Self::ProjMat13,
        Self::ProjMat20,
        Self::ProjMat21,
        Self::ProjMat22,
        Self::ProjMat23,
        Self::ProjMat30,
        Self::ProjMat31,
        Self::ProjMat32,
        Self::ProjMat33,
        Self::AreaDataWidthX,
        Self::AreaDataWidthY,
        Self::AreaDataWidthZ,
        Self::AreaDataHeightX,
        Self::AreaDataHeightY,
        Self::AreaDataHeightZ,
    ];

    /// Texels written regardless of format
    pub const ALWAYS_COUNT: usize = Self::PositionX as usize;

    /// Texels per light when everything lives in the compact texture
    pub const COUNT: usize = Self::ALL.len();

    /// Omni atlas slot position, shares the first projection texel
    pub const ATLAS_VIEWPORT_A: Self = Self::ProjMat00;

    /// Omni atlas slot size, shares the second projection texel
    pub const ATLAS_VIEWPORT_B: Self = Self::ProjMat01;

    /// Column of this texel within a row
    pub const fn column(self) -> usize {
        self as usize
    }

    /// Name used in the generated shader define
    pub const fn define_name(self) -> &'static str {
        match self {
            Self::Flags => "FLAGS",
            Self::ColorA => "COLOR_A",
            Self::ColorB => "COLOR_B",
            Self::SpotAngles => "SPOT_ANGLES",
            Self::ShadowBias => "SHADOW_BIAS",
            Self::CookieA => "COOKIE_A",
            Self::CookieB => "COOKIE_B",
            Self::PositionX => "POSITION_X",
            Self::PositionY => "POSITION_Y",
            Self::PositionZ => "POSITION_Z",
            Self::Range => "RANGE",
            Self::SpotDirectionX => "SPOT_DIRECTION_X",
            Self::SpotDirectionY => "SPOT_DIRECTION_Y",
            Self::SpotDirectionZ => "SPOT_DIRECTION_Z",
            Self::ProjMat00 => "PROJ_MAT_00",
            Self::ProjMat01 => "PROJ_MAT_01",
            Self::ProjMat02 => "PROJ_MAT_02",
            Self::ProjMat03 => "PROJ_MAT_03",
            Self::ProjMat10 => "PROJ_MAT_10",
            Self::ProjMat11 => "PROJ_MAT_11",
            Self::ProjMat12 => "PROJ_MAT_12",
            Self::ProjMat13 => "PROJ_MAT_13",
            Self::ProjMat20 => "PROJ_MAT_20",
            Self::ProjMat21 => "PROJ_MAT_21",
            Self::ProjMat22 => "PROJ_MAT_22",
            Self::ProjMat23 => "PROJ_MAT_23",
            Self::ProjMat30 => "PROJ_MAT_30",
            Self::ProjMat31 => "PROJ_MAT_31",
            Self::ProjMat32 => "PROJ_MAT_32",
            Self::ProjMat33 => "PROJ_MAT_33",
            Self::AreaDataWidthX => "AREA_DATA_WIDTH_X",
            Self::AreaDataWidthY => "AREA_DATA_WIDTH_Y",
            Self::AreaDataWidthZ => "AREA_DATA_WIDTH_Z",
            Self::AreaDataHeightX => "AREA_DATA_HEIGHT_X",
            Self::AreaDataHeightY => "AREA_DATA_HEIGHT_Y",
            Self::AreaDataHeightZ => "AREA_DATA_HEIGHT_Z",
        }
    }

    const fn offset_by(self, delta: usize) -> Self {
        Self::ALL[self as usize + delta]
    }
}

// Column order must match declaration order
const _: () = {
    let mut i = 0;
    while i < CompactTexel::ALL.len() {
        assert!(CompactTexel::ALL[i] as usize == i);
        i += 1;
    }
};

/// Texel columns of the float (RGBA32F) light texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FloatTexel {
    /// Position xyz, range
    PositionRange,
    /// Spot direction xyz
    SpotDirection,
    /// Light projection matrix, columns 0 to 3
    ProjMat0,
    ProjMat1,
    ProjMat2,
    ProjMat3,
    /// Area light half-width xyz
    AreaDataWidth,
    /// Area light half-height xyz
    AreaDataHeight,
}

impl FloatTexel {
    /// All texels in column order
    pub const ALL: [Self; 8] = [
        Self::PositionRange,
        Self::SpotDirection,
        Self::ProjMat0,
        Self::ProjMat1,
        Self::ProjMat2,
        Self::ProjMat3,
        Self::AreaDataWidth,
        Self::AreaDataHeight,
    ];

    /// Texels per light
    pub const COUNT: usize = Self::ALL.len();

    /// Omni atlas slot, shares the first projection texel
    pub const ATLAS_VIEWPORT: Self = Self::ProjMat0;

    /// Column of this texel within a row
    pub const fn column(self) -> usize {
        self as usize
    }

    /// Float offset of this texel within a row
    pub const fn offset(self) -> usize {
        self as usize * TEXEL_CHANNELS
    }

    /// Name used in the generated shader define
    pub const fn define_name(self) -> &'static str {
        match self {
            Self::PositionRange => "POSITION_RANGE",
            Self::SpotDirection => "SPOT_DIRECTION",
            Self::ProjMat0 => "PROJ_MAT_0",
            Self::ProjMat1 => "PROJ_MAT_1",
            Self::ProjMat2 => "PROJ_MAT_2",
            Self::ProjMat3 => "PROJ_MAT_3",
            Self::AreaDataWidth => "AREA_DATA_WIDTH",
            Self::AreaDataHeight => "AREA_DATA_HEIGHT",
        }
    }
}

const _: () = {
    let mut i = 0;
    while i < FloatTexel::ALL.len() {
        assert!(FloatTexel::ALL[i] as usize == i);
        i += 1;
    }
};

/// How a field's bytes encode its value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Encoding {
    /// Raw byte value
    Byte,
    /// Linear fixed point over `[min, max]`
    Linear { min: f32, max: f32 },
    /// Mantissa bytes followed by a biased exponent byte
    MantissaExponent,
}

/// Placement and encoding of one field in a compact row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldLayout {
    /// Texel holding the field
    pub texel: CompactTexel,
    /// First byte within the texel
    pub byte: usize,
    /// Width in bytes
    pub width: usize,
    /// Byte encoding
    pub encoding: Encoding,
}

impl FieldLayout {
    const fn new(texel: CompactTexel, byte: usize, width: usize, encoding: Encoding) -> Self {
        Self {
            texel,
            byte,
            width,
            encoding,
        }
    }

    /// Byte range within a row
    pub const fn range(&self) -> Range<usize> {
        let start = self.texel.column() * TEXEL_CHANNELS + self.byte;
        start..start + self.width
    }

    /// Encode a numeric value into `row`
    pub fn write(&self, row: &mut [u8], value: f32) {
        let bytes = &mut row[self.range()];
        match self.encoding {
            Encoding::Linear { min, max } => crate::packing::pack_linear(value, bytes, min, max),
            Encoding::MantissaExponent => crate::packing::pack_mantissa_exponent(value, bytes),
            Encoding::Byte => {
                debug_assert!(false, "numeric write into raw byte field {self:?}");
                bytes[0] = crate::packing::unit_to_byte(value);
            }
        }
    }

    /// Store a raw byte into `row`
    pub fn write_byte(&self, row: &mut [u8], value: u8) {
        debug_assert_eq!(self.encoding, Encoding::Byte);
        row[self.range().start] = value;
    }

    /// Decode the numeric value stored in `row`
    pub fn read(&self, row: &[u8]) -> f32 {
        let bytes = &row[self.range()];
        match self.encoding {
            Encoding::Linear { min, max } => crate::packing::unpack_linear(bytes, min, max),
            Encoding::MantissaExponent => crate::packing::unpack_mantissa_exponent(bytes),
            Encoding::Byte => bytes[0] as f32 / 255.0,
        }
    }

    /// Raw byte stored in `row`
    pub fn read_byte(&self, row: &[u8]) -> u8 {
        row[self.range().start]
    }
}

/// Vector component selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Axis {
    /// All axes in order
    pub const ALL: [Self; 3] = [Self::X, Self::Y, Self::Z];
}

/// Logical fields of a compact row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompactField {
    /// 255 for spot lights, 0 otherwise
    LightType,
    /// Shape index times 64
    Shape,
    /// Falloff mode times 255
    FalloffMode,
    /// Shadow intensity, zero when the light casts no shadows this frame
    ShadowIntensity,
    ColorR,
    ColorG,
    ColorB,
    /// 255 when a cookie is sampled
    CookieEnabled,
    /// Light mask code (0, 127 or 255)
    LightMask,
    SpotInnerCos,
    SpotOuterCos,
    ShadowBias,
    NormalBias,
    CookieIntensity,
    /// 255 for full color cookies
    CookieRgb,
    /// One byte per channel r, g, b, a
    CookieChannel(u8),
    /// Position normalized to the scene bounds
    Position(Axis),
    /// Range normalized by the max attenuation
    Range,
    SpotDirection(Axis),
    /// Projection matrix element in column-major order, 0 to 15
    ProjMatrix(u8),
    AtlasViewportX,
    AtlasViewportY,
    /// Size of one cube face slot (a third of the viewport)
    AtlasSlotSize,
    AreaHalfWidth(Axis),
    AreaHalfHeight(Axis),
}

impl CompactField {
    /// Placement of this field
    pub const fn layout(self) -> FieldLayout {
        use CompactTexel as T;
        use Encoding::{Byte, MantissaExponent};

        const UNIT: Encoding = Encoding::Linear { min: 0.0, max: 1.0 };
        const DIRECTION: Encoding = Encoding::Linear {
            min: -1.0 - UNIT_VECTOR_PADDING,
            max: 1.0 + UNIT_VECTOR_PADDING,
        };
        const BIAS: Encoding = Encoding::Linear {
            min: SHADOW_BIAS_RANGE.0,
            max: SHADOW_BIAS_RANGE.1,
        };
        const PROJECTION: Encoding = Encoding::Linear {
            min: PROJECTION_RANGE.0,
            max: PROJECTION_RANGE.1,
        };

        match self {
            Self::LightType => FieldLayout::new(T::Flags, 0, 1, Byte),
            Self::Shape => FieldLayout::new(T::Flags, 1, 1, Byte),
            Self::FalloffMode => FieldLayout::new(T::Flags, 2, 1, Byte),
            Self::ShadowIntensity => FieldLayout::new(T::Flags, 3, 1, UNIT),
            Self::ColorR => FieldLayout::new(T::ColorA, 0, 2, UNIT),
            Self::ColorG => FieldLayout::new(T::ColorA, 2, 2, UNIT),
            Self::ColorB => FieldLayout::new(T::ColorB, 0, 2, UNIT),
            Self::CookieEnabled => FieldLayout::new(T::ColorB, 2, 1, Byte),
            Self::LightMask => FieldLayout::new(T::ColorB, 3, 1, Byte),
            Self::SpotInnerCos => FieldLayout::new(T::SpotAngles, 0, 2, DIRECTION),
            Self::SpotOuterCos => FieldLayout::new(T::SpotAngles, 2, 2, DIRECTION),
            Self::ShadowBias => FieldLayout::new(T::ShadowBias, 0, 2, BIAS),
            Self::NormalBias => FieldLayout::new(T::ShadowBias, 2, 2, UNIT),
            Self::CookieIntensity => FieldLayout::new(T::CookieA, 0, 1, UNIT),
            Self::CookieRgb => FieldLayout::new(T::CookieA, 1, 1, Byte),
            Self::CookieChannel(channel) => FieldLayout::new(T::CookieB, channel as usize, 1, Byte),
            Self::Position(axis) => FieldLayout::new(T::PositionX.offset_by(axis as usize), 0, 4, UNIT),
            Self::Range => FieldLayout::new(T::Range, 0, 4, UNIT),
            Self::SpotDirection(axis) => {
                FieldLayout::new(T::SpotDirectionX.offset_by(axis as usize), 0, 4, DIRECTION)
            }
            // The last column holds translation terms of unbounded magnitude
            Self::ProjMatrix(element) => {
                let encoding = if element < 12 { PROJECTION } else { MantissaExponent };
                FieldLayout::new(T::ProjMat00.offset_by(element as usize), 0, 4, encoding)
            }
            Self::AtlasViewportX => FieldLayout::new(T::ATLAS_VIEWPORT_A, 0, 2, UNIT),
            Self::AtlasViewportY => FieldLayout::new(T::ATLAS_VIEWPORT_A, 2, 2, UNIT),
            Self::AtlasSlotSize => FieldLayout::new(T::ATLAS_VIEWPORT_B, 0, 2, UNIT),
            Self::AreaHalfWidth(axis) => {
                FieldLayout::new(T::AreaDataWidthX.offset_by(axis as usize), 0, 4, MantissaExponent)
            }
            Self::AreaHalfHeight(axis) => {
                FieldLayout::new(T::AreaDataHeightX.offset_by(axis as usize), 0, 4, MantissaExponent)
            }
        }
    }

    /// Write a numeric value for this field into `row`
    pub fn write(self, row: &mut [u8], value: f32) {
        self.layout().write(row, value);
    }

    /// Write a raw byte for this field into `row`
    pub fn write_byte(self, row: &mut [u8], value: u8) {
        self.layout().write_byte(row, value);
    }

    /// Decode this field from `row`
    pub fn read(self, row: &[u8]) -> f32 {
        self.layout().read(row)
    }

    /// Raw byte of this field in `row`
    pub fn read_byte(self, row: &[u8]) -> u8 {
        self.layout().read_byte(row)
    }
}

fn push_define(out: &mut String, name: &str, value: impl std::fmt::Display) {
    out.push_str(&format!("#define {name} {value}\n"));
}

/// Shader defines describing both layouts, with the active format selected
///
/// Texel offsets are plain integers; the shader samples at `offset + 0.5`.
pub fn shader_defines(active: LightTextureFormat) -> String {
    let mut out = String::new();
    push_define(&mut out, "CLUSTER_TEXTURE_LAYOUT_VERSION", LIGHT_LAYOUT_VERSION);
    out.push_str(&format!("#define CLUSTER_TEXTURE_{}\n", active.define_suffix()));

    for texel in CompactTexel::ALL {
        push_define(&mut out, &format!("CLUSTER_TEXTURE_8_{}", texel.define_name()), texel.column());
        if texel == CompactTexel::ATLAS_VIEWPORT_A {
            push_define(&mut out, "CLUSTER_TEXTURE_8_ATLAS_VIEWPORT_A", texel.column());
        } else if texel == CompactTexel::ATLAS_VIEWPORT_B {
            push_define(&mut out, "CLUSTER_TEXTURE_8_ATLAS_VIEWPORT_B", texel.column());
        }
    }
    push_define(&mut out, "CLUSTER_TEXTURE_8_COUNT_ALWAYS", CompactTexel::ALWAYS_COUNT);
    push_define(&mut out, "CLUSTER_TEXTURE_8_COUNT", CompactTexel::COUNT);

    for texel in FloatTexel::ALL {
        push_define(&mut out, &format!("CLUSTER_TEXTURE_F_{}", texel.define_name()), texel.column());
        if texel == FloatTexel::ATLAS_VIEWPORT {
            push_define(&mut out, "CLUSTER_TEXTURE_F_ATLAS_VIEWPORT", texel.column());
        }
    }
    push_define(&mut out, "CLUSTER_TEXTURE_F_COUNT", FloatTexel::COUNT);

    out
}
