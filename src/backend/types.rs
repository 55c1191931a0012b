//! Backend-independent resource descriptors and pipeline enums

use std::sync::Arc;

/// Pixel format of a GPU texture
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PixelFormat {
    #[default]
    Unknown,
    R8_UINT,
    R8G8B8A8_UNORM,
    R16G16B16A16_FLOAT,
    R32_FLOAT,
    R32G32B32_FLOAT,
    R32G32B32A32_FLOAT,
    R24G8_TYPELESS,
    R32G8X24_TYPELESS,
    D24_UNORM_S8_UINT,
    D32_FLOAT,
}

impl PixelFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            PixelFormat::R24G8_TYPELESS
                | PixelFormat::R32G8X24_TYPELESS
                | PixelFormat::D24_UNORM_S8_UINT
                | PixelFormat::D32_FLOAT
        )
    }

    /// Floating point formats sampled without mipmaps (HDR images, LUTs)
    pub fn is_hdr(&self) -> bool {
        matches!(
            self,
            PixelFormat::R32_FLOAT | PixelFormat::R32G32B32_FLOAT | PixelFormat::R32G32B32A32_FLOAT
        )
    }

    pub fn bytes_per_pixel(&self) -> u32 {
        match self {
            PixelFormat::Unknown => 0,
            PixelFormat::R8_UINT => 1,
            PixelFormat::R8G8B8A8_UNORM
            | PixelFormat::R32_FLOAT
            | PixelFormat::R24G8_TYPELESS
            | PixelFormat::D24_UNORM_S8_UINT
            | PixelFormat::D32_FLOAT => 4,
            PixelFormat::R16G16B16A16_FLOAT | PixelFormat::R32G8X24_TYPELESS => 8,
            PixelFormat::R32G32B32_FLOAT => 12,
            PixelFormat::R32G32B32A32_FLOAT => 16,
        }
    }
}

/// Texture dimension, also used to pick the binding point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dimension {
    Texture1D,
    Texture1DArray,
    #[default]
    Texture2D,
    Texture2DArray,
    TextureCube,
    TextureCubeArray,
    Texture3D,
}

/// What role a texture plays when attached to a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AttachmentType {
    #[default]
    None,
    Color2D,
    ColorCube,
    Depth2D,
    DepthStencil2D,
    Shadow2D,
    ShadowCubeArray,
    RwTexture,
}

/// Bind flags of a GPU resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BindFlags(u32);

impl BindFlags {
    pub const NONE: Self = Self(0);
    pub const VERTEX_BUFFER: Self = Self(1 << 0);
    pub const INDEX_BUFFER: Self = Self(1 << 1);
    pub const CONSTANT_BUFFER: Self = Self(1 << 2);
    pub const SHADER_RESOURCE: Self = Self(1 << 3);
    pub const STREAM_OUTPUT: Self = Self(1 << 4);
    pub const RENDER_TARGET: Self = Self(1 << 5);
    pub const DEPTH_STENCIL: Self = Self(1 << 6);
    pub const UNORDERED_ACCESS: Self = Self(1 << 7);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for BindFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for BindFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Miscellaneous resource flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResourceMiscFlags(u32);

impl ResourceMiscFlags {
    pub const NONE: Self = Self(0);
    pub const GENERATE_MIPS: Self = Self(1 << 0);
    pub const SHARED: Self = Self(1 << 1);
    pub const TEXTURE_CUBE: Self = Self(1 << 2);
    pub const DRAW_INDIRECT_ARGS: Self = Self(1 << 3);
    pub const BUFFER_ALLOW_RAW_VIEWS: Self = Self(1 << 4);
    pub const BUFFER_STRUCTURED: Self = Self(1 << 5);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for ResourceMiscFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ResourceMiscFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Texture descriptor
///
/// `initial_data` is only read while the backend creates the texture.
#[derive(Debug, Clone)]
pub struct GpuTextureDesc {
    pub label: Option<String>,
    pub attachment_type: AttachmentType,
    pub dimension: Dimension,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub array_size: u32,
    pub format: PixelFormat,
    pub bind_flags: BindFlags,
    pub misc_flags: ResourceMiscFlags,
    pub initial_data: Option<Arc<[u8]>>,
}

impl Default for GpuTextureDesc {
    fn default() -> Self {
        Self {
            label: None,
            attachment_type: AttachmentType::None,
            dimension: Dimension::Texture2D,
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_size: 1,
            format: PixelFormat::R8G8B8A8_UNORM,
            bind_flags: BindFlags::SHADER_RESOURCE,
            misc_flags: ResourceMiscFlags::NONE,
            initial_data: None,
        }
    }
}

impl GpuTextureDesc {
    /// Descriptor of a single-mip 2D render attachment.
    ///
    /// Bind flags follow the attachment type: color targets are render targets,
    /// depth and shadow targets are depth-stencil, and every attachment is also
    /// a shader resource so later passes can sample it.
    pub fn attachment(
        attachment_type: AttachmentType,
        format: PixelFormat,
        width: u32,
        height: u32,
        array_size: u32,
    ) -> Self {
        let mut desc = Self {
            attachment_type,
            format,
            width,
            height,
            array_size,
            ..Default::default()
        };

        match attachment_type {
            AttachmentType::Color2D | AttachmentType::RwTexture => {
                desc.bind_flags |= BindFlags::RENDER_TARGET;
            }
            AttachmentType::ColorCube => {
                desc.dimension = Dimension::TextureCube;
                desc.misc_flags |= ResourceMiscFlags::TEXTURE_CUBE;
                desc.bind_flags |= BindFlags::RENDER_TARGET;
            }
            AttachmentType::Depth2D | AttachmentType::DepthStencil2D | AttachmentType::Shadow2D => {
                desc.bind_flags |= BindFlags::DEPTH_STENCIL;
            }
            AttachmentType::ShadowCubeArray => {
                desc.dimension = Dimension::TextureCubeArray;
                desc.misc_flags |= ResourceMiscFlags::TEXTURE_CUBE;
                desc.bind_flags |= BindFlags::DEPTH_STENCIL;
            }
            AttachmentType::None => {}
        }

        desc
    }

    /// Cubic 3D texture with a full mip chain, written from compute and
    /// rasterization alike
    pub fn volume(format: PixelFormat, size: u32) -> Self {
        let mut desc = Self {
            attachment_type: AttachmentType::RwTexture,
            dimension: Dimension::Texture3D,
            format,
            width: size,
            height: size,
            depth: size,
            mip_levels: size.max(1).ilog2().max(1),
            ..Default::default()
        };
        desc.bind_flags |= BindFlags::RENDER_TARGET | BindFlags::UNORDERED_ACCESS;
        desc.misc_flags |= ResourceMiscFlags::GENERATE_MIPS;
        desc
    }

    /// Add unordered access for compute writes
    pub fn with_unordered_access(mut self) -> Self {
        self.bind_flags |= BindFlags::UNORDERED_ACCESS;
        self
    }

    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }
}

/// GPU buffer kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GpuBufferType {
    #[default]
    Unknown,
    Vertex,
    Index,
    Constant,
    Structured,
}

/// Buffer descriptor
#[derive(Debug, Clone, Default)]
pub struct GpuBufferDesc {
    pub label: Option<String>,
    pub buffer_type: GpuBufferType,
    pub dynamic: bool,
    pub slot: u32,
    pub element_size: u32,
    pub element_count: u32,
    pub offset: u32,
    pub initial_data: Option<Arc<[u8]>>,
}

impl GpuBufferDesc {
    pub fn size_in_bytes(&self) -> u64 {
        self.element_size as u64 * self.element_count as u64
    }
}

/// Filter mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Point,
    Linear,
    LinearMipmapLinear,
}

/// Address mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Wrap,
    Clamp,
    Border,
}

/// Comparison used by shadow samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareFunction {
    Never,
    Less,
    LessEqual,
    Greater,
    Always,
}

/// Sampler descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub min_filter: FilterMode,
    pub mag_filter: FilterMode,
    pub mode_u: AddressMode,
    pub mode_v: AddressMode,
    pub mode_w: AddressMode,
    pub compare: Option<CompareFunction>,
}

impl SamplerDesc {
    pub fn point_clamp() -> Self {
        Self::new(FilterMode::Point, FilterMode::Point, AddressMode::Clamp)
    }

    pub fn linear_clamp() -> Self {
        Self::new(FilterMode::Linear, FilterMode::Linear, AddressMode::Clamp)
    }

    pub fn linear_mipmap() -> Self {
        Self::new(FilterMode::LinearMipmapLinear, FilterMode::Linear, AddressMode::Wrap)
    }

    /// Trilinear minification, point magnification, black outside the volume
    pub fn volume() -> Self {
        Self::new(FilterMode::LinearMipmapLinear, FilterMode::Point, AddressMode::Border)
    }

    pub fn shadow_map() -> Self {
        Self {
            compare: Some(CompareFunction::LessEqual),
            ..Self::new(FilterMode::Linear, FilterMode::Linear, AddressMode::Border)
        }
    }

    fn new(min_filter: FilterMode, mag_filter: FilterMode, mode: AddressMode) -> Self {
        Self {
            min_filter,
            mag_filter,
            mode_u: mode,
            mode_v: mode,
            mode_w: mode,
            compare: None,
        }
    }
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self::point_clamp()
    }
}

/// Viewport rectangle in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub top_left_x: u32,
    pub top_left_y: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            top_left_x: 0,
            top_left_y: 0,
        }
    }
}

/// Which parts of a framebuffer a clear touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClearFlags(u32);

impl ClearFlags {
    pub const COLOR: Self = Self(1 << 0);
    pub const DEPTH: Self = Self(1 << 1);
    pub const STENCIL: Self = Self(1 << 2);
    pub const ALL: Self = Self(0b111);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for ClearFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Pipeline states the built-in render graphs select
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStateName {
    Gbuffer,
    GbufferDoubleSided,
    DepthOnly,
    PointShadow,
    Lighting,
    EnvSkybox,
    EnvSkyboxToCubeMap,
    DiffuseIrradiance,
    Prefilter,
    ForwardTransparent,
    BloomSetup,
    BloomDownsample,
    BloomUpsample,
    Tone,
    PathTracer,
    Highlight,
    Voxelization,
    VoxelizationPre,
    VoxelizationPost,
    ParticleInit,
    ParticleKickoff,
    ParticleEmit,
    ParticleSim,
    ParticleRendering,
    DebugImage,
}
