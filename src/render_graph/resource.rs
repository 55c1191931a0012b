//! Resource names and the table that owns every named GPU texture

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use crate::backend::*;
use crate::resources::GpuTexture;

pub const BLOOM_MIP_CHAIN_MAX: u8 = 7;
pub const IBL_MIP_CHAIN_MAX: u32 = 7;

/// Asset path of the BRDF lookup table imported by the lighting pass
pub const BRDF_LUT_PATH: &str = "@res://images/brdf.hdr";

/// Asset path of the equirectangular sky baked into the environment cubemaps
pub const IBL_IMAGE_PATH: &str = "@res://images/ibl.hdr";

/// Name of a render graph resource
///
/// Each name has exactly one producer per graph: the pass that creates or
/// imports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceName {
    Depth,
    ShadowMap,
    PointShadow,
    Gbuffer0,
    Gbuffer1,
    Gbuffer2,
    HighlightSelect,
    Lighting,
    PostProcess,
    VoxelLighting,
    VoxelNormal,
    PathTracer,
    EnvCube,
    DiffuseCube,
    PrefilteredCube,
    BrdfLut,
    Ibl,
    BloomMip(u8),
}

impl ResourceName {
    /// Register the texture binds to when read as an SRV or written as a UAV
    pub fn slot(&self) -> u32 {
        match self {
            ResourceName::Gbuffer0 => 0,
            ResourceName::Gbuffer1 => 1,
            ResourceName::Gbuffer2 => 2,
            ResourceName::Depth => 3,
            ResourceName::ShadowMap => 4,
            ResourceName::PointShadow => 5,
            ResourceName::HighlightSelect => 6,
            ResourceName::Lighting => 7,
            ResourceName::BloomMip(_) => 8,
            ResourceName::PostProcess => 9,
            ResourceName::VoxelLighting => 10,
            ResourceName::VoxelNormal => 11,
            ResourceName::PathTracer => 12,
            ResourceName::EnvCube => 13,
            ResourceName::DiffuseCube => 14,
            ResourceName::PrefilteredCube => 15,
            ResourceName::BrdfLut => 16,
            ResourceName::Ibl => 17,
        }
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceName::Depth => "r:depth",
            ResourceName::ShadowMap => "r:shadow",
            ResourceName::PointShadow => "r:point_shadow",
            ResourceName::Gbuffer0 => "r:gbuffer0",
            ResourceName::Gbuffer1 => "r:gbuffer1",
            ResourceName::Gbuffer2 => "r:gbuffer2",
            ResourceName::HighlightSelect => "r:highlight_select",
            ResourceName::Lighting => "r:lighting",
            ResourceName::PostProcess => "r:post_process",
            ResourceName::VoxelLighting => "r:voxel_lighting",
            ResourceName::VoxelNormal => "r:voxel_normal",
            ResourceName::PathTracer => "r:pathtracer",
            ResourceName::EnvCube => "r:env_cube",
            ResourceName::DiffuseCube => "r:diffuse_cube",
            ResourceName::PrefilteredCube => "r:prefiltered_cube",
            ResourceName::BrdfLut => "r:brdf_lut",
            ResourceName::Ibl => "r:ibl",
            ResourceName::BloomMip(mip) => return write!(f, "r:bloom_{}", mip),
        };
        f.write_str(name)
    }
}

/// Supplies an imported texture, or `None` while it is not available yet
pub type ImportFn = Box<dyn Fn(&ResourceTable) -> Option<Arc<GpuTexture>> + Send + Sync>;

/// Owner of every GPU texture a render graph uses
///
/// Named textures are looked up by [`ResourceName`], decoded assets by their
/// asset path. Passes only borrow textures for the duration of a frame.
#[derive(Default)]
pub struct ResourceTable {
    textures: HashMap<ResourceName, Arc<GpuTexture>>,
    assets: HashMap<String, Arc<GpuTexture>>,
    pending_imports: Vec<(ResourceName, ImportFn)>,
    /// Named textures whose content a bake has not written yet
    deferred: HashSet<ResourceName>,
    /// Every texture this table created, named or not, in creation order
    owned: Vec<Arc<GpuTexture>>,
}

impl ResourceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a texture and, if it has a name, register it.
    ///
    /// # Panics
    /// Panics if `name` is already registered.
    pub fn create_texture(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        name: Option<ResourceName>,
        mut desc: GpuTextureDesc,
        sampler: &SamplerDesc,
    ) -> BackendResult<Arc<GpuTexture>> {
        if let Some(name) = name {
            assert!(
                !self.textures.contains_key(&name),
                "resource '{}' is registered twice",
                name
            );
            if desc.label.is_none() {
                desc.label = Some(name.to_string());
            }
        }

        let handle = backend.create_texture(&desc, sampler)?;
        let texture = Arc::new(GpuTexture {
            handle,
            desc,
            slot: name.map(|name| name.slot()),
            name,
        });

        if let Some(name) = name {
            self.textures.insert(name, texture.clone());
        }
        self.owned.push(texture.clone());
        Ok(texture)
    }

    /// Look up a named texture. Never allocates.
    pub fn find_texture(&self, name: ResourceName) -> Option<Arc<GpuTexture>> {
        self.textures.get(&name).cloned()
    }

    pub fn contains(&self, name: ResourceName) -> bool {
        self.textures.contains_key(&name)
    }

    /// Replace the texture registered under `name`, or register it
    pub fn update_texture(&mut self, name: ResourceName, texture: Arc<GpuTexture>) {
        self.textures.insert(name, texture);
    }

    /// Keep `name` unreadable until [`Self::mark_ready`] is called for it
    pub fn defer(&mut self, name: ResourceName) {
        self.deferred.insert(name);
    }

    /// Record that a pass has written the content of a deferred texture
    pub fn mark_ready(&mut self, name: ResourceName) {
        if self.deferred.remove(&name) {
            log::debug!("Resource '{}' is ready", name);
        }
    }

    /// Registered and holding content that may be sampled
    pub fn is_ready(&self, name: ResourceName) -> bool {
        self.textures.contains_key(&name) && !self.deferred.contains(&name)
    }

    /// Register an externally supplied texture, resolved lazily by [`Self::resolve_imports`]
    pub fn import(&mut self, name: ResourceName, supplier: ImportFn) {
        self.pending_imports.push((name, supplier));
        self.resolve_imports();
    }

    /// Run pending import suppliers, registering whatever they produce
    pub fn resolve_imports(&mut self) {
        if self.pending_imports.is_empty() {
            return;
        }

        let pending = std::mem::take(&mut self.pending_imports);
        for (name, supplier) in pending {
            match supplier(self) {
                Some(texture) => {
                    log::debug!("Imported resource '{}'", name);
                    self.textures.insert(name, texture);
                }
                None => self.pending_imports.push((name, supplier)),
            }
        }
    }

    /// Names whose import suppliers have not produced a texture yet
    pub fn pending_imports(&self) -> impl Iterator<Item = ResourceName> + '_ {
        self.pending_imports.iter().map(|(name, _)| *name)
    }

    /// Create a texture from a decoded asset and index it by asset path
    pub fn create_asset_texture(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        path: &str,
        image: &crate::resources::ImageData,
    ) -> BackendResult<Arc<GpuTexture>> {
        let (desc, sampler) = image.texture_desc(path);
        let generate_mips = desc.misc_flags.contains(ResourceMiscFlags::GENERATE_MIPS);
        let texture = self.create_texture(backend, None, desc, &sampler)?;
        if generate_mips {
            backend.generate_mipmap(texture.handle);
        }
        self.assets.insert(path.to_string(), texture.clone());
        Ok(texture)
    }

    pub fn find_asset(&self, path: &str) -> Option<Arc<GpuTexture>> {
        self.assets.get(path).cloned()
    }

    pub fn len(&self) -> usize {
        self.textures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.textures.is_empty()
    }

    /// Destroy every texture this table created
    pub fn destroy(&mut self, backend: &mut dyn GraphicsBackend) {
        for texture in self.owned.drain(..) {
            backend.destroy_texture(texture.handle);
        }
        self.textures.clear();
        self.assets.clear();
        self.pending_imports.clear();
        self.deferred.clear();
    }
}

impl fmt::Debug for ResourceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceTable")
            .field("textures", &self.textures.keys().collect::<Vec<_>>())
            .field("assets", &self.assets.keys().collect::<Vec<_>>())
            .field("pending_imports", &self.pending_imports().collect::<Vec<_>>())
            .field("deferred", &self.deferred)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::ImageData;

    fn color_desc() -> GpuTextureDesc {
        GpuTextureDesc::attachment(
            AttachmentType::Color2D,
            PixelFormat::R16G16B16A16_FLOAT,
            64,
            64,
            1,
        )
    }

    #[test]
    fn test_find_texture_is_stable() {
        let mut backend = RecordingBackend::new();
        let mut table = ResourceTable::new();
        table
            .create_texture(
                &mut backend,
                Some(ResourceName::Lighting),
                color_desc(),
                &SamplerDesc::point_clamp(),
            )
            .unwrap();

        let first = table.find_texture(ResourceName::Lighting).unwrap();
        let second = table.find_texture(ResourceName::Lighting).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.slot, Some(ResourceName::Lighting.slot()));
        assert_eq!(first.desc.label.as_deref(), Some("r:lighting"));
    }

    #[test]
    fn test_find_on_empty_table() {
        let table = ResourceTable::new();
        assert!(table.is_empty());
        assert!(table.find_texture(ResourceName::Depth).is_none());
    }

    #[test]
    fn test_unnamed_texture_is_not_registered() {
        let mut backend = RecordingBackend::new();
        let mut table = ResourceTable::new();
        let texture = table
            .create_texture(&mut backend, None, color_desc(), &SamplerDesc::point_clamp())
            .unwrap();
        assert!(table.is_empty());
        assert_eq!(texture.slot, None);
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_duplicate_registration_panics() {
        let mut backend = RecordingBackend::new();
        let mut table = ResourceTable::new();
        for _ in 0..2 {
            table
                .create_texture(
                    &mut backend,
                    Some(ResourceName::Depth),
                    color_desc(),
                    &SamplerDesc::point_clamp(),
                )
                .unwrap();
        }
    }

    #[test]
    fn test_creation_failure_propagates() {
        let mut backend = RecordingBackend::new();
        backend.fail_creation_of("r:lighting");
        let mut table = ResourceTable::new();
        let result = table.create_texture(
            &mut backend,
            Some(ResourceName::Lighting),
            color_desc(),
            &SamplerDesc::point_clamp(),
        );
        assert!(matches!(result, Err(BackendError::TextureCreationFailed(_))));
        assert!(!table.contains(ResourceName::Lighting));
    }

    #[test]
    fn test_import_resolves_once_asset_arrives() {
        let mut backend = RecordingBackend::new();
        let mut table = ResourceTable::new();
        table.import(
            ResourceName::BrdfLut,
            Box::new(|table: &ResourceTable| table.find_asset(BRDF_LUT_PATH)),
        );
        assert!(table.find_texture(ResourceName::BrdfLut).is_none());
        assert_eq!(table.pending_imports().collect::<Vec<_>>(), vec![ResourceName::BrdfLut]);

        let image = ImageData::solid_color([0, 0, 0, 255]);
        let asset = table.create_asset_texture(&mut backend, BRDF_LUT_PATH, &image).unwrap();
        table.resolve_imports();

        let imported = table.find_texture(ResourceName::BrdfLut).unwrap();
        assert!(Arc::ptr_eq(&imported, &asset));
        assert_eq!(table.pending_imports().count(), 0);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let mut backend = RecordingBackend::new();
        let mut table = ResourceTable::new();
        table
            .create_texture(
                &mut backend,
                Some(ResourceName::Depth),
                color_desc(),
                &SamplerDesc::point_clamp(),
            )
            .unwrap();
        table
            .create_texture(&mut backend, None, color_desc(), &SamplerDesc::point_clamp())
            .unwrap();
        assert_eq!(backend.live_texture_count(), 2);

        table.destroy(&mut backend);
        assert_eq!(backend.live_texture_count(), 0);
        assert!(table.is_empty());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ResourceName::Gbuffer1.to_string(), "r:gbuffer1");
        assert_eq!(ResourceName::BloomMip(3).to_string(), "r:bloom_3");
        assert_eq!(ResourceName::HighlightSelect.to_string(), "r:highlight_select");
    }

    #[test]
    fn test_update_texture_replaces_in_place() {
        let mut backend = RecordingBackend::new();
        let mut table = ResourceTable::new();
        let original = table
            .create_texture(
                &mut backend,
                Some(ResourceName::Lighting),
                color_desc(),
                &SamplerDesc::point_clamp(),
            )
            .unwrap();
        let resized = table
            .create_texture(
                &mut backend,
                None,
                GpuTextureDesc::attachment(
                    AttachmentType::Color2D,
                    PixelFormat::R16G16B16A16_FLOAT,
                    128,
                    128,
                    1,
                ),
                &SamplerDesc::point_clamp(),
            )
            .unwrap();

        table.update_texture(ResourceName::Lighting, resized.clone());
        let found = table.find_texture(ResourceName::Lighting).unwrap();
        assert!(Arc::ptr_eq(&found, &resized));
        assert!(!Arc::ptr_eq(&found, &original));
        assert_eq!(found.width(), 128);
        assert_eq!(table.len(), 1);

        // both textures are still owned and released together
        table.destroy(&mut backend);
        assert_eq!(backend.live_texture_count(), 0);
    }

    #[test]
    fn test_update_texture_registers_new_name() {
        let mut backend = RecordingBackend::new();
        let mut table = ResourceTable::new();
        let texture = table
            .create_texture(&mut backend, None, color_desc(), &SamplerDesc::point_clamp())
            .unwrap();
        assert!(!table.contains(ResourceName::PostProcess));

        table.update_texture(ResourceName::PostProcess, texture);
        assert!(table.contains(ResourceName::PostProcess));
    }

    #[test]
    fn test_deferred_texture_is_not_ready_until_marked() {
        let mut backend = RecordingBackend::new();
        let mut table = ResourceTable::new();
        assert!(!table.is_ready(ResourceName::EnvCube));

        table
            .create_texture(
                &mut backend,
                Some(ResourceName::EnvCube),
                color_desc(),
                &SamplerDesc::linear_clamp(),
            )
            .unwrap();
        table.defer(ResourceName::EnvCube);
        assert!(table.contains(ResourceName::EnvCube));
        assert!(!table.is_ready(ResourceName::EnvCube));

        table.mark_ready(ResourceName::EnvCube);
        assert!(table.is_ready(ResourceName::EnvCube));
    }
}
