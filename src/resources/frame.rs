//! Per-frame constant buffers
//!
//! A [`FrameContext`] owns one constant buffer per [`ConstantBuffer`] kind.
//! The CPU rewrites them right before the passes of the same frame bind ranges
//! out of them, so a backend with several frames in flight gets one context
//! per frame.

use std::marker::PhantomData;

use crate::backend::*;
use crate::resources::constants::*;
use crate::scene::RenderData;

/// A constant buffer holding up to `capacity` elements of `T`
#[derive(Debug)]
pub struct ConstantBufferArray<T: ConstantBuffer> {
    buffer: BufferHandle,
    capacity: u32,
    _marker: PhantomData<T>,
}

impl<T: ConstantBuffer> ConstantBufferArray<T> {
    pub fn new(backend: &mut dyn GraphicsBackend, capacity: u32) -> BackendResult<Self> {
        let buffer = backend.create_constant_buffer(&GpuBufferDesc {
            label: Some(
                std::any::type_name::<T>()
                    .rsplit("::")
                    .next()
                    .unwrap_or("cbuffer")
                    .to_string(),
            ),
            buffer_type: GpuBufferType::Constant,
            dynamic: true,
            slot: T::SLOT,
            element_size: Self::element_size(),
            element_count: capacity,
            ..Default::default()
        })?;

        Ok(Self {
            buffer,
            capacity,
            _marker: PhantomData,
        })
    }

    pub fn buffer(&self) -> BufferHandle {
        self.buffer
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Upload `items` from the first element on. Items past capacity are dropped.
    pub fn update(&self, backend: &mut dyn GraphicsBackend, items: &[T]) {
        if items.is_empty() {
            return;
        }

        let count = items.len().min(self.capacity as usize);
        if count < items.len() {
            log::warn!(
                "{} elements submitted to a constant buffer of {}",
                items.len(),
                self.capacity
            );
        }

        backend.update_constant_buffer(self.buffer, bytemuck::cast_slice(&items[..count]));
    }

    /// Bind element `index` to the buffer's register
    pub fn bind(&self, backend: &mut dyn GraphicsBackend, index: u32) {
        debug_assert!(index < self.capacity);
        let size = Self::element_size();
        backend.bind_constant_buffer_range(self.buffer, T::SLOT, size, index * size);
    }

    fn element_size() -> u32 {
        std::mem::size_of::<T>() as u32
    }
}

/// Constant buffers of one in-flight frame
#[derive(Debug)]
pub struct FrameContext {
    pub batch: ConstantBufferArray<PerBatchConstantBuffer>,
    pub pass: ConstantBufferArray<PerPassConstantBuffer>,
    pub material: ConstantBufferArray<MaterialConstantBuffer>,
    pub bone: ConstantBufferArray<BoneConstantBuffer>,
    pub emitter: ConstantBufferArray<EmitterConstantBuffer>,
    pub point_shadow: ConstantBufferArray<PointShadowConstantBuffer>,
    pub per_frame: ConstantBufferArray<PerFrameConstantBuffer>,
}

impl FrameContext {
    pub const BATCH_CAPACITY: u32 = 4096 * 16;
    pub const PASS_CAPACITY: u32 = 32;
    pub const MATERIAL_CAPACITY: u32 = 2048 * 16;
    pub const BONE_CAPACITY: u32 = 16;
    pub const EMITTER_CAPACITY: u32 = 32;
    pub const POINT_SHADOW_CAPACITY: u32 = 6 * MAX_POINT_LIGHT_SHADOW_COUNT as u32;

    /// Create every buffer, releasing the ones already created if one fails
    pub fn new(backend: &mut dyn GraphicsBackend) -> BackendResult<Self> {
        let mut created = Vec::new();
        let result = Self::create_all(backend, &mut created);
        if result.is_err() {
            for buffer in created {
                backend.destroy_buffer(buffer);
            }
        }
        result
    }

    fn create_all(
        backend: &mut dyn GraphicsBackend,
        created: &mut Vec<BufferHandle>,
    ) -> BackendResult<Self> {
        fn track<T: ConstantBuffer>(
            created: &mut Vec<BufferHandle>,
            array: BackendResult<ConstantBufferArray<T>>,
        ) -> BackendResult<ConstantBufferArray<T>> {
            let array = array?;
            created.push(array.buffer);
            Ok(array)
        }

        Ok(Self {
            batch: track(created, ConstantBufferArray::new(backend, Self::BATCH_CAPACITY))?,
            pass: track(created, ConstantBufferArray::new(backend, Self::PASS_CAPACITY))?,
            material: track(created, ConstantBufferArray::new(backend, Self::MATERIAL_CAPACITY))?,
            bone: track(created, ConstantBufferArray::new(backend, Self::BONE_CAPACITY))?,
            emitter: track(created, ConstantBufferArray::new(backend, Self::EMITTER_CAPACITY))?,
            point_shadow: track(
                created,
                ConstantBufferArray::new(backend, Self::POINT_SHADOW_CAPACITY),
            )?,
            per_frame: track(created, ConstantBufferArray::new(backend, 1))?,
        })
    }

    /// Upload everything the draw-data extraction produced for this frame
    pub fn update(&self, backend: &mut dyn GraphicsBackend, data: &RenderData) {
        self.batch.update(backend, &data.batches);
        self.pass.update(backend, &data.passes);
        self.material.update(backend, &data.materials);
        self.bone.update(backend, &data.bones);
        self.emitter.update(backend, &data.emitters);
        self.point_shadow.update(backend, &data.point_shadows);
        self.per_frame.update(backend, std::slice::from_ref(&data.per_frame));
    }

    pub fn bind_per_frame(&self, backend: &mut dyn GraphicsBackend) {
        self.per_frame.bind(backend, 0);
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        for buffer in [
            self.batch.buffer,
            self.pass.buffer,
            self.material.buffer,
            self.bone.buffer,
            self.emitter.buffer,
            self.point_shadow.buffer,
            self.per_frame.buffer,
        ] {
            backend.destroy_buffer(buffer);
        }
    }
}

/// Ring of frame contexts, one per frame in flight
#[derive(Debug)]
pub struct FrameContexts {
    frames: Vec<FrameContext>,
    current: usize,
}

impl FrameContexts {
    pub fn new(backend: &mut dyn GraphicsBackend) -> BackendResult<Self> {
        let count = backend.backend_type().frames_in_flight();
        let frames = (0..count)
            .map(|_| FrameContext::new(backend))
            .collect::<BackendResult<Vec<_>>>()?;

        log::info!("Created {} frame context(s)", frames.len());
        Ok(Self { frames, current: 0 })
    }

    pub fn current(&self) -> &FrameContext {
        &self.frames[self.current]
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Move to the next context once the frame has been submitted
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.frames.len();
    }

    pub fn destroy(self, backend: &mut dyn GraphicsBackend) {
        for frame in self.frames {
            frame.destroy(backend);
        }
    }
}
