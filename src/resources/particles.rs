//! GPU particle state
//!
//! Each emitter owns a set of structured buffers the particle compute shaders
//! simulate in place: a counter block, the dead list, two alive lists that
//! swap roles every frame and the particle pool itself.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

use crate::backend::*;
use crate::resources::constants::EmitterConstantBuffer;

pub const PARTICLE_COUNTER_SLOT: u32 = 16;
pub const DEAD_INDICES_SLOT: u32 = 17;
pub const ALIVE_INDICES_PRE_SIM_SLOT: u32 = 18;
pub const ALIVE_INDICES_POST_SIM_SLOT: u32 = 19;
pub const PARTICLE_DATA_SLOT: u32 = 20;

pub const PARTICLE_LOCAL_SIZE: u32 = 32;
pub const MAX_PARTICLE_COUNT: u32 = 1 << 20;

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
pub struct GpuParticle {
    pub position: Vec4,
    pub velocity: Vec4,
    pub color: Vec4,

    pub scale: f32,
    pub life_span: f32,
    pub life_remaining: f32,
    pub is_active: i32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ParticleCounter {
    pub alive_count: [i32; 2],
    pub dead_count: i32,
    pub simulation_count: i32,
    pub emission_count: i32,
}

/// Simulation buffers of one emitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParticleBuffers {
    pub counter: BufferHandle,
    pub dead: BufferHandle,
    pub alive: [BufferHandle; 2],
    pub particles: BufferHandle,
    pub capacity: u32,
    alive_index: usize,
}

impl ParticleBuffers {
    fn create(backend: &mut dyn GraphicsBackend, capacity: u32) -> BackendResult<Self> {
        let mut created = Vec::with_capacity(5);
        let result = Self::create_all(backend, capacity, &mut created);
        if result.is_err() {
            for buffer in created {
                backend.destroy_buffer(buffer);
            }
        }
        result
    }

    fn create_all(
        backend: &mut dyn GraphicsBackend,
        capacity: u32,
        created: &mut Vec<BufferHandle>,
    ) -> BackendResult<Self> {
        let mut create = |label: &str, slot: u32, element_size: usize, element_count: u32| {
            let buffer = backend.create_structured_buffer(&GpuBufferDesc {
                label: Some(label.to_string()),
                buffer_type: GpuBufferType::Structured,
                dynamic: false,
                slot,
                element_size: element_size as u32,
                element_count,
                offset: 0,
                initial_data: Some(Arc::from(vec![0u8; element_size * element_count as usize])),
            })?;
            created.push(buffer);
            Ok::<_, BackendError>(buffer)
        };

        let index_size = std::mem::size_of::<i32>();
        Ok(Self {
            counter: create(
                "particle_counter",
                PARTICLE_COUNTER_SLOT,
                std::mem::size_of::<ParticleCounter>(),
                1,
            )?,
            dead: create("particle_dead", DEAD_INDICES_SLOT, index_size, capacity)?,
            alive: [
                create("particle_alive_0", ALIVE_INDICES_PRE_SIM_SLOT, index_size, capacity)?,
                create("particle_alive_1", ALIVE_INDICES_POST_SIM_SLOT, index_size, capacity)?,
            ],
            particles: create(
                "particle_data",
                PARTICLE_DATA_SLOT,
                std::mem::size_of::<GpuParticle>(),
                capacity,
            )?,
            capacity,
            alive_index: 0,
        })
    }

    pub fn pre_sim_index(&self) -> usize {
        self.alive_index
    }

    pub fn post_sim_index(&self) -> usize {
        1 - self.alive_index
    }

    /// Work groups covering every particle slot
    pub fn group_count(&self) -> u32 {
        self.capacity.div_ceil(PARTICLE_LOCAL_SIZE)
    }

    /// Bind the buffers the kickoff, emit and simulate shaders write
    pub fn bind_simulation(&self, backend: &mut dyn GraphicsBackend) {
        backend.bind_structured_buffer(PARTICLE_COUNTER_SLOT, self.counter);
        backend.bind_structured_buffer(DEAD_INDICES_SLOT, self.dead);
        let pre_sim = self.alive[self.pre_sim_index()];
        let post_sim = self.alive[self.post_sim_index()];
        backend.bind_structured_buffer(ALIVE_INDICES_PRE_SIM_SLOT, pre_sim);
        backend.bind_structured_buffer(ALIVE_INDICES_POST_SIM_SLOT, post_sim);
        backend.bind_structured_buffer(PARTICLE_DATA_SLOT, self.particles);
    }

    pub fn unbind_simulation(backend: &mut dyn GraphicsBackend) {
        for slot in [
            PARTICLE_COUNTER_SLOT,
            DEAD_INDICES_SLOT,
            ALIVE_INDICES_PRE_SIM_SLOT,
            ALIVE_INDICES_POST_SIM_SLOT,
            PARTICLE_DATA_SLOT,
        ] {
            backend.unbind_structured_buffer(slot);
        }
    }

    // fills the dead list with every index and zeroes the counters
    fn initialize(&self, backend: &mut dyn GraphicsBackend) {
        backend.set_pipeline_state(PipelineStateName::ParticleInit);
        backend.bind_structured_buffer(PARTICLE_COUNTER_SLOT, self.counter);
        backend.bind_structured_buffer(DEAD_INDICES_SLOT, self.dead);
        backend.dispatch(self.group_count(), 1, 1);
        backend.unbind_structured_buffer(PARTICLE_COUNTER_SLOT);
        backend.unbind_structured_buffer(DEAD_INDICES_SLOT);
    }

    fn swap_alive_lists(&mut self) {
        self.alive_index = 1 - self.alive_index;
    }

    fn destroy(self, backend: &mut dyn GraphicsBackend) {
        for buffer in [self.counter, self.dead, self.alive[0], self.alive[1], self.particles] {
            backend.destroy_buffer(buffer);
        }
    }
}

/// Keeps one [`ParticleBuffers`] per emitter of the extracted frame
#[derive(Debug, Default)]
pub struct ParticleSystem {
    emitters: Vec<ParticleBuffers>,
}

impl ParticleSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffers(&self) -> &[ParticleBuffers] {
        &self.emitters
    }

    /// Match the buffers to `emitters`, then write each emitter's alive list
    /// indices for this frame.
    ///
    /// New emitters get freshly initialized buffers; buffers of emitters that
    /// disappeared or changed capacity are released.
    pub fn update(
        &mut self,
        backend: &mut dyn GraphicsBackend,
        emitters: &mut [EmitterConstantBuffer],
    ) -> BackendResult<()> {
        while self.emitters.len() > emitters.len() {
            if let Some(buffers) = self.emitters.pop() {
                buffers.destroy(backend);
            }
        }

        for (index, emitter) in emitters.iter_mut().enumerate() {
            let capacity = Self::capacity_of(emitter);
            match self.emitters.get_mut(index) {
                Some(buffers) if buffers.capacity == capacity => buffers.swap_alive_lists(),
                Some(buffers) => {
                    log::debug!(
                        "Emitter {} capacity changed from {} to {}",
                        index,
                        buffers.capacity,
                        capacity
                    );
                    let replacement = ParticleBuffers::create(backend, capacity)?;
                    replacement.initialize(backend);
                    std::mem::replace(buffers, replacement).destroy(backend);
                }
                None => {
                    let buffers = ParticleBuffers::create(backend, capacity)?;
                    buffers.initialize(backend);
                    log::debug!(
                        "Created particle buffers for emitter {} ({} particles)",
                        index,
                        capacity
                    );
                    self.emitters.push(buffers);
                }
            }

            let buffers = &self.emitters[index];
            emitter.pre_sim_idx = buffers.pre_sim_index() as i32;
            emitter.post_sim_idx = buffers.post_sim_index() as i32;
        }
        Ok(())
    }

    fn capacity_of(emitter: &EmitterConstantBuffer) -> u32 {
        let requested = emitter.emitter_max_particle_count.max(1) as u32;
        if requested > MAX_PARTICLE_COUNT {
            log::warn!(
                "Emitter asks for {} particles, clamping to {}",
                requested,
                MAX_PARTICLE_COUNT
            );
        }
        requested.min(MAX_PARTICLE_COUNT)
    }

    pub fn destroy(mut self, backend: &mut dyn GraphicsBackend) {
        for buffers in self.emitters.drain(..) {
            buffers.destroy(backend);
        }
    }
}
