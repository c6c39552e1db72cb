//! In-memory stand-ins for the Vulkan backend, used by the frame loop tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use ash::vk;
use gfx_hal::{error::GfxHalError, error::Result as HalResult, SwapchainConfig};
use shared::{PerDrawable, UniformBufferObject};

use crate::backend::{FrameRenderer, ImageChain, SlotSync, SurfaceBackend, SurfaceSupport};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct Recorder {
    pub support: SurfaceSupport,
    pub fail_query: bool,
    pub next_chain_id: u32,
    pub built: Vec<(u32, Option<u32>, SwapchainConfig)>,
    pub destroyed: Vec<u32>,
    pub idle_waits: usize,
    pub acquire_script: VecDeque<HalResult<(u32, bool)>>,
    pub present_script: VecDeque<HalResult<bool>>,
    pub acquires: usize,
    pub presents: Vec<(u32, u32)>,
    pub slot_waits: Vec<usize>,
    pub slot_resets: Vec<usize>,
    pub uniforms: Vec<(usize, PerDrawable<UniformBufferObject>)>,
    pub submits: Vec<(usize, u32, u32)>,
    pub fail_uniforms: bool,
    pub fail_submit: bool,
    /// Extra images handed out on top of the requested count.
    pub extra_images: u32,
    pub short_images: u32,
}

pub type Shared = Rc<RefCell<Recorder>>;

pub fn surface_support(current_extent: vk::Extent2D) -> SurfaceSupport {
    SurfaceSupport {
        capabilities: vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 4,
            current_extent,
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE
                | vk::CompositeAlphaFlagsKHR::INHERIT,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST,
        },
        formats: vec![
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ],
        present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
    }
}

/// A recorder whose surface follows the window size.
pub fn recorder() -> Shared {
    Rc::new(RefCell::new(Recorder {
        support: surface_support(vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        }),
        ..Default::default()
    }))
}

#[derive(Debug)]
pub struct MockChain {
    pub id: u32,
    pub config: SwapchainConfig,
    pub images: u32,
}

impl ImageChain for MockChain {
    fn image_count(&self) -> u32 {
        self.images
    }

    fn derived_resource_count(&self) -> usize {
        self.images as usize
    }

    fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    fn format(&self) -> vk::Format {
        self.config.surface_format.format
    }
}

pub struct MockSurface(pub Shared);

impl SurfaceBackend for MockSurface {
    type Chain = MockChain;

    fn query_support(&self) -> HalResult<SurfaceSupport> {
        let rec = self.0.borrow();
        if rec.fail_query {
            return Err(GfxHalError::SurfaceLost);
        }
        Ok(rec.support.clone())
    }

    fn build_chain(
        &mut self,
        config: &SwapchainConfig,
        previous: Option<&MockChain>,
    ) -> HalResult<MockChain> {
        let mut rec = self.0.borrow_mut();
        rec.next_chain_id += 1;
        let id = rec.next_chain_id;
        rec.built.push((id, previous.map(|c| c.id), *config));
        let images = (config.image_count + rec.extra_images).saturating_sub(rec.short_images);
        Ok(MockChain {
            id,
            config: *config,
            images,
        })
    }

    fn destroy_chain(&mut self, chain: MockChain) {
        self.0.borrow_mut().destroyed.push(chain.id);
    }

    fn acquire_image(
        &mut self,
        chain: &MockChain,
        _timeout: Duration,
        _signal: vk::Semaphore,
    ) -> HalResult<(u32, bool)> {
        let mut rec = self.0.borrow_mut();
        let n = rec.acquires as u32;
        rec.acquires += 1;
        rec.acquire_script
            .pop_front()
            .unwrap_or(Ok((n % chain.images, false)))
    }

    fn present_image(
        &mut self,
        chain: &MockChain,
        image_index: u32,
        _wait: vk::Semaphore,
    ) -> HalResult<bool> {
        let mut rec = self.0.borrow_mut();
        rec.presents.push((chain.id, image_index));
        rec.present_script.pop_front().unwrap_or(Ok(false))
    }

    fn wait_idle(&self) -> HalResult<()> {
        self.0.borrow_mut().idle_waits += 1;
        Ok(())
    }
}

pub struct MockSlot {
    pub id: usize,
    pub rec: Shared,
    pub time_out: Cell<bool>,
    /// Cleared by `reset`, set again once a submission completes.
    pub signaled: Cell<bool>,
}

pub fn slots(rec: &Shared, count: usize) -> Vec<MockSlot> {
    (0..count)
        .map(|id| MockSlot {
            id,
            rec: rec.clone(),
            time_out: Cell::new(false),
            signaled: Cell::new(true),
        })
        .collect()
}

impl SlotSync for MockSlot {
    fn image_available(&self) -> vk::Semaphore {
        vk::Semaphore::null()
    }

    fn render_finished(&self) -> vk::Semaphore {
        vk::Semaphore::null()
    }

    fn wait(&self, _timeout: Duration) -> HalResult<()> {
        self.rec.borrow_mut().slot_waits.push(self.id);
        if self.time_out.get() || !self.signaled.get() {
            return Err(GfxHalError::Timeout);
        }
        Ok(())
    }

    fn reset(&self) -> HalResult<()> {
        self.rec.borrow_mut().slot_resets.push(self.id);
        self.signaled.set(false);
        Ok(())
    }
}

pub struct MockRenderer(pub Shared);

impl FrameRenderer for MockRenderer {
    type Slot = MockSlot;
    type Chain = MockChain;

    fn update_uniforms(
        &mut self,
        slot_index: usize,
        uniforms: &PerDrawable<UniformBufferObject>,
    ) -> Result<()> {
        let mut rec = self.0.borrow_mut();
        if rec.fail_uniforms {
            return Err(GfxHalError::OutOfMemory("device").into());
        }
        rec.uniforms.push((slot_index, uniforms.clone()));
        Ok(())
    }

    fn submit(
        &mut self,
        slot_index: usize,
        slot: &MockSlot,
        chain: &MockChain,
        image_index: u32,
    ) -> Result<()> {
        if self.0.borrow().fail_submit {
            return Err(GfxHalError::DeviceLost.into());
        }
        assert_eq!(slot.id, slot_index);
        slot.reset()?;
        self.0
            .borrow_mut()
            .submits
            .push((slot_index, chain.id, image_index));
        // Work completes immediately.
        slot.signaled.set(true);
        Ok(())
    }
}
