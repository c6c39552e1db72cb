mod error;
mod geo;

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use ash::vk;
use gfx_hal::{device::Device, instance::Instance, queue::Queue, Fence};
use tracing::{debug, error, trace, warn};

pub use error::{ResourceManagerError, Result};
pub use geo::Geometry;

use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc},
    MemoryLocation,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageViewHandle(u64);

#[derive(Debug, Clone)]
pub struct BufferInfo {
    pub handle: BufferHandle,
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub mapped_ptr: Option<*mut u8>,
}

#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub handle: ImageHandle,
    pub image: vk::Image,
    pub default_view_handle: Option<ImageViewHandle>,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub usage: vk::ImageUsageFlags,
}

#[derive(Debug, Clone)]
pub struct ImageViewInfo {
    pub handle: ImageViewHandle,
    pub view: vk::ImageView,
}

struct InternalBufferInfo {
    device: Arc<Device>,
    allocator: Arc<Mutex<Allocator>>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    handle: BufferHandle,
}

impl Drop for InternalBufferInfo {
    fn drop(&mut self) {
        trace!("Dropping InternalBufferInfo for handle: {:?}", self.handle);
        if let Some(allocation) = self.allocation.take() {
            match self.allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!(
                            "Failed to free allocation for buffer handle {:?}, {}",
                            self.handle, e
                        );
                    }
                }
                Err(_) => error!(
                    "Allocator mutex poisoned, leaking allocation of buffer {:?}",
                    self.handle
                ),
            }
        }
        unsafe {
            self.device.raw().destroy_buffer(self.buffer, None);
        }
        trace!("Destroyed vk::Buffer for handle {:?}", self.handle);
    }
}

struct InternalImageInfo {
    device: Arc<Device>,
    allocator: Arc<Mutex<Allocator>>,
    image: vk::Image,
    default_view_handle: Option<ImageViewHandle>,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent3D,
    usage: vk::ImageUsageFlags,
    handle: ImageHandle,
}

impl Drop for InternalImageInfo {
    fn drop(&mut self) {
        trace!("Dropping InternalImageInfo for handle {:?}", self.handle);
        if let Some(allocation) = self.allocation.take() {
            match self.allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!(
                            "Failed to free allocation for image handle {:?}: {}",
                            self.handle, e
                        );
                    }
                }
                Err(_) => error!(
                    "Allocator mutex poisoned, leaking allocation of image {:?}",
                    self.handle
                ),
            }
        }
        unsafe {
            self.device.raw().destroy_image(self.image, None);
        }
        trace!("Destroyed vk::Image for handle {:?}", self.handle);
    }
}

struct InternalImageViewInfo {
    device: Arc<Device>,
    view: vk::ImageView,
    handle: ImageViewHandle,
}

impl Drop for InternalImageViewInfo {
    fn drop(&mut self) {
        unsafe {
            self.device.raw().destroy_image_view(self.view, None);
        }
        trace!("Destroyed vk::ImageView for handle {:?}", self.handle);
    }
}

struct TransferSetup {
    command_pool: vk::CommandPool,
    queue: Arc<Queue>,
    fence: Fence,
}

/// Owns every buffer, image and image view allocated through gpu-allocator.
///
/// Resources are addressed by opaque handles; dropping the manager (or calling the
/// matching `destroy_*`) releases both the Vulkan object and its memory.
pub struct ResourceManager {
    _instance: Arc<Instance>,
    device: Arc<Device>,
    allocator: Arc<Mutex<Allocator>>,
    buffers: Mutex<HashMap<u64, InternalBufferInfo>>,
    images: Mutex<HashMap<u64, InternalImageInfo>>,
    image_views: Mutex<HashMap<u64, InternalImageViewInfo>>,
    next_id: AtomicU64,
    transfer_setup: Mutex<TransferSetup>,
}

impl ResourceManager {
    /// Creates a new ResourceManager.
    pub fn new(instance: Arc<Instance>, device: Arc<Device>) -> Result<Self> {
        debug!("Initializing ResourceManager...");
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.ash_instance().clone(),
            device: device.raw().clone(),
            physical_device: device.physical_device_handle(),
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;
        debug!("GPU Allocator created.");

        let queue_family_index = device
            .transfer_queue_family_index()
            .unwrap_or(device.graphics_queue_family_index());

        let queue = device
            .get_queue(queue_family_index, 0)
            .ok_or(ResourceManagerError::NoTransferQueue)?;

        let pool_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT)
            .queue_family_index(queue_family_index);
        let command_pool = unsafe { device.raw().create_command_pool(&pool_info, None)? };

        let fence = Fence::new(device.clone(), false)?;

        Ok(Self {
            _instance: instance,
            device,
            allocator: Arc::new(Mutex::new(allocator)),
            buffers: Mutex::new(HashMap::new()),
            images: Mutex::new(HashMap::new()),
            image_views: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            transfer_setup: Mutex::new(TransferSetup {
                command_pool,
                queue,
                fence,
            }),
        })
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Allocates a one-shot command buffer, records `record_fn` into it, submits it
    /// and blocks until the transfer fence signals.
    unsafe fn submit_commands_and_wait<F>(
        &self,
        transfer_setup: &TransferSetup,
        record_fn: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer) -> Result<()>,
    {
        let device_raw = self.device.raw();

        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(transfer_setup.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = device_raw
            .allocate_command_buffers(&alloc_info)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                ResourceManagerError::TransferFailed("no command buffer allocated".to_string())
            })?;
        trace!("Allocated temporary command buffer for transfer.");

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        device_raw.begin_command_buffer(command_buffer, &begin_info)?;

        let record_result = record_fn(command_buffer);
        device_raw.end_command_buffer(command_buffer)?;
        record_result?;

        let submits =
            [vk::SubmitInfo::default().command_buffers(std::slice::from_ref(&command_buffer))];
        transfer_setup
            .queue
            .submit(&submits, Some(&transfer_setup.fence))?;
        trace!("Transfer command buffer submitted.");

        transfer_setup.fence.wait(None)?;

        device_raw.free_command_buffers(transfer_setup.command_pool, &[command_buffer]);
        transfer_setup.fence.reset()?;

        Ok(())
    }

    /// Creates a Vulkan buffer and allocates/binds memory for it.
    ///
    /// Buffers in `CpuToGpu` memory stay persistently mapped; see [`BufferInfo::mapped_ptr`].
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<BufferHandle> {
        self.create_buffer_shared(size, usage, location, &[])
    }

    /// Like [`ResourceManager::create_buffer`], but usable from every queue family in
    /// `queue_families` without ownership transfers when more than one is given.
    fn create_buffer_shared(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        queue_families: &[u32],
    ) -> Result<BufferHandle> {
        trace!(
            "Creating buffer: size={}, usage={:?}, location={:?}, families={:?}",
            size,
            usage,
            location,
            queue_families
        );
        if size == 0 {
            return Err(ResourceManagerError::Other(
                "Cannot create a zero-sized buffer".to_string(),
            ));
        }
        let buffer_info = buffer_create_info(size, usage, queue_families);

        let buffer = unsafe { self.device.raw().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { self.device.raw().get_buffer_memory_requirements(buffer) };

        let allocation = match self.allocator.lock()?.allocate(&AllocationCreateDesc {
            name: &format!("buffer_usage_{:?}_loc_{:?}", usage, location),
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.raw().destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        unsafe {
            self.device
                .raw()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = BufferHandle(id);

        self.buffers.lock()?.insert(
            id,
            InternalBufferInfo {
                device: self.device.clone(),
                allocator: self.allocator.clone(),
                buffer,
                allocation: Some(allocation),
                size,
                usage,
                handle,
            },
        );
        debug!("Buffer created successfully: handle={:?}", handle);
        Ok(handle)
    }

    /// Creates a buffer in `location` and fills it with `data` through a staging copy.
    pub fn create_buffer_init(
        &self,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        data: &[u8],
    ) -> Result<BufferHandle> {
        let size = data.len() as vk::DeviceSize;
        if size == 0 {
            return Err(ResourceManagerError::Other(
                "Cannot create buffer with empty data".to_string(),
            ));
        }
        debug!(
            "Creating buffer with init data: size={}, usage={:?}, location={:?}",
            size, usage, location
        );

        // The copy may run on a dedicated transfer family while draws read on graphics.
        let transfer_family = self.transfer_setup.lock()?.queue.family_index();
        let families =
            upload_sharing_families(self.device.graphics_queue_family_index(), transfer_family);
        let staging_handle =
            self.create_buffer(size, vk::BufferUsageFlags::TRANSFER_SRC, MemoryLocation::CpuToGpu)?;
        if let Err(e) = self.write_buffer(staging_handle, data) {
            self.release_buffer_logged(staging_handle, "staging");
            return Err(e);
        }

        let dest_handle = match self.create_buffer_shared(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            location,
            &families,
        ) {
            Ok(handle) => handle,
            Err(e) => {
                self.release_buffer_logged(staging_handle, "staging");
                return Err(e);
            }
        };

        let copy_result = self.copy_buffer(staging_handle, dest_handle, size);
        self.release_buffer_logged(staging_handle, "staging");
        if let Err(e) = copy_result {
            self.release_buffer_logged(dest_handle, "upload destination");
            return Err(e);
        }

        Ok(dest_handle)
    }

    fn copy_buffer(&self, src: BufferHandle, dst: BufferHandle, size: vk::DeviceSize) -> Result<()> {
        let transfer_setup = self.transfer_setup.lock()?;
        let src = self.get_buffer_info(src)?.buffer;
        let dst = self.get_buffer_info(dst)?.buffer;
        unsafe {
            self.submit_commands_and_wait(&transfer_setup, |cmd| {
                let region = vk::BufferCopy::default().size(size);
                self.device.raw().cmd_copy_buffer(cmd, src, dst, &[region]);
                Ok(())
            })
        }
    }

    /// Destroys `handle` on a cleanup path, where a second error has nowhere to go.
    pub(crate) fn release_buffer_logged(&self, handle: BufferHandle, what: &str) {
        if let Err(e) = self.destroy_buffer(handle) {
            error!("Failed to release {} buffer {:?}: {}", what, handle, e);
        }
    }

    /// Copies `data` into the start of a mapped (host visible) buffer.
    pub fn write_buffer(&self, handle: BufferHandle, data: &[u8]) -> Result<()> {
        let info = self.get_buffer_info(handle)?;
        if data.len() as vk::DeviceSize > info.size {
            return Err(ResourceManagerError::Other(format!(
                "write of {} bytes exceeds buffer {:?} of {} bytes",
                data.len(),
                handle,
                info.size
            )));
        }
        let mapping = info.mapped_ptr.ok_or(ResourceManagerError::NotMapped)?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapping, data.len());
        }
        Ok(())
    }

    /// Creates a Vulkan image, allocates/binds memory for it and creates a default view.
    /// Does not handle data uploads or layout transitions.
    pub fn create_image(
        &self,
        create_info: &vk::ImageCreateInfo,
        location: MemoryLocation,
        aspect_flags: vk::ImageAspectFlags,
    ) -> Result<ImageHandle> {
        trace!(
            "Creating image: format={:?}, extent={:?}, usage={:?}, location={:?}",
            create_info.format,
            create_info.extent,
            create_info.usage,
            location
        );

        let image = unsafe { self.device.raw().create_image(create_info, None)? };
        let requirements = unsafe { self.device.raw().get_image_memory_requirements(image) };
        let allocation = match self.allocator.lock()?.allocate(&AllocationCreateDesc {
            name: &format!(
                "image_fmt_{:?}_usage_{:?}",
                create_info.format, create_info.usage
            ),
            requirements,
            location,
            linear: create_info.tiling == vk::ImageTiling::LINEAR,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        }) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { self.device.raw().destroy_image(image, None) };
                return Err(e.into());
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = ImageHandle(id);
        // Registered before binding so a failure below still frees the allocation.
        self.images.lock()?.insert(
            id,
            InternalImageInfo {
                device: self.device.clone(),
                allocator: self.allocator.clone(),
                image,
                default_view_handle: None,
                allocation: Some(allocation),
                format: create_info.format,
                extent: create_info.extent,
                usage: create_info.usage,
                handle,
            },
        );

        let bound = {
            let images = self.images.lock()?;
            let internal = images
                .get(&id)
                .ok_or(ResourceManagerError::HandleNotFound(id))?;
            let allocation = internal
                .allocation
                .as_ref()
                .ok_or(ResourceManagerError::HandleNotFound(id))?;
            unsafe {
                self.device
                    .raw()
                    .bind_image_memory(image, allocation.memory(), allocation.offset())
            }
        };
        if let Err(e) = bound {
            self.destroy_image(handle)?;
            return Err(e.into());
        }

        let view_info = Self::build_default_view_info(create_info, aspect_flags);
        let view_handle = match self.create_image_view_internal(image, &view_info) {
            Ok(view_handle) => view_handle,
            Err(e) => {
                self.destroy_image(handle)?;
                return Err(e);
            }
        };
        if let Some(internal) = self.images.lock()?.get_mut(&id) {
            internal.default_view_handle = Some(view_handle);
        }

        debug!("Image created successfully: handle={:?}", handle);
        Ok(handle)
    }

    fn build_default_view_info<'a>(
        image_create_info: &vk::ImageCreateInfo,
        aspect_flags: vk::ImageAspectFlags,
    ) -> vk::ImageViewCreateInfo<'a> {
        let view_type = if image_create_info.array_layers > 1 {
            vk::ImageViewType::TYPE_2D_ARRAY
        } else {
            vk::ImageViewType::TYPE_2D
        };

        vk::ImageViewCreateInfo::default()
            .view_type(view_type)
            .format(image_create_info.format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_flags)
                    .base_mip_level(0)
                    .level_count(image_create_info.mip_levels)
                    .base_array_layer(0)
                    .layer_count(image_create_info.array_layers),
            )
    }

    fn create_image_view_internal(
        &self,
        image: vk::Image,
        view_create_info: &vk::ImageViewCreateInfo,
    ) -> Result<ImageViewHandle> {
        let final_view_info = (*view_create_info).image(image);

        let view = unsafe {
            self.device
                .raw()
                .create_image_view(&final_view_info, None)?
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = ImageViewHandle(id);

        self.image_views.lock()?.insert(
            id,
            InternalImageViewInfo {
                device: self.device.clone(),
                view,
                handle,
            },
        );
        trace!("Image view registered: handle={:?}", handle);

        Ok(handle)
    }

    /// Destroys a buffer and frees its memory.
    pub fn destroy_buffer(&self, handle: BufferHandle) -> Result<()> {
        trace!("Requesting destroy for buffer handle {:?}", handle);
        let removed = self.buffers.lock()?.remove(&handle.0);
        if removed.is_some() {
            Ok(())
        } else {
            warn!(
                "Attempted to destroy non-existent buffer handle {:?}",
                handle
            );
            Err(ResourceManagerError::HandleNotFound(handle.0))
        }
    }

    /// Destroys an image, its default view, and frees its memory.
    pub fn destroy_image(&self, handle: ImageHandle) -> Result<()> {
        debug!("Requesting destroy for image handle {:?}", handle);
        let removed = self.images.lock()?.remove(&handle.0);
        match removed {
            Some(internal) => {
                if let Some(view) = internal.default_view_handle {
                    self.image_views.lock()?.remove(&view.0);
                }
                drop(internal);
                Ok(())
            }
            None => {
                warn!(
                    "Attempted to destroy non-existent image handle {:?}",
                    handle
                );
                Err(ResourceManagerError::HandleNotFound(handle.0))
            }
        }
    }

    /// Gets non-owning information about a buffer.
    pub fn get_buffer_info(&self, handle: BufferHandle) -> Result<BufferInfo> {
        let buffers_map = self.buffers.lock()?;
        buffers_map
            .get(&handle.0)
            .map(|internal| {
                let mapped_ptr = internal
                    .allocation
                    .as_ref()
                    .and_then(|a| a.mapped_ptr().map(|p| p.as_ptr() as *mut u8));

                BufferInfo {
                    handle: internal.handle,
                    buffer: internal.buffer,
                    size: internal.size,
                    usage: internal.usage,
                    mapped_ptr,
                }
            })
            .ok_or(ResourceManagerError::HandleNotFound(handle.0))
    }

    pub fn get_image_info(&self, handle: ImageHandle) -> Result<ImageInfo> {
        let images_map = self.images.lock()?;
        images_map
            .get(&handle.0)
            .map(|internal| ImageInfo {
                handle: internal.handle,
                image: internal.image,
                default_view_handle: internal.default_view_handle,
                format: internal.format,
                extent: internal.extent,
                usage: internal.usage,
            })
            .ok_or(ResourceManagerError::HandleNotFound(handle.0))
    }

    /// Gets non-owning information about a specific image view.
    pub fn get_image_view_info(&self, handle: ImageViewHandle) -> Result<ImageViewInfo> {
        let views_map = self.image_views.lock()?;
        views_map
            .get(&handle.0)
            .map(|internal| ImageViewInfo {
                handle: internal.handle,
                view: internal.view,
            })
            .ok_or(ResourceManagerError::HandleNotFound(handle.0))
    }
}

/// Families an uploaded buffer is shared between: empty (exclusive) when the copy runs
/// on the graphics family itself.
fn upload_sharing_families(graphics_family: u32, transfer_family: u32) -> Vec<u32> {
    if graphics_family == transfer_family {
        Vec::new()
    } else {
        vec![transfer_family, graphics_family]
    }
}

fn buffer_create_info(
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    queue_families: &[u32],
) -> vk::BufferCreateInfo<'_> {
    let info = vk::BufferCreateInfo::default().size(size).usage(usage);
    if queue_families.len() > 1 {
        info.sharing_mode(vk::SharingMode::CONCURRENT)
            .queue_family_indices(queue_families)
    } else {
        info.sharing_mode(vk::SharingMode::EXCLUSIVE)
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        debug!("Destroying ResourceManager...");
        if let Err(e) = self.device.wait_idle() {
            error!(
                "Failed to wait for device idle during ResourceManager drop: {}",
                e
            );
        }

        // Views before the images they point into.
        match self.image_views.lock() {
            Ok(mut views) => views.clear(),
            Err(_) => error!("Image view map mutex poisoned during drop."),
        }
        match self.images.lock() {
            Ok(mut images) => {
                debug!("Clearing {} image entries...", images.len());
                images.clear();
            }
            Err(_) => error!("Image map mutex poisoned during drop."),
        }
        match self.buffers.lock() {
            Ok(mut buffers) => {
                debug!("Clearing {} buffer entries...", buffers.len());
                buffers.clear();
            }
            Err(_) => error!("Buffer map mutex poisoned during drop."),
        }

        match self.transfer_setup.lock() {
            Ok(setup) => unsafe {
                self.device
                    .raw()
                    .destroy_command_pool(setup.command_pool, None);
            },
            Err(_) => error!("TransferSetup mutex poisoned during drop."),
        }

        debug!("ResourceManager destroyed.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uploads_on_the_graphics_family_stay_exclusive() {
        let families = upload_sharing_families(0, 0);
        assert!(families.is_empty());
        let info = buffer_create_info(64, vk::BufferUsageFlags::VERTEX_BUFFER, &families);
        assert_eq!(info.sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert_eq!(info.queue_family_index_count, 0);
    }

    #[test]
    fn uploads_on_a_transfer_family_are_shared_with_graphics() {
        let families = upload_sharing_families(0, 2);
        assert_eq!(families, [2, 0]);
        let info = buffer_create_info(
            64,
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            &families,
        );
        assert_eq!(info.sharing_mode, vk::SharingMode::CONCURRENT);
        assert_eq!(info.queue_family_index_count, 2);
        assert_eq!(info.size, 64);
    }
}
