//! Per-slot synchronization
//!
//! Each frame slot owns two semaphores (image acquired, rendering finished)
//! and a fence armed at submit. The fence starts signalled so the first wait
//! on a fresh slot returns immediately.

use ash::{vk, Device};

use super::{VulkanError, VulkanResult};

/// Binary semaphore
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create an unsignalled semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let semaphore = unsafe {
            device
                .create_semaphore(&vk::SemaphoreCreateInfo::builder(), None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, semaphore })
    }

    /// Raw handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.destroy_semaphore(self.semaphore, None) };
    }
}

/// Host-waitable fence
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a fence, optionally already signalled
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence = unsafe {
            device
                .create_fence(&vk::FenceCreateInfo::builder().flags(flags), None)
                .map_err(VulkanError::Api)?
        };
        Ok(Self { device, fence })
    }

    /// Whether the GPU has signalled the fence
    pub fn is_signaled(&self) -> VulkanResult<bool> {
        unsafe { self.device.get_fence_status(self.fence).map_err(VulkanError::Api) }
    }

    /// Raw handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.destroy_fence(self.fence, None) };
    }
}

/// Synchronization objects of one frame slot
pub struct FrameSync {
    slot: usize,
    /// Signalled by acquire; the slot's submission waits on it
    pub image_available: Semaphore,
    /// Signalled by the slot's submission; presentation waits on it
    pub render_finished: Semaphore,
    in_flight: Fence,
}

impl FrameSync {
    /// Create the objects for `slot`
    pub fn new(device: Device, slot: usize) -> VulkanResult<Self> {
        Ok(Self {
            slot,
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device, true)?,
        })
    }

    /// Block until the slot's last submission has finished
    pub fn wait_for_reuse(&self, timeout_ns: u64) -> VulkanResult<()> {
        let result = unsafe {
            self.in_flight
                .device
                .wait_for_fences(&[self.in_flight.fence], true, timeout_ns)
        };
        match result {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(VulkanError::FenceTimeout {
                slot: self.slot,
                timeout_ns,
            }),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Unsignal the fence and return it for the submission that follows
    pub fn arm(&self) -> VulkanResult<vk::Fence> {
        unsafe {
            self.in_flight
                .device
                .reset_fences(&[self.in_flight.fence])
                .map_err(VulkanError::Api)?;
        }
        Ok(self.in_flight.fence)
    }

    /// Whether the slot's last submission has finished
    pub fn is_idle(&self) -> VulkanResult<bool> {
        self.in_flight.is_signaled()
    }
}
