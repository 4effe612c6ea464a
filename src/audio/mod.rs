//! Audio subsystem module

pub mod bridge;
pub mod capture;
pub mod device;
pub mod playback;

pub use bridge::{create_shared_queue, AudioFrame, FrameQueue, SharedFrameQueue};
pub use capture::AudioCapture;
pub use device::{find_input_device, find_output_device, list_devices, AudioDeviceInfo};
pub use playback::AudioPlayback;
