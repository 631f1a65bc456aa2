//! CoreAudio-backed activity probe for macOS
//!
//! Reads the system object's default input device and that device's
//! "running somewhere" property, which is set while any process holds an
//! active capture session on it.

use std::mem;
use std::os::raw::c_void;
use std::ptr;

use async_trait::async_trait;
use coreaudio_sys::{
    kAudioDevicePropertyDeviceIsRunningSomewhere, kAudioHardwarePropertyDefaultInputDevice,
    kAudioObjectPropertyElementMaster, kAudioObjectPropertyScopeGlobal, kAudioObjectSystemObject,
    kAudioObjectUnknown, AudioDeviceID, AudioObjectGetPropertyData, AudioObjectPropertyAddress,
};
use tracing::trace;

use super::ActivityProbe;

/// Probe backed by the CoreAudio hardware object
pub struct CoreAudioProbe;

// The property reads are in-process and non-blocking, so no timeout is
// needed on this path.
#[async_trait]
impl ActivityProbe for CoreAudioProbe {
    async fn is_active(&mut self) -> bool {
        let device = match default_input_device() {
            Some(device) => device,
            None => {
                trace!("no default input device, treating as inactive");
                return false;
            }
        };
        device_is_running(device)
    }
}

/// Resolve the default input device, or `None` when the query fails or no
/// input device is present.
fn default_input_device() -> Option<AudioDeviceID> {
    let address = AudioObjectPropertyAddress {
        mSelector: kAudioHardwarePropertyDefaultInputDevice,
        mScope: kAudioObjectPropertyScopeGlobal,
        mElement: kAudioObjectPropertyElementMaster,
    };

    let mut device: AudioDeviceID = kAudioObjectUnknown;
    let mut size = mem::size_of::<AudioDeviceID>() as u32;

    let status = unsafe {
        AudioObjectGetPropertyData(
            kAudioObjectSystemObject,
            &address,
            0,
            ptr::null(),
            &mut size,
            &mut device as *mut AudioDeviceID as *mut c_void,
        )
    };

    if status != 0 || device == kAudioObjectUnknown {
        return None;
    }
    Some(device)
}

/// Whether the device reports an active capture session anywhere in the
/// system. Query failures read as "not running".
fn device_is_running(device: AudioDeviceID) -> bool {
    let address = AudioObjectPropertyAddress {
        mSelector: kAudioDevicePropertyDeviceIsRunningSomewhere,
        mScope: kAudioObjectPropertyScopeGlobal,
        mElement: kAudioObjectPropertyElementMaster,
    };

    let mut running: u32 = 0;
    let mut size = mem::size_of::<u32>() as u32;

    let status = unsafe {
        AudioObjectGetPropertyData(
            device,
            &address,
            0,
            ptr::null(),
            &mut size,
            &mut running as *mut u32 as *mut c_void,
        )
    };

    status == 0 && running != 0
}
