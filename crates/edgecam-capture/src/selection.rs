use edgecam_core::LensFacing;
use tracing::{debug, info};

use crate::device::{CameraDevice, DeviceInfo, FpsRange};

/// Lowest frame rate the preview must be able to sustain.
const MIN_PREVIEW_FPS: u32 = 24;

/// First device facing `facing`.
pub fn select_device(devices: &[DeviceInfo], facing: LensFacing) -> Option<&DeviceInfo> {
    let found = devices.iter().find(|d| d.facing == facing);
    match found {
        Some(device) => info!("Selected {}-facing device '{}' ({})", facing, device.name, device.id),
        None => debug!("No {}-facing device among {} candidate(s)", facing, devices.len()),
    }
    found
}

/// Take the device [`select_device`] picks for `facing` out of `devices`.
/// The rest are dropped.
pub fn take_device<D: CameraDevice>(devices: Vec<D>, facing: LensFacing) -> Option<D> {
    let infos: Vec<DeviceInfo> = devices.iter().map(|d| d.info().clone()).collect();
    let id = select_device(&infos, facing)?.id.clone();
    devices.into_iter().find(|d| d.info().id == id)
}

/// Among ranges whose lower bound is at least 24 fps, the one with the
/// highest upper bound (first wins on ties). Falls back to a fixed 30 fps
/// range when none qualify.
pub fn choose_fps_range(ranges: &[FpsRange]) -> FpsRange {
    let mut best: Option<FpsRange> = None;
    for range in ranges.iter().filter(|r| r.min >= MIN_PREVIEW_FPS) {
        if best.map_or(true, |b| range.max > b.max) {
            best = Some(*range);
        }
    }
    let chosen = best.unwrap_or(FpsRange::FIXED_30);
    debug!("FPS range {} chosen from {:?}", chosen, ranges);
    chosen
}
