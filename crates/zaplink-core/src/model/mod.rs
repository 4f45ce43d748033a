// ── Domain model ──

mod device;

pub use device::{AttributeMap, Device, DeviceKind};
