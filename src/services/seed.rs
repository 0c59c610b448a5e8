//! Demo device registration performed before the reader starts.

use crate::db::store::ValueStore;
use log::{debug, warn};

/// `(name, description, location)` of the devices every fresh database gets.
pub const DEMO_DEVICES: [(&str, &str, &str); 2] = [
    ("Device1", "demo sensor", "Location1"),
    ("Device2", "demo sensor", "Location2"),
];

/// Make sure the demo devices exist. Failures are logged and skipped.
/// Returns how many demo devices are registered afterwards.
pub fn register_demo_devices(store: &ValueStore) -> usize {
    let mut registered = 0;
    for (name, description, location) in DEMO_DEVICES {
        match store.ensure_device(name, Some(description), Some(location)) {
            Ok(device) => {
                debug!("Seed: demo device {:?} has id {}", name, device.id);
                registered += 1;
            }
            Err(e) => warn!("Seed: registering demo device {:?} failed: {}", name, e),
        }
    }
    registered
}
