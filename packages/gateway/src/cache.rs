//! The paired-device cache: the set of `DeviceID`s a manager is
//! currently authoritatively responsible for. A sample is shipped only
//! if its device is in this set.

use std::collections::HashSet;
use std::sync::Mutex;

use gw_core::prelude::*;

#[derive(Default)]
pub struct PairedDeviceCache {
    paired: Mutex<HashSet<DeviceId>>,
}

impl PairedDeviceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paired(&self, id: DeviceId) -> bool {
        self.paired.lock().unwrap().contains(&id)
    }

    pub fn mark_paired(&self, id: DeviceId) {
        self.paired.lock().unwrap().insert(id);
    }

    pub fn mark_unpaired(&self, id: DeviceId) {
        self.paired.lock().unwrap().remove(&id);
    }

    pub fn all_paired(&self) -> Vec<DeviceId> {
        self.paired.lock().unwrap().iter().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_then_unpair() {
        let cache = PairedDeviceCache::new();
        let id = DeviceId::jablotron(1);
        assert!(!cache.paired(id));
        cache.mark_paired(id);
        assert!(cache.paired(id));
        cache.mark_unpaired(id);
        assert!(!cache.paired(id));
    }
}
