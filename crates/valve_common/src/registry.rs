//! Device registry: one record per valve id, created on first sighting and
//! kept for the process lifetime.

use crate::machine::ValveMachine;
use crate::message::{DeviceMessage, ValveState};
use std::collections::hash_map::Entry;
use std::collections::HashMap;

/// Everything tracked for one valve
#[derive(Debug, Clone, Default)]
pub struct DeviceRecord {
    pub machine: ValveMachine,
    /// Most recent claim from the device, accepted or not
    pub last_message: Option<DeviceMessage>,
}

impl DeviceRecord {
    pub fn state(&self) -> ValveState {
        self.machine.state()
    }
}

#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceRecord>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, device_id: &str) -> Option<&DeviceRecord> {
        self.devices.get(device_id)
    }

    /// Fetch the record for `device_id`, creating a fresh one if absent.
    /// The flag is true when the record was created by this call.
    pub fn get_or_create(&mut self, device_id: &str) -> (&mut DeviceRecord, bool) {
        match self.devices.entry(device_id.to_string()) {
            Entry::Occupied(e) => (e.into_mut(), false),
            Entry::Vacant(e) => (e.insert(DeviceRecord::default()), true),
        }
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Known device ids, sorted
    pub fn device_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.devices.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}
