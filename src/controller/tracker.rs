//! Per-service up/down bookkeeping for the restarter loop

use std::collections::HashMap;

/// Outcome of recording a new observation for a service
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// First time the service is observed; nothing to compare against
    FirstSeen,
    Unchanged,
    /// Service was down and is up again; dependants must be rolled
    Recovered,
    WentDown,
}

/// Remembers the last observed state of every watched service
///
/// Owned by the restarter loop task. Nothing here is shared or global.
#[derive(Debug, Default)]
pub struct ServiceTracker {
    last_up: HashMap<String, bool>,
}

impl ServiceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, service: &str, up: bool) -> Transition {
        match self.last_up.insert(service.to_string(), up) {
            None => Transition::FirstSeen,
            Some(false) if up => Transition::Recovered,
            Some(true) if !up => Transition::WentDown,
            Some(_) => Transition::Unchanged,
        }
    }
}
