use super::audit::{Events, Logs, Security};
use super::inventory::{Drivers, Services, Software, Users};
use super::network::{Connections, Network, Wifi};
use super::resources::{Gpu, Performance, Processes, Storage};
use super::system::{Advanced, Environment, Hardware, Overview, Power, Uptime};
use super::{Collector, CollectorSpec};
use std::sync::Arc;

/// Ids of the standard collectors, in report order.
pub const STANDARD_IDS: [&str; 20] = [
    "overview",
    "hardware",
    "storage",
    "gpu",
    "network",
    "connections",
    "wifi",
    "users",
    "services",
    "software",
    "drivers",
    "security",
    "power",
    "env",
    "uptime",
    "logs",
    "events",
    "advanced",
    "performance",
    "processes",
];

/// Ordered collectors; order is rendering order.
#[derive(Clone)]
pub struct Registry {
    collectors: Vec<Arc<dyn Collector>>,
}

impl Registry {
    pub fn standard() -> Self {
        Self::from_collectors(vec![
            Arc::new(Overview),
            Arc::new(Hardware),
            Arc::new(Storage),
            Arc::new(Gpu),
            Arc::new(Network),
            Arc::new(Connections),
            Arc::new(Wifi),
            Arc::new(Users),
            Arc::new(Services),
            Arc::new(Software),
            Arc::new(Drivers),
            Arc::new(Security),
            Arc::new(Power),
            Arc::new(Environment),
            Arc::new(Uptime),
            Arc::new(Logs),
            Arc::new(Events),
            Arc::new(Advanced),
            Arc::new(Performance),
            Arc::new(Processes),
        ])
    }

    pub fn from_collectors(collectors: Vec<Arc<dyn Collector>>) -> Self {
        Self { collectors }
    }

    pub fn collectors(&self) -> &[Arc<dyn Collector>] {
        &self.collectors
    }

    pub fn specs(&self) -> impl Iterator<Item = &CollectorSpec> {
        self.collectors.iter().map(|c| c.spec())
    }

    pub fn resolve(&self, id: &str) -> Option<&Arc<dyn Collector>> {
        self.collectors.iter().find(|c| c.spec().id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.resolve(id).is_some()
    }

    pub fn total_weight(&self) -> u32 {
        self.specs().map(|s| s.weight).sum()
    }
}
