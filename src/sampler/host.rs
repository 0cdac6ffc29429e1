//! Host sampler: system-wide memory, CPU and network statistics

use std::collections::HashMap;

use sysinfo::{MemoryRefreshKind, Networks, System};

use super::{Sampler, push_counter, push_gauge};
use crate::model::Batch;

/// Samples the machine the agent runs on
///
/// Gauges: `TotalMemory`, `FreeMemory` and one `CPUutilization<N>` per logical
/// core (1-based). Counters: `NetworkReceivedBytes` and
/// `NetworkTransmittedBytes`, summed over all interfaces.
pub struct HostSampler {
    system: System,
    networks: Networks,
    prev_received: HashMap<String, u64>,
    prev_transmitted: HashMap<String, u64>,
    received: u64,
    transmitted: u64,
}

impl HostSampler {
    pub fn new() -> Self {
        let networks = Networks::new_with_refreshed_list();
        let prev_received = networks
            .iter()
            .map(|(name, data)| (name.clone(), data.total_received()))
            .collect();
        let prev_transmitted = networks
            .iter()
            .map(|(name, data)| (name.clone(), data.total_transmitted()))
            .collect();

        let mut system = System::new();
        system.refresh_cpu_usage();

        Self {
            system,
            networks,
            prev_received,
            prev_transmitted,
            received: 0,
            transmitted: 0,
        }
    }

    fn refresh_network(&mut self) {
        self.networks.refresh(true);

        for (name, data) in self.networks.iter() {
            let received = data.total_received();
            let transmitted = data.total_transmitted();

            // unseen interfaces start counting from now
            let rx_delta =
                received.saturating_sub(*self.prev_received.get(name).unwrap_or(&received));
            let tx_delta = transmitted
                .saturating_sub(*self.prev_transmitted.get(name).unwrap_or(&transmitted));

            self.prev_received.insert(name.clone(), received);
            self.prev_transmitted.insert(name.clone(), transmitted);

            self.received = self.received.saturating_add(rx_delta);
            self.transmitted = self.transmitted.saturating_add(tx_delta);
        }
    }
}

impl Default for HostSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl Sampler for HostSampler {
    fn name(&self) -> &str {
        "host"
    }

    fn update(&mut self) {
        self.system.refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());
        self.system.refresh_cpu_usage();
        self.refresh_network();
    }

    fn snapshot(&mut self) -> Batch {
        let cpus = self.system.cpus();
        let mut batch = Batch::with_capacity(cpus.len() + 4);

        push_gauge(&mut batch, "TotalMemory", self.system.total_memory() as f64);
        push_gauge(&mut batch, "FreeMemory", self.system.free_memory() as f64);

        for (i, cpu) in cpus.iter().enumerate() {
            push_gauge(
                &mut batch,
                &format!("CPUutilization{}", i + 1),
                cpu.cpu_usage() as f64,
            );
        }

        push_counter(
            &mut batch,
            "NetworkReceivedBytes",
            std::mem::take(&mut self.received),
        );
        push_counter(
            &mut batch,
            "NetworkTransmittedBytes",
            std::mem::take(&mut self.transmitted),
        );

        batch
    }
}
