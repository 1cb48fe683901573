//! Fleet allocator: first-fit placement, LIFO removal across hosts.

use std::sync::Arc;

use nfscale_core::Config;
use tracing::{Instrument, Span, debug, info_span, warn};

use crate::host::HostAdapter;
use crate::strategy::{InfrastructureStrategy, ServiceIdGenerator, StrategyFuture};

/// Ordered set of hosts. Declared order is add precedence; reverse order is
/// remove precedence.
#[derive(Debug)]
pub struct Fleet {
    hosts: Vec<HostAdapter>,
    ids: Arc<ServiceIdGenerator>,
    span: Span,
}

impl Fleet {
    pub fn new(hosts: Vec<HostAdapter>, ids: Arc<ServiceIdGenerator>) -> Self {
        Self {
            hosts,
            ids,
            span: info_span!("fleet"),
        }
    }

    /// One Docker-backed host per `docker_hosts` entry, in file order.
    pub fn from_config(config: &Config) -> Self {
        let hosts = config
            .docker_hosts
            .iter()
            .map(|h| HostAdapter::from_config(h, &config.service_config))
            .collect();
        Self::new(hosts, Arc::new(ServiceIdGenerator::new()))
    }

    pub fn hosts(&self) -> &[HostAdapter] {
        &self.hosts
    }

    /// Sum of host capacities.
    pub fn capacity(&self) -> usize {
        self.hosts.iter().map(HostAdapter::capacity).sum()
    }

    /// Instances in the local lists. Exact only right after
    /// `get_running_services`.
    pub fn running_count(&self) -> usize {
        self.hosts.iter().map(HostAdapter::running_count).sum()
    }

    async fn add_inner(&mut self) -> bool {
        let Some(idx) = self.hosts.iter().position(HostAdapter::has_capacity) else {
            warn!(capacity = self.capacity(), "maximum reached, no host has room");
            return false;
        };

        let id = self.ids.generate();
        let host = &mut self.hosts[idx];
        match host.add_service(id).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    host = %host.address(),
                    service_id = %id,
                    error = %e,
                    transient = e.is_transient(),
                    "failed to add service"
                );
                false
            }
        }
    }

    async fn remove_inner(&mut self) -> bool {
        let Some(idx) = self.hosts.iter().rposition(|h| h.running_count() > 0) else {
            warn!("no running service to remove");
            return false;
        };

        let host = &mut self.hosts[idx];
        match host.remove_service().await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(
                    host = %host.address(),
                    error = %e,
                    transient = e.is_transient(),
                    "failed to remove service"
                );
                false
            }
        }
    }

    async fn sync_inner(&mut self) -> usize {
        let mut total = 0;
        for host in &mut self.hosts {
            let count = match host.get_running_services().await {
                Ok(n) => n,
                Err(e) => {
                    warn!(
                        host = %host.address(),
                        error = %e,
                        transient = e.is_transient(),
                        local = host.running_count(),
                        "reconciliation failed, using local count"
                    );
                    host.running_count()
                }
            };

            // Instances adopted from an earlier run keep their ids unique.
            for handle in host.running() {
                if let Some(seen) = handle.service_id(host.service_label()) {
                    self.ids.observe(seen);
                }
            }
            total += count;
        }
        debug!(running = total, "fleet reconciled");
        total
    }
}

impl InfrastructureStrategy for Fleet {
    fn add_service(&mut self) -> StrategyFuture<'_, bool> {
        let span = self.span.clone();
        Box::pin(self.add_inner().instrument(span))
    }

    fn remove_service(&mut self) -> StrategyFuture<'_, bool> {
        let span = self.span.clone();
        Box::pin(self.remove_inner().instrument(span))
    }

    fn get_running_services(&mut self) -> StrategyFuture<'_, usize> {
        let span = self.span.clone();
        Box::pin(self.sync_inner().instrument(span))
    }
}
