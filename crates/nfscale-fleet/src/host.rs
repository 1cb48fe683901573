//! One container host and its local view of the instances it runs.

use nfscale_core::config::{ContainerTemplate, DockerHostConfig, ID_PLACEHOLDER, ServiceConfig};
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::backend::{BackendClient, CreateRequest, ServiceHandle};
use crate::docker::DockerBackend;
use crate::error::BackendResult;
use crate::strategy::ServiceId;

/// Adapter between the allocator and one backend.
///
/// `running` is ordered oldest first, so the last element is the instance
/// removed next.
pub struct HostAdapter {
    address: String,
    capacity: usize,
    backend: Box<dyn BackendClient>,
    template: ContainerTemplate,
    command: Vec<String>,
    service: ServiceConfig,
    running: Vec<ServiceHandle>,
    span: Span,
}

impl std::fmt::Debug for HostAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostAdapter")
            .field("address", &self.address)
            .field("capacity", &self.capacity)
            .field("running", &self.running.len())
            .finish()
    }
}

impl HostAdapter {
    pub fn new(
        config: &DockerHostConfig,
        service: &ServiceConfig,
        backend: Box<dyn BackendClient>,
    ) -> Self {
        let address = config.address();
        let span = info_span!("host", addr = %address);
        // Validated configs always split; a hand-built one falls back to the
        // image's default command.
        let command = config.command_argv().unwrap_or_else(|e| {
            warn!(host = %address, error = %e, "ignoring unparsable command");
            Vec::new()
        });
        Self {
            address,
            capacity: config.max_services,
            backend,
            template: config.container_config.clone(),
            command,
            service: service.clone(),
            running: Vec::new(),
            span,
        }
    }

    /// Adapter talking to the Docker daemon named in `config`.
    pub fn from_config(config: &DockerHostConfig, service: &ServiceConfig) -> Self {
        let backend = DockerBackend::new(config.address(), config.timeout());
        Self::new(config, service, Box::new(backend))
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Label key that selects this host's instances.
    pub fn service_label(&self) -> &str {
        &self.service.service_label
    }

    /// Instances in the local list. Exact only right after a reconciliation.
    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn running(&self) -> &[ServiceHandle] {
        &self.running
    }

    pub fn has_capacity(&self) -> bool {
        self.running.len() < self.capacity
    }

    /// The create request for instance `id`: identity fields first, then the
    /// host's template.
    pub fn build_request(&self, id: ServiceId) -> CreateRequest {
        let label = &self.service.service_label;
        let prefix = label.to_uppercase();
        let url = self.service.amf_url.replace(ID_PLACEHOLDER, &id.to_string());

        let mut environment = vec![
            format!("{prefix}_NAME={prefix}{id}"),
            format!("{prefix}_URL={url}"),
            format!("NRF_IP={}", self.service.nrf_ip),
        ];
        environment.extend(self.template.environment.iter().cloned());

        let mut labels = self.template.labels.clone();
        labels.insert(label.clone(), id.to_string());

        CreateRequest {
            image: self.service.image_name.clone(),
            command: self.command.clone(),
            environment,
            labels,
            network_mode: self.template.network_mode.clone(),
            detach: true,
        }
    }

    /// Start instance `id` and append it to the local list.
    pub async fn add_service(&mut self, id: ServiceId) -> BackendResult<()> {
        let span = self.span.clone();
        self.add_inner(id).instrument(span).await
    }

    async fn add_inner(&mut self, id: ServiceId) -> BackendResult<()> {
        let request = self.build_request(id);
        let handle = self.backend.create(&request).await?;
        info!(service_id = %id, container = %handle.id, "service started");
        self.running.push(handle);
        Ok(())
    }

    /// Stop and destroy the most recently added instance.
    ///
    /// `Ok(false)` when nothing is running here.
    pub async fn remove_service(&mut self) -> BackendResult<bool> {
        let span = self.span.clone();
        self.remove_inner().instrument(span).await
    }

    async fn remove_inner(&mut self) -> BackendResult<bool> {
        let Some(handle) = self.running.pop() else {
            return Ok(false);
        };

        if let Err(e) = self.backend.stop(&handle).await {
            self.running.push(handle);
            return Err(e);
        }

        // Stopped means no longer serving; a leftover container is picked up
        // by the next reconciliation.
        if let Err(e) = self.backend.remove(&handle).await {
            warn!(container = %handle.id, error = %e, "container stopped but not removed");
        }
        info!(container = %handle.id, "service stopped");
        Ok(true)
    }

    /// Replace the local list with what the backend reports for this
    /// host's service label.
    ///
    /// On error the local list is left as it was.
    pub async fn get_running_services(&mut self) -> BackendResult<usize> {
        let span = self.span.clone();
        self.sync_inner().instrument(span).await
    }

    async fn sync_inner(&mut self) -> BackendResult<usize> {
        let label = self.service.service_label.as_str();
        let mut handles = self.backend.list(label).await?;
        handles.sort_by_key(|h| (h.created, h.service_id(label).unwrap_or(0)));

        if handles.len() != self.running.len() {
            debug!(local = self.running.len(), backend = handles.len(), "running list drifted");
        }
        if handles.len() > self.capacity {
            warn!(
                running = handles.len(),
                capacity = self.capacity,
                "host runs more instances than its capacity"
            );
        }
        self.running = handles;
        Ok(self.running.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use crate::strategy::ServiceIdGenerator;
    use crate::testing::{Call, MockBackend};
    use std::collections::BTreeMap;

    fn host_config(capacity: usize) -> DockerHostConfig {
        DockerHostConfig {
            host: "10.0.0.5".to_string(),
            port: 2375,
            max_services: capacity,
            container_config: ContainerTemplate {
                environment: vec!["GIN_MODE=release".to_string()],
                labels: BTreeMap::from([("team".to_string(), "core".to_string())]),
                network_mode: Some("free5gc".to_string()),
            },
            command: Some("./amf -amfcfg ../config/amfcfg.conf".to_string()),
            timeout: 30,
        }
    }

    fn service_config() -> ServiceConfig {
        ServiceConfig {
            service_label: "amf".to_string(),
            nrf_ip: "10.100.200.40".to_string(),
            amf_url: "amf{id}.free5gc.org".to_string(),
            image_name: "free5gc-compose_free5gc-amf".to_string(),
        }
    }

    fn host(capacity: usize) -> (HostAdapter, MockBackend) {
        let backend = MockBackend::new();
        let host = HostAdapter::new(
            &host_config(capacity),
            &service_config(),
            Box::new(backend.clone()),
        );
        (host, backend)
    }

    #[test]
    fn request_merges_identity_and_template() {
        let (host, _) = host(2);
        let ids = ServiceIdGenerator::starting_at(7);
        let req = host.build_request(ids.generate());

        assert_eq!(req.image, "free5gc-compose_free5gc-amf");
        assert_eq!(req.command, vec!["./amf", "-amfcfg", "../config/amfcfg.conf"]);
        assert_eq!(
            req.environment,
            vec![
                "AMF_NAME=AMF7",
                "AMF_URL=amf7.free5gc.org",
                "NRF_IP=10.100.200.40",
                "GIN_MODE=release",
            ]
        );
        assert_eq!(req.labels.get("amf").map(String::as_str), Some("7"));
        assert_eq!(req.labels.get("team").map(String::as_str), Some("core"));
        assert_eq!(req.network_mode.as_deref(), Some("free5gc"));
        assert!(req.detach);
    }

    #[test]
    fn quoted_command_stays_one_argument() {
        let config = DockerHostConfig {
            command: Some("sh -c 'exec ./amf -c cfg.yaml'".to_string()),
            ..host_config(1)
        };
        let host = HostAdapter::new(&config, &service_config(), Box::new(MockBackend::new()));
        let req = host.build_request(ServiceId::from(1));
        assert_eq!(req.command, vec!["sh", "-c", "exec ./amf -c cfg.yaml"]);
    }

    #[test]
    fn template_is_not_aliased_between_requests() {
        let (host, _) = host(2);
        let ids = ServiceIdGenerator::new();
        let first = host.build_request(ids.generate());
        let second = host.build_request(ids.generate());
        assert_eq!(first.labels.get("amf").map(String::as_str), Some("1"));
        assert_eq!(second.labels.get("amf").map(String::as_str), Some("2"));
        assert_eq!(host.template.labels.get("amf"), None);
    }

    #[tokio::test]
    async fn add_appends_handle() {
        let (mut host, backend) = host(2);
        let ids = ServiceIdGenerator::new();
        host.add_service(ids.generate()).await.unwrap();
        assert_eq!(host.running_count(), 1);
        assert_eq!(backend.running().len(), 1);
        assert!(host.has_capacity());
    }

    #[tokio::test]
    async fn failed_add_leaves_list_unchanged() {
        let (mut host, backend) = host(2);
        backend.fail_create(true);
        let err = host.add_service(ServiceId::from(1)).await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));
        assert_eq!(host.running_count(), 0);
    }

    #[tokio::test]
    async fn remove_is_lifo_and_stops_before_removing() {
        let (mut host, backend) = host(3);
        let ids = ServiceIdGenerator::new();
        for _ in 0..3 {
            host.add_service(ids.generate()).await.unwrap();
        }
        let newest = host.running()[2].id.clone();
        backend.clear_calls();

        assert!(host.remove_service().await.unwrap());
        assert_eq!(
            backend.calls(),
            vec![Call::Stop(newest.clone()), Call::Remove(newest.clone())]
        );
        assert_eq!(host.running_count(), 2);
        assert!(!backend.running().contains(&newest));
    }

    #[tokio::test]
    async fn remove_on_empty_host_issues_no_calls() {
        let (mut host, backend) = host(1);
        assert!(!host.remove_service().await.unwrap());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_stop_keeps_handle() {
        let (mut host, backend) = host(1);
        host.add_service(ServiceId::from(1)).await.unwrap();
        backend.fail_stop(true);

        assert!(host.remove_service().await.is_err());
        assert_eq!(host.running_count(), 1);
        assert_eq!(backend.running().len(), 1);
    }

    #[tokio::test]
    async fn failed_remove_after_stop_still_counts_as_removed() {
        let (mut host, backend) = host(1);
        host.add_service(ServiceId::from(1)).await.unwrap();
        backend.fail_remove(true);

        assert!(host.remove_service().await.unwrap());
        assert_eq!(host.running_count(), 0);
        assert!(backend.running().is_empty());
        assert_eq!(backend.existing(), 1);
    }

    #[tokio::test]
    async fn reconcile_replaces_list_oldest_first() {
        let (mut host, backend) = host(5);
        host.add_service(ServiceId::from(1)).await.unwrap();
        let external = backend.spawn_external(BTreeMap::from([(
            "amf".to_string(),
            "99".to_string(),
        )]));
        backend.spawn_external(BTreeMap::from([("smf".to_string(), "1".to_string())]));

        assert_eq!(host.get_running_services().await.unwrap(), 2);
        assert_eq!(host.running()[1].id, external);
        assert_eq!(host.get_running_services().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failed_reconcile_keeps_local_list() {
        let (mut host, backend) = host(2);
        host.add_service(ServiceId::from(1)).await.unwrap();
        backend.fail_list(true);
        assert!(host.get_running_services().await.is_err());
        assert_eq!(host.running_count(), 1);
    }
}
