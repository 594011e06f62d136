use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::GatewayError;
use super::gateway::{BackupArtifact, Gateway, TaskHandle, TaskState, VmId, VmStatus};
use super::types::{
    ApiResponse, RestoreRequest, StorageContentEntry, TaskStatusResponse, VmCurrentStatus,
};
use crate::config::ProxmoxConfig;

const API_PATH: &str = "/api2/json";

/// Timeout for establishing the TCP/TLS connection.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Timeout for a single API round trip. Task completion is tracked by polling,
/// so no request should take long.
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Proxmox VE REST client authenticated with an API token.
pub struct ProxmoxClient {
    client: Client,
    base_url: Url,
    node: String,
    auth_header: String,
}

impl ProxmoxClient {
    pub fn new(config: &ProxmoxConfig) -> Result<Self, GatewayError> {
        let base_url = format!("https://{}:{}{API_PATH}", config.host, config.port);
        Self::with_base_url(config, &base_url)
    }

    /// Create a client pointing at a custom base URL (useful for testing).
    pub fn with_base_url(config: &ProxmoxConfig, base_url: &str) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()?;

        let base_url =
            Url::parse(base_url).map_err(|e| GatewayError::Url(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(GatewayError::Url(format!("{base_url} cannot be a base URL")));
        }

        Ok(Self {
            client,
            base_url,
            node: config.node.clone(),
            auth_header: format!(
                "PVEAPIToken={}!{}={}",
                config.user, config.token_name, config.token_value
            ),
        })
    }

    /// Append percent-encoded path segments to the API base URL.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| GatewayError::Url(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send an authenticated request and unwrap the `data` envelope.
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = request
            .header(AUTHORIZATION, &self.auth_header)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                body
            };
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: ApiResponse<T> =
            serde_json::from_str(&body).map_err(|e| GatewayError::Parse(e.to_string()))?;
        Ok(envelope.data)
    }
}

impl Gateway for ProxmoxClient {
    async fn vm_status(&self, vmid: VmId) -> Result<VmStatus, GatewayError> {
        let id = vmid.to_string();
        let url = self.endpoint(&["nodes", &self.node, "qemu", &id, "status", "current"])?;
        debug!(url = %url, "GET VM status");

        let current: VmCurrentStatus = self.send(self.client.get(url)).await?;
        debug!(
            vmid = %vmid,
            name = current.name.as_deref().unwrap_or("-"),
            status = %current.status,
            "VM status received"
        );
        Ok(VmStatus::parse(&current.status))
    }

    async fn delete_vm(&self, vmid: VmId) -> Result<Option<TaskHandle>, GatewayError> {
        let id = vmid.to_string();
        let url = self.endpoint(&["nodes", &self.node, "qemu", &id])?;
        debug!(url = %url, "DELETE VM");

        let upid: Option<String> = self.send(self.client.delete(url)).await?;
        Ok(upid.and_then(TaskHandle::new))
    }

    async fn start_restore(
        &self,
        vmid: VmId,
        target_storage: &str,
        volid: &str,
    ) -> Result<Option<TaskHandle>, GatewayError> {
        let url = self.endpoint(&["nodes", &self.node, "qemu"])?;
        debug!(url = %url, archive = %volid, storage = %target_storage, "POST restore");

        let form = RestoreRequest {
            vmid: vmid.get(),
            storage: target_storage,
            archive: volid,
        };
        let upid: Option<String> = self.send(self.client.post(url).form(&form)).await?;
        Ok(upid.and_then(TaskHandle::new))
    }

    async fn task_status(&self, handle: &TaskHandle) -> Result<TaskState, GatewayError> {
        let url = self.endpoint(&["nodes", &self.node, "tasks", handle.as_str(), "status"])?;

        let status: TaskStatusResponse = self.send(self.client.get(url)).await?;
        debug!(
            upid = %handle,
            status = %status.status,
            exitstatus = status.exitstatus.as_deref().unwrap_or("-"),
            "task status received"
        );
        Ok(status.state())
    }

    async fn list_backups(&self, storage: &str) -> Result<Vec<BackupArtifact>, GatewayError> {
        let mut url = self.endpoint(&["nodes", &self.node, "storage", storage, "content"])?;
        url.query_pairs_mut().append_pair("content", "backup");
        debug!(url = %url, "GET storage content");

        let entries: Vec<StorageContentEntry> = self.send(self.client.get(url)).await?;
        let total = entries.len();
        let artifacts: Vec<BackupArtifact> = entries
            .into_iter()
            .filter_map(StorageContentEntry::into_artifact)
            .collect();
        debug!(storage = %storage, total, backups = artifacts.len(), "storage content listed");
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path, path_regex, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const UPID: &str = "UPID:pve:000A1B2C:0F00:6630F0A0:qmdestroy:42:root@pam!recovery:";

    fn test_config() -> ProxmoxConfig {
        ProxmoxConfig {
            host: "127.0.0.1".into(),
            port: 8006,
            node: "pve".into(),
            user: "root@pam".into(),
            token_name: "recovery".into(),
            token_value: "s3cr3t".into(),
            verify_ssl: true,
        }
    }

    async fn client_for(server: &MockServer) -> ProxmoxClient {
        ProxmoxClient::with_base_url(&test_config(), &format!("{}/api2/json", server.uri()))
            .unwrap()
    }

    fn vmid(id: u32) -> VmId {
        VmId::try_from(id).unwrap()
    }

    #[tokio::test]
    async fn vm_status_sends_token_and_parses_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api2/json/nodes/pve/qemu/42/status/current"))
            .and(header("authorization", "PVEAPIToken=root@pam!recovery=s3cr3t"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"status": "stopped", "name": "web-01", "vmid": 42}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let status = client.vm_status(vmid(42)).await.unwrap();
        assert_eq!(status, VmStatus::Stopped);
    }

    #[tokio::test]
    async fn delete_vm_returns_upid() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api2/json/nodes/pve/qemu/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": UPID })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let handle = client.delete_vm(vmid(42)).await.unwrap().unwrap();
        assert_eq!(handle.as_str(), UPID);
    }

    #[tokio::test]
    async fn delete_vm_without_upid_yields_none() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api2/json/nodes/pve/qemu/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": null })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(client.delete_vm(vmid(42)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn start_restore_posts_archive_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api2/json/nodes/pve/qemu"))
            .and(body_string_contains("vmid=42"))
            .and(body_string_contains("storage=local-lvm"))
            .and(body_string_contains("archive=backup-42-latest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": "UPID:pve:000A1B2D:0F01:6630F0B0:qmrestore:42:root@pam!recovery:"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let handle = client
            .start_restore(vmid(42), "local-lvm", "backup-42-latest")
            .await
            .unwrap();
        assert!(handle.is_some());
    }

    #[tokio::test]
    async fn task_status_maps_finished_task() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/api2/json/nodes/pve/tasks/UPID.+/status$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"status": "stopped", "exitstatus": "OK", "upid": UPID}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let handle = TaskHandle::new(UPID).unwrap();
        assert_eq!(
            client.task_status(&handle).await.unwrap(),
            TaskState::Succeeded
        );
    }

    #[tokio::test]
    async fn list_backups_requests_backup_content_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api2/json/nodes/pve/storage/pbs/content"))
            .and(query_param("content", "backup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"volid": "pbs:backup/vm/42/a", "vmid": 42, "ctime": 100, "content": "backup"},
                    {"volid": "pbs:backup/vm/7/b", "vmid": 7, "ctime": 200, "content": "backup"},
                    {"volid": "pbs:backup/orphan", "content": "backup"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let backups = client.list_backups("pbs").await.unwrap();
        assert_eq!(backups.len(), 2);
        assert_eq!(backups[0].vmid.get(), 42);
        assert_eq!(backups[1].volid, "pbs:backup/vm/7/b");
    }

    #[tokio::test]
    async fn http_error_surfaces_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api2/json/nodes/pve/qemu/42/status/current"))
            .respond_with(
                ResponseTemplate::new(500)
                    .set_body_string("Configuration file 'nodes/pve/qemu-server/42.conf' does not exist"),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        match client.vm_status(vmid(42)).await {
            Err(GatewayError::Api { status, message }) => {
                assert_eq!(status, 500);
                assert!(message.contains("does not exist"));
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api2/json/nodes/pve/qemu/42/status/current"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.vm_status(vmid(42)).await.unwrap_err();
        assert!(matches!(err, GatewayError::Parse(_)));
    }

    #[test]
    fn endpoint_encodes_segments() {
        let client =
            ProxmoxClient::with_base_url(&test_config(), "https://pve.example:8006/api2/json/")
                .unwrap();
        let url = client
            .endpoint(&["nodes", "pve", "storage", "backup store", "content"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://pve.example:8006/api2/json/nodes/pve/storage/backup%20store/content"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let result = ProxmoxClient::with_base_url(&test_config(), "not a url");
        assert!(matches!(result, Err(GatewayError::Url(_))));
    }
}
