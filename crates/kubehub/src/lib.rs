//! Cluster access: the watch/list/patch surface the engine drives.
//!
//! The watch path intentionally bypasses kube's typed watcher and hands raw
//! newline-delimited bytes to the caller; framing, decoding, and the resume
//! cursor all belong to the engine.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::Client;
use metrics::counter;
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use sheetops_core::WorkloadRecord;

/// apps/v1 Deployments across all namespaces.
pub const DEPLOYMENTS_PATH: &str = "/apis/apps/v1/deployments";

pub type FrameStream = BoxStream<'static, Result<Bytes>>;

/// Snapshot used to seed the registry and establish the initial cursor.
#[derive(Debug, Clone)]
pub struct WorkloadList {
    pub items: Vec<WorkloadRecord>,
    pub resource_version: String,
}

/// Cluster-side collaborator contract consumed by the engine.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Open a long-lived watch emitting raw byte chunks, resuming strictly
    /// after `since`.
    async fn watch(&self, since: &str) -> Result<FrameStream>;

    /// One-shot listing of every workload.
    async fn list(&self) -> Result<WorkloadList>;

    /// Patch `spec.replicas`; only that field is touched.
    async fn patch_replicas(&self, namespace: &str, name: &str, replicas: i32) -> Result<()>;
}

/// kube-rs backed implementation against the current context.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub async fn connect() -> Result<Self> {
        let client = Client::try_default().await.context("building kube client")?;
        Ok(Self { client })
    }
}

fn watch_path(since: &str) -> String {
    format!("{}?watch=1&resourceVersion={}", DEPLOYMENTS_PATH, since)
}

/// Convert the watch response body into the byte-chunk stream the engine
/// consumes: futures-io reader -> tokio reader -> bytes stream.
fn into_frame_stream(reader: impl futures::AsyncRead + Send + 'static) -> FrameStream {
    Box::pin(ReaderStream::new(reader.compat()).map_err(anyhow::Error::from))
}

fn record_from(d: &Deployment) -> Option<WorkloadRecord> {
    let name = d.metadata.name.clone()?;
    let namespace = d.metadata.namespace.clone()?;
    let declared_replicas = d.spec.as_ref().and_then(|s| s.replicas).unwrap_or(0).max(0);
    Some(WorkloadRecord { name, namespace, declared_replicas })
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn watch(&self, since: &str) -> Result<FrameStream> {
        let path = watch_path(since);
        info!(cursor = %since, "opening deployment watch");
        let req = http::Request::builder()
            .uri(path.as_str())
            .body(Vec::new())
            .context("building watch request")?;
        let reader = self
            .client
            .request_stream(req)
            .await
            .with_context(|| format!("opening watch stream at {}", path))?;
        counter!("cluster_watch_opens_total", 1u64);
        Ok(into_frame_stream(reader))
    }

    async fn list(&self) -> Result<WorkloadList> {
        let api: Api<Deployment> = Api::all(self.client.clone());
        let list = api
            .list(&ListParams::default())
            .await
            .context("listing deployments")?;
        let resource_version = list.metadata.resource_version.clone().unwrap_or_default();
        let items: Vec<WorkloadRecord> = list.items.iter().filter_map(record_from).collect();
        debug!(items = items.len(), cursor = %resource_version, "listed deployments");
        Ok(WorkloadList { items, resource_version })
    }

    async fn patch_replicas(&self, namespace: &str, name: &str, replicas: i32) -> Result<()> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let payload = serde_json::json!({"spec": {"replicas": replicas}});
        api.patch(name, &PatchParams::default(), &Patch::Strategic(&payload))
            .await
            .with_context(|| format!("scaling {}/{} to {}", namespace, name, replicas))?;
        counter!("cluster_scale_patches_total", 1u64);
        Ok(())
    }
}
