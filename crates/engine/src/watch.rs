use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use futures::TryStreamExt;
use metrics::counter;
use tracing::{info, warn};

use sheetops_core::{decode_event, LineFramer, Registry, WatchEvent};
use sheetops_kubehub::ClusterClient;

/// Resumable consumer of the cluster watch feed; the registry's only writer.
///
/// Connecting -> Streaming -> (Disconnected -> Connecting)*: every stream
/// end, graceful or not, leads back to Connecting after a fixed delay. The
/// cursor only ever advances, so a reconnect resumes strictly after the last
/// applied event.
pub struct WatchSession {
    cluster: Arc<dyn ClusterClient>,
    registry: Arc<Registry>,
    cursor: String,
    reconnect_delay: Duration,
}

impl WatchSession {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        registry: Arc<Registry>,
        reconnect_delay: Duration,
    ) -> Self {
        Self { cluster, registry, cursor: String::new(), reconnect_delay }
    }

    /// Resume token for the next (re)connect.
    pub fn cursor(&self) -> &str {
        &self.cursor
    }

    /// Seed the registry from a one-shot list and take the list's resource
    /// version as the initial cursor.
    pub async fn seed(&mut self) -> Result<()> {
        let list = self.cluster.list().await?;
        let items = list.items.len();
        for rec in list.items {
            self.registry.upsert(rec);
        }
        self.cursor = list.resource_version;
        info!(items, cursor = %self.cursor, "registry seeded");
        Ok(())
    }

    /// Stream until process end, reconnecting forever on a fixed delay.
    pub async fn run(mut self) {
        loop {
            match self.stream_once().await {
                Ok(()) => info!("watch stream closed; reconnecting"),
                Err(e) => warn!(error = %e, "watch stream failed; reconnecting"),
            }
            counter!("watch_reconnects_total", 1u64);
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// One Connecting -> Streaming episode: consume frames until the stream
    /// ends or errors.
    pub async fn stream_once(&mut self) -> Result<()> {
        let mut frames = self.cluster.watch(&self.cursor).await?;
        let mut framer = LineFramer::new();
        while let Some(chunk) = frames.try_next().await? {
            for line in framer.push(&chunk) {
                self.apply_line(&line);
            }
        }
        Ok(())
    }

    fn apply_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        match decode_event(line) {
            Ok(decoded) => {
                if !matches!(decoded.event, WatchEvent::Other) {
                    counter!("watch_events_applied_total", 1u64);
                }
                self.registry.apply(decoded.event);
                // Advances even for ignored event types so a reconnect does
                // not replay them.
                self.cursor = decoded.resource_version;
            }
            Err(e) => {
                warn!(error = %e, "skipping undecodable watch frame");
                counter!("watch_decode_errors_total", 1u64);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;

    use async_trait::async_trait;
    use bytes::Bytes;
    use sheetops_kubehub::{FrameStream, WorkloadList};
    use sheetops_core::WorkloadRecord;

    /// Hands out one pre-scripted frame stream per watch call and records
    /// the cursor each call resumed from.
    struct ScriptedCluster {
        streams: Mutex<Vec<Vec<Result<Bytes>>>>,
        cursors: Mutex<Vec<String>>,
        listing: WorkloadList,
    }

    impl ScriptedCluster {
        fn new(streams: Vec<Vec<Result<Bytes>>>) -> Self {
            Self {
                streams: Mutex::new(streams),
                cursors: Mutex::new(Vec::new()),
                listing: WorkloadList { items: Vec::new(), resource_version: "0".into() },
            }
        }
    }

    #[async_trait]
    impl ClusterClient for ScriptedCluster {
        async fn watch(&self, since: &str) -> Result<FrameStream> {
            self.cursors.lock().unwrap().push(since.to_string());
            let chunks = self.streams.lock().unwrap().remove(0);
            Ok(Box::pin(futures::stream::iter(chunks)))
        }

        async fn list(&self) -> Result<WorkloadList> {
            Ok(self.listing.clone())
        }

        async fn patch_replicas(&self, _namespace: &str, _name: &str, _replicas: i32) -> Result<()> {
            Ok(())
        }
    }

    fn frame(kind: &str, ns: &str, name: &str, replicas: i32, rv: &str) -> String {
        serde_json::json!({
            "type": kind,
            "object": {
                "metadata": {"name": name, "namespace": ns, "resourceVersion": rv},
                "spec": {"replicas": replicas},
            }
        })
        .to_string()
            + "\n"
    }

    #[tokio::test]
    async fn applies_events_split_across_chunks() {
        let line = frame("ADDED", "team-a", "api", 2, "10") + &frame("MODIFIED", "team-a", "api", 5, "11");
        let bytes = line.into_bytes();
        let (head, tail) = bytes.split_at(bytes.len() / 2);
        let cluster = Arc::new(ScriptedCluster::new(vec![vec![
            Ok(Bytes::copy_from_slice(head)),
            Ok(Bytes::copy_from_slice(tail)),
        ]]));
        let registry = Arc::new(Registry::new());
        let mut session =
            WatchSession::new(cluster, Arc::clone(&registry), Duration::from_millis(1));
        session.stream_once().await.expect("stream");

        let snap = registry.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].declared_replicas, 5);
        assert_eq!(session.cursor(), "11");
    }

    #[tokio::test]
    async fn decode_failure_skips_line_without_advancing_cursor() {
        let chunks = vec![
            Ok(Bytes::from(frame("ADDED", "team-a", "api", 2, "10"))),
            Ok(Bytes::from_static(b"not json at all\n\n")),
            Ok(Bytes::from(frame("UNLISTED", "team-a", "api", 2, "12"))),
        ];
        let cluster = Arc::new(ScriptedCluster::new(vec![chunks]));
        let registry = Arc::new(Registry::new());
        let mut session =
            WatchSession::new(cluster, Arc::clone(&registry), Duration::from_millis(1));
        session.stream_once().await.expect("stream");

        // Garbage skipped; the unrecognized-but-valid event still moved the cursor.
        assert_eq!(registry.len(), 1);
        assert_eq!(session.cursor(), "12");
    }

    #[tokio::test]
    async fn deleted_removes_record() {
        let chunks = vec![
            Ok(Bytes::from(frame("ADDED", "team-a", "api", 2, "10"))),
            Ok(Bytes::from(frame("DELETED", "team-a", "api", 2, "11"))),
        ];
        let cluster = Arc::new(ScriptedCluster::new(vec![chunks]));
        let registry = Arc::new(Registry::new());
        let mut session =
            WatchSession::new(cluster, Arc::clone(&registry), Duration::from_millis(1));
        session.stream_once().await.expect("stream");
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn reconnect_resumes_from_last_cursor() {
        let cluster = Arc::new(ScriptedCluster::new(vec![
            vec![Ok(Bytes::from(frame("ADDED", "team-a", "api", 2, "10")))],
            vec![],
        ]));
        let registry = Arc::new(Registry::new());
        let mut session =
            WatchSession::new(Arc::clone(&cluster) as Arc<dyn ClusterClient>, registry, Duration::from_millis(1));
        session.stream_once().await.expect("first stream");
        session.stream_once().await.expect("second stream");
        assert_eq!(*cluster.cursors.lock().unwrap(), vec!["".to_string(), "10".to_string()]);
    }

    #[tokio::test]
    async fn seed_lists_and_sets_cursor() {
        let mut cluster = ScriptedCluster::new(vec![]);
        cluster.listing = WorkloadList {
            items: vec![WorkloadRecord {
                name: "api".into(),
                namespace: "team-a".into(),
                declared_replicas: 2,
            }],
            resource_version: "40".into(),
        };
        let registry = Arc::new(Registry::new());
        let mut session =
            WatchSession::new(Arc::new(cluster), Arc::clone(&registry), Duration::from_millis(1));
        session.seed().await.expect("seed");
        assert_eq!(registry.len(), 1);
        assert_eq!(session.cursor(), "40");
    }
}
