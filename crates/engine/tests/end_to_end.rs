#![forbid(unsafe_code)]

//! Full round trip against an in-memory mirror and a scripted cluster:
//! seed -> render -> operator edit -> drift correction -> watch update ->
//! drift settled.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

use sheetops_core::{Registry, WorkloadRecord};
use sheetops_engine::{DriftPoller, ReconcilerLoop, Settings, WatchSession};
use sheetops_kubehub::{ClusterClient, FrameStream, WorkloadList};
use sheetops_mirror::{InMemoryMirror, MirrorClient, RangeWrite};

struct ScriptedCluster {
    listing: WorkloadList,
    streams: Mutex<Vec<Vec<Result<Bytes>>>>,
    patches: Mutex<Vec<(String, String, i32)>>,
}

#[async_trait]
impl ClusterClient for ScriptedCluster {
    async fn watch(&self, _since: &str) -> Result<FrameStream> {
        let chunks = self.streams.lock().unwrap().remove(0);
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn list(&self) -> Result<WorkloadList> {
        Ok(self.listing.clone())
    }

    async fn patch_replicas(&self, namespace: &str, name: &str, replicas: i32) -> Result<()> {
        self.patches.lock().unwrap().push((namespace.to_string(), name.to_string(), replicas));
        Ok(())
    }
}

fn frame(kind: &str, ns: &str, name: &str, replicas: i32, rv: &str) -> Bytes {
    let line = serde_json::json!({
        "type": kind,
        "object": {
            "metadata": {"name": name, "namespace": ns, "resourceVersion": rv},
            "spec": {"replicas": replicas},
        }
    })
    .to_string()
        + "\n";
    Bytes::from(line)
}

#[tokio::test]
async fn operator_edit_flows_back_to_the_cluster_and_settles() {
    let cluster = Arc::new(ScriptedCluster {
        listing: WorkloadList {
            items: vec![WorkloadRecord {
                name: "api".into(),
                namespace: "team-a".into(),
                declared_replicas: 2,
            }],
            resource_version: "100".into(),
        },
        streams: Mutex::new(vec![vec![Ok(frame("MODIFIED", "team-a", "api", 5, "101"))]]),
        patches: Mutex::new(Vec::new()),
    });
    let registry = Arc::new(Registry::new());
    let mirror = Arc::new(InMemoryMirror::new());
    let settings = Settings { max_rows: 10, ..Settings::default() };

    let mut session = WatchSession::new(
        Arc::clone(&cluster) as Arc<dyn ClusterClient>,
        Arc::clone(&registry),
        Duration::from_millis(1),
    );
    session.seed().await.expect("seed");

    let mut reconciler = ReconcilerLoop::new(
        Arc::clone(&registry),
        Arc::clone(&mirror) as Arc<dyn MirrorClient>,
        &settings,
    );
    reconciler.pass().await.expect("first render");
    assert_eq!(mirror.cell("team-a", 0, 1).as_deref(), Some("api"));
    assert_eq!(mirror.cell("team-a", 2, 1).as_deref(), Some("2"));

    // Operator asks for 5 replicas in the desired column.
    mirror
        .write_ranges("team-a", &[RangeWrite { range: "B2".into(), values: vec![vec!["5".into()]] }])
        .await
        .unwrap();

    let poller = DriftPoller::new(
        Arc::clone(&mirror) as Arc<dyn MirrorClient>,
        Arc::clone(&cluster) as Arc<dyn ClusterClient>,
        &settings,
    );
    poller.pass().await.expect("drift pass");
    assert_eq!(
        cluster.patches.lock().unwrap().clone(),
        vec![("team-a".to_string(), "api".to_string(), 5)]
    );

    // The cluster acknowledges through the watch feed; the next render
    // updates the actual column and the drift is settled.
    session.stream_once().await.expect("watch stream");
    assert_eq!(session.cursor(), "101");
    reconciler.pass().await.expect("second render");
    assert_eq!(mirror.cell("team-a", 2, 1).as_deref(), Some("5"));
    assert_eq!(mirror.cell("team-a", 1, 1).as_deref(), Some("5"), "operator's desired untouched");

    poller.pass().await.expect("settled drift pass");
    assert_eq!(
        cluster.patches.lock().unwrap().len(),
        1,
        "no further corrections once actual matches desired"
    );
}
