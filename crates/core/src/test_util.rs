use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use error_stack::Report;
use once_cell::sync::Lazy;

use crate::{
    config::Configuration,
    error::{SubmitError, SubmitResult},
    probe::{CloudProbe, ClusterStatus},
    submit::{JobLauncher, Submission},
};

pub static TRACING: Lazy<()> = Lazy::new(|| {
    if std::env::var("TEST_LOG").is_ok() {
        configure_tracing();
    }
});

fn configure_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    let tree = tracing_tree::HierarchicalLayer::new(2)
        .with_targets(true)
        .with_bracketed_fields(true);

    let subscriber = tracing_subscriber::Registry::default().with(tree);

    tracing::subscriber::set_global_default(subscriber).unwrap();
}

pub fn setup_test_tracing() {
    Lazy::force(&TRACING);
}

/// A [CloudProbe] that serves canned objects and records every call made to it.
pub struct MockProbe {
    status: Mutex<ClusterStatus>,
    objects: HashMap<String, Vec<u8>>,
    fail_create: bool,
    fail_cleanup: bool,
    hang_create: bool,
    hang_fetches: HashSet<String>,
    calls: Mutex<Vec<String>>,
    cleanups: AtomicUsize,
}

impl Default for MockProbe {
    fn default() -> Self {
        Self {
            status: Mutex::new(ClusterStatus::Absent),
            objects: HashMap::new(),
            fail_create: false,
            fail_cleanup: false,
            hang_create: false,
            hang_fetches: HashSet::new(),
            calls: Mutex::new(Vec::new()),
            cleanups: AtomicUsize::new(0),
        }
    }
}

impl MockProbe {
    pub fn with_status(self, status: ClusterStatus) -> Self {
        *self.status.lock().unwrap() = status;
        self
    }

    pub fn with_object(mut self, uri: &str, contents: &str) -> Self {
        self.objects
            .insert(uri.to_string(), contents.as_bytes().to_vec());
        self
    }

    /// The standard database layout with `nt` and `nr` in the latest snapshot.
    pub fn with_manifest(self, root: &str) -> Self {
        self.with_object(&format!("{root}/latest-dir"), "2020-20-20\n")
            .with_object(
                &format!("{root}/2020-20-20/blastdb-manifest.json"),
                r#"{"nt":{"size":93.36}, "nr":{"size":227.4}}"#,
            )
    }

    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    pub fn failing_cleanup(mut self) -> Self {
        self.fail_cleanup = true;
        self
    }

    /// Never finish creating the cluster.
    pub fn hanging_create(mut self) -> Self {
        self.hang_create = true;
        self
    }

    /// Never finish fetching `uri`.
    pub fn hanging_fetch(mut self, uri: &str) -> Self {
        self.hang_fetches.insert(uri.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fetches(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix("fetch ").map(String::from))
            .collect()
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl CloudProbe for MockProbe {
    async fn check_cluster(&self, _config: &Configuration) -> SubmitResult<ClusterStatus> {
        self.record("check_cluster");
        Ok(*self.status.lock().unwrap())
    }

    async fn fetch_object(&self, uri: &str) -> SubmitResult<Vec<u8>> {
        self.record(format!("fetch {uri}"));
        if self.hang_fetches.contains(uri) {
            std::future::pending::<()>().await;
        }
        self.objects
            .get(uri)
            .cloned()
            .ok_or_else(|| Report::new(SubmitError::fetch(format!("{uri} not found"))))
    }

    async fn list_objects(&self, prefix: &str) -> SubmitResult<Vec<String>> {
        self.record(format!("list {prefix}"));
        let mut uris = self
            .objects
            .keys()
            .filter(|uri| uri.starts_with(prefix))
            .cloned()
            .collect::<Vec<_>>();
        uris.sort();
        Ok(uris)
    }

    async fn create_cluster(&self, _config: &Configuration) -> SubmitResult<()> {
        self.record("create_cluster");
        if self.hang_create {
            std::future::pending::<()>().await;
        }
        if self.fail_create {
            return Err(Report::new(SubmitError::cluster_state(
                "quota exceeded while creating cluster",
            )));
        }

        *self.status.lock().unwrap() = ClusterStatus::Running;
        Ok(())
    }

    async fn delete_cluster_with_cleanup(&self, _config: &Configuration) -> SubmitResult<()> {
        self.record("delete_cluster_with_cleanup");
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        if self.fail_cleanup {
            return Err(Report::new(SubmitError::cluster_state(
                "permission denied while deleting cluster",
            )));
        }

        *self.status.lock().unwrap() = ClusterStatus::Absent;
        Ok(())
    }
}

/// A [JobLauncher] that remembers what it launched, or fails if asked to.
#[derive(Default)]
pub struct MockLauncher {
    pub fail: bool,
    pub launched: Mutex<Vec<Submission>>,
}

#[async_trait]
impl JobLauncher for MockLauncher {
    async fn launch(&self, submission: &Submission) -> SubmitResult<()> {
        if self.fail {
            return Err(Report::new(SubmitError::submission("job launcher unavailable")));
        }

        self.launched.lock().unwrap().push(submission.clone());
        Ok(())
    }
}
