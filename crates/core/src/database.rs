//! Locate the configured BLAST database in the provider's database bucket and read its metadata.
//!
//! Databases are published in dated snapshot directories. A pointer object at the database root
//! names the latest snapshot, and each snapshot holds a JSON manifest mapping database names to
//! their metadata.

use std::collections::BTreeMap;

use error_stack::{Report, ResultExt};
use serde::{Deserialize, Serialize};
use tracing::{event, instrument, Level};

use crate::{
    config::{Configuration, InstanceProperties},
    error::{SubmitError, SubmitResult},
    probe::CloudProbe,
};

/// Object at the database root whose contents name the latest snapshot directory.
pub const LATEST_DIR_POINTER: &str = "latest-dir";
/// Manifest file inside each snapshot directory.
pub const MANIFEST_FILE: &str = "blastdb-manifest.json";
/// Memory needed per GB of database, so the database fits in RAM with some headroom.
pub const MEMORY_MARGIN: f64 = 1.1;

/// Metadata for one database in the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseEntry {
    /// Size in GB
    pub size: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A snapshot's manifest. Entries are only decoded when looked up, so one malformed entry does
/// not hide the others.
pub type DatabaseManifest = BTreeMap<String, serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedDatabase {
    pub name: String,
    /// The snapshot directory the manifest was read from.
    pub snapshot: String,
    pub metadata: DatabaseEntry,
}

impl ResolvedDatabase {
    pub fn resource_hints(&self) -> ResourceHints {
        ResourceHints::for_size(self.metadata.size)
    }
}

/// Sizing derived from the database.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceHints {
    pub db_size_gb: f64,
    pub min_memory_gb: u64,
}

impl ResourceHints {
    pub fn for_size(db_size_gb: f64) -> Self {
        Self {
            db_size_gb,
            min_memory_gb: (db_size_gb * MEMORY_MARGIN).ceil().max(0.0) as u64,
        }
    }

    /// Fail if an instance does not have enough memory to hold the database.
    pub fn check_instance(&self, instance: &InstanceProperties) -> SubmitResult<()> {
        if instance.memory_gb < self.min_memory_gb as f64 {
            return Err(Report::new(SubmitError::config(format!(
                "Instances with {} GB of memory are too small for a {} GB database; at least {} GB is required",
                instance.memory_gb, self.db_size_gb, self.min_memory_gb
            ))));
        }

        Ok(())
    }
}

pub struct DatabaseResolver<'a> {
    probe: &'a dyn CloudProbe,
    root: String,
}

impl<'a> DatabaseResolver<'a> {
    pub fn new(probe: &'a dyn CloudProbe, root: impl Into<String>) -> Self {
        Self {
            probe,
            root: root.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn for_config(probe: &'a dyn CloudProbe, config: &Configuration) -> Self {
        Self::new(probe, config.db_root())
    }

    /// Find `name` in the latest snapshot's manifest. Fetch failures, a malformed manifest,
    /// and a name missing from the manifest all produce the same
    /// [DatabaseNotFound](crate::SubmitErrorKind::DatabaseNotFound) error.
    #[instrument(level = "debug", skip(self), fields(root = %self.root))]
    pub async fn resolve(&self, name: &str) -> SubmitResult<ResolvedDatabase> {
        let not_found = || SubmitError::database_not_found(name);

        let pointer_uri = format!("{}/{LATEST_DIR_POINTER}", self.root);
        let pointer = self
            .probe
            .fetch_object(&pointer_uri)
            .await
            .change_context_lazy(not_found)?;

        let snapshot = String::from_utf8_lossy(&pointer).trim().to_string();
        if snapshot.is_empty() {
            return Err(Report::new(not_found())
                .attach_printable(format!("{pointer_uri} does not name a snapshot")));
        }

        let manifest_uri = format!("{}/{snapshot}/{MANIFEST_FILE}", self.root);
        let manifest = self
            .probe
            .fetch_object(&manifest_uri)
            .await
            .change_context_lazy(not_found)?;

        let mut manifest: DatabaseManifest = serde_json::from_slice(&manifest)
            .change_context_lazy(not_found)
            .attach_printable_lazy(|| format!("Parsing manifest {manifest_uri}"))?;

        let entry = manifest
            .remove(name)
            .ok_or_else(not_found)
            .attach_printable_lazy(|| format!("{name} is not listed in {manifest_uri}"))?;

        let metadata: DatabaseEntry = serde_json::from_value(entry)
            .change_context_lazy(not_found)
            .attach_printable_lazy(|| format!("Parsing the {name} entry of {manifest_uri}"))?;

        event!(Level::DEBUG, %snapshot, size = metadata.size, "resolved database");

        Ok(ResolvedDatabase {
            name: name.to_string(),
            snapshot,
            metadata,
        })
    }
}
