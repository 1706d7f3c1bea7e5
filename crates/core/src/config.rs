//! The resolved configuration of a single submission.

use std::collections::BTreeMap;

use error_stack::Report;
use serde::{Deserialize, Serialize};

use crate::{
    error::{SubmitError, SubmitResult},
    uri::RemoteScheme,
};

/// BLAST programs that the search image knows how to run.
pub const BLAST_PROGRAMS: &[&str] = &[
    "blastn",
    "blastp",
    "blastx",
    "tblastn",
    "tblastx",
    "psiblast",
    "rpsblast",
    "rpstblastn",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Gcp,
}

impl CloudProvider {
    /// The object storage scheme native to this provider.
    pub fn storage_scheme(&self) -> RemoteScheme {
        match self {
            CloudProvider::Aws => RemoteScheme::S3,
            CloudProvider::Gcp => RemoteScheme::Gs,
        }
    }

    /// Where the public BLAST databases are published for this provider.
    pub fn default_db_root(&self) -> &'static str {
        match self {
            CloudProvider::Aws => "s3://ncbi-blast-databases",
            CloudProvider::Gcp => "gs://blast-db",
        }
    }
}

impl std::fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CloudProvider::Aws => write!(f, "AWS"),
            CloudProvider::Gcp => write!(f, "GCP"),
        }
    }
}

/// Where the queries come from. A single path ending in
/// [QUERY_LIST_EXT](crate::query::QUERY_LIST_EXT) is read as a list-file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuerySpec {
    Single(String),
    Many(Vec<String>),
}

impl QuerySpec {
    fn entries(&self) -> Vec<&str> {
        match self {
            QuerySpec::Single(s) => vec![s.as_str()],
            QuerySpec::Many(v) => v.iter().map(String::as_str).collect(),
        }
    }
}

/// vCPU count and memory of the instances that run the search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InstanceProperties {
    pub vcpus: u32,
    pub memory_gb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CloudSettings {
    pub provider: CloudProvider,
    /// AWS region, or optionally a GCP region when no zone is given.
    #[serde(default)]
    pub region: Option<String>,
    /// GCP project
    #[serde(default)]
    pub project: Option<String>,
    /// GCP zone
    #[serde(default)]
    pub zone: Option<String>,
}

fn default_num_nodes() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterSettings {
    pub name: String,
    #[serde(default)]
    pub machine_type: Option<String>,
    #[serde(default = "default_num_nodes")]
    pub num_nodes: u32,
    /// vCPUs per instance
    pub num_cpus: u32,
    /// Memory per instance, in GB.
    pub mem_gb: f64,
    /// Labels applied to every resource created for the cluster.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BlastSettings {
    pub program: String,
    pub db: String,
    /// Overrides the provider's default database location.
    #[serde(default)]
    pub db_root: Option<String>,
    pub queries: QuerySpec,
    pub results: String,
}

/// Everything needed to run one submission. Built once, validated with
/// [Configuration::validate], and then only read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Configuration {
    pub cloud_provider: CloudSettings,
    pub cluster: ClusterSettings,
    pub blast: BlastSettings,
}

impl Configuration {
    pub fn provider(&self) -> CloudProvider {
        self.cloud_provider.provider
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster.name
    }

    pub fn instance_properties(&self) -> InstanceProperties {
        InstanceProperties {
            vcpus: self.cluster.num_cpus,
            memory_gb: self.cluster.mem_gb,
        }
    }

    /// The database root with any trailing slash removed.
    pub fn db_root(&self) -> &str {
        self.blast
            .db_root
            .as_deref()
            .unwrap_or_else(|| self.provider().default_db_root())
            .trim_end_matches('/')
    }

    /// Check that the configuration is complete and internally consistent. Every problem found
    /// is listed in the error message.
    pub fn validate(&self) -> SubmitResult<()> {
        let mut problems = Vec::new();

        for (field, value) in self.text_fields() {
            if value.trim().is_empty() {
                problems.push(format!("{field} must not be empty"));
            } else if value.contains("${") {
                problems.push(format!("{field} has an unresolved placeholder: {value}"));
            }
        }

        match self.provider() {
            CloudProvider::Aws => {
                if self.cloud_provider.region.is_none() {
                    problems.push("an AWS region is required".to_string());
                }
            }
            CloudProvider::Gcp => {
                if self.cloud_provider.project.is_none() {
                    problems.push("a GCP project is required".to_string());
                }
                if self.cloud_provider.zone.is_none() && self.cloud_provider.region.is_none() {
                    problems.push("a GCP zone or region is required".to_string());
                }
            }
        }

        if !BLAST_PROGRAMS.contains(&self.blast.program.as_str()) {
            problems.push(format!(
                "{} is not a supported BLAST program",
                self.blast.program
            ));
        }

        let scheme = self.provider().storage_scheme();
        if !self.blast.results.starts_with(scheme.prefix()) {
            problems.push(format!(
                "results location {} must start with {} for {}",
                self.blast.results,
                scheme.prefix(),
                self.provider()
            ));
        }

        if self.cluster.num_cpus == 0 {
            problems.push("num-cpus must be greater than zero".to_string());
        }
        if self.cluster.mem_gb.is_nan() || self.cluster.mem_gb <= 0.0 {
            problems.push("mem-gb must be greater than zero".to_string());
        }
        if self.cluster.num_nodes == 0 {
            problems.push("num-nodes must be greater than zero".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Report::new(SubmitError::config(format!(
                "Invalid configuration: {}",
                problems.join("; ")
            ))))
        }
    }

    fn text_fields(&self) -> Vec<(String, &str)> {
        let mut fields = vec![
            ("cluster name".to_string(), self.cluster.name.as_str()),
            ("program".to_string(), self.blast.program.as_str()),
            ("db".to_string(), self.blast.db.as_str()),
            ("results".to_string(), self.blast.results.as_str()),
        ];

        let optional = [
            ("region", &self.cloud_provider.region),
            ("project", &self.cloud_provider.project),
            ("zone", &self.cloud_provider.zone),
            ("machine-type", &self.cluster.machine_type),
            ("db-root", &self.blast.db_root),
        ];
        fields.extend(
            optional
                .into_iter()
                .filter_map(|(name, value)| value.as_deref().map(|v| (name.to_string(), v))),
        );

        fields.extend(
            self.blast
                .queries
                .entries()
                .into_iter()
                .map(|q| ("queries".to_string(), q)),
        );

        fields.extend(
            self.cluster
                .labels
                .iter()
                .map(|(k, v)| (format!("label {k}"), v.as_str())),
        );

        fields
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::SubmitErrorKind;

    pub(crate) fn aws_config() -> Configuration {
        Configuration {
            cloud_provider: CloudSettings {
                provider: CloudProvider::Aws,
                region: Some("us-east-1".to_string()),
                project: None,
                zone: None,
            },
            cluster: ClusterSettings {
                name: "test-cluster".to_string(),
                machine_type: Some("m5.8xlarge".to_string()),
                num_nodes: 1,
                num_cpus: 32,
                mem_gb: 120.0,
                labels: BTreeMap::new(),
            },
            blast: BlastSettings {
                program: "blastn".to_string(),
                db: "test-db".to_string(),
                db_root: None,
                queries: QuerySpec::Single("queries.fa".to_string()),
                results: "s3://test-results".to_string(),
            },
        }
    }

    #[test]
    fn valid_config() {
        aws_config().validate().expect("config should be valid");
    }

    #[test]
    fn unresolved_placeholder() {
        let mut cfg = aws_config();
        cfg.blast.db = "${DB_NAME}".to_string();
        let err = cfg.validate().unwrap_err();
        assert_eq!(err.current_context().kind, SubmitErrorKind::Config);
        assert!(err.current_context().message.contains("${DB_NAME}"));
    }

    #[test]
    fn reports_every_problem() {
        let mut cfg = aws_config();
        cfg.blast.program = "blastz".to_string();
        cfg.blast.results = "gs://wrong-cloud".to_string();
        cfg.cluster.num_cpus = 0;

        let err = cfg.validate().unwrap_err();
        let message = &err.current_context().message;
        assert!(message.contains("blastz"));
        assert!(message.contains("gs://wrong-cloud"));
        assert!(message.contains("num-cpus"));
    }

    #[test]
    fn gcp_requires_project() {
        let mut cfg = aws_config();
        cfg.cloud_provider.provider = CloudProvider::Gcp;
        cfg.cloud_provider.zone = Some("us-east4-b".to_string());
        cfg.blast.results = "gs://results".to_string();

        let err = cfg.validate().unwrap_err();
        assert!(err.current_context().message.contains("GCP project"));
    }

    #[test]
    fn db_root_defaults_per_provider() {
        let mut cfg = aws_config();
        assert_eq!(cfg.db_root(), "s3://ncbi-blast-databases");

        cfg.blast.db_root = Some("s3://my-dbs/".to_string());
        assert_eq!(cfg.db_root(), "s3://my-dbs");

        cfg.cloud_provider.provider = CloudProvider::Gcp;
        cfg.blast.db_root = None;
        assert_eq!(cfg.db_root(), "gs://blast-db");
    }

    #[test]
    fn queries_accept_string_or_list() {
        let single: QuerySpec = serde_json::from_str(r#""q.fa""#).unwrap();
        assert_eq!(single, QuerySpec::Single("q.fa".to_string()));

        let many: QuerySpec = serde_json::from_str(r#"["a.fa", "b.fa"]"#).unwrap();
        assert_eq!(
            many,
            QuerySpec::Many(vec!["a.fa".to_string(), "b.fa".to_string()])
        );
    }
}
