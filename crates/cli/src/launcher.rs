//! Hands a validated submission to whatever runs the search, as JSON.

use std::path::PathBuf;

use async_trait::async_trait;
use blastlane_core::{JobLauncher, Submission, SubmitError, SubmitResult};
use error_stack::ResultExt;
use tokio::io::AsyncWriteExt;
use tracing::{event, Level};

/// Writes the submission to a handoff file, or to stdout when no file is given.
#[derive(Debug, Clone, Default)]
pub struct HandoffLauncher {
    pub path: Option<PathBuf>,
}

impl HandoffLauncher {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

#[async_trait]
impl JobLauncher for HandoffLauncher {
    async fn launch(&self, submission: &Submission) -> SubmitResult<()> {
        let mut json = serde_json::to_vec_pretty(submission)
            .change_context_lazy(|| SubmitError::submission("Failed to serialize submission"))?;
        json.push(b'\n');

        match &self.path {
            Some(path) => {
                tokio::fs::write(path, &json).await.change_context_lazy(|| {
                    SubmitError::submission(format!(
                        "Failed to write submission to {}",
                        path.display()
                    ))
                })?;
                event!(Level::INFO, path = %path.display(), "wrote submission");
            }
            None => {
                let mut stdout = tokio::io::stdout();
                stdout
                    .write_all(&json)
                    .await
                    .change_context_lazy(|| {
                        SubmitError::submission("Failed to write submission")
                    })?;
                stdout.flush().await.change_context_lazy(|| {
                    SubmitError::submission("Failed to write submission")
                })?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use blastlane_core::{
        CloudProvider, QuerySourceList, ResolvedDatabase, SubmitErrorKind,
    };

    use super::*;

    fn submission() -> Submission {
        let database = ResolvedDatabase {
            name: "nt".to_string(),
            snapshot: "2020-20-20".to_string(),
            metadata: serde_json::from_str(r#"{"size": 93.36}"#).unwrap(),
        };
        Submission {
            cluster_name: "search-cluster".to_string(),
            provider: CloudProvider::Aws,
            cluster_created: true,
            program: "blastn".to_string(),
            resource_hints: database.resource_hints(),
            database,
            queries: QuerySourceList::new(vec!["s3://queries/a.fa".to_string()]).unwrap(),
            results: "s3://results/run-1".to_string(),
        }
    }

    #[tokio::test]
    async fn writes_handoff_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("submission.json");

        HandoffLauncher::new(Some(path.clone()))
            .launch(&submission())
            .await
            .expect("launching");

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["cluster_name"], "search-cluster");
        assert_eq!(written["database"]["name"], "nt");
        assert_eq!(written["resource_hints"]["min_memory_gb"], 103);
        assert_eq!(written["queries"][0], "s3://queries/a.fa");
    }

    #[tokio::test]
    async fn unwritable_handoff_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("submission.json");

        let err = HandoffLauncher::new(Some(path))
            .launch(&submission())
            .await
            .expect_err("directory does not exist");
        assert_eq!(err.current_context().kind, SubmitErrorKind::Submission);
    }
}
