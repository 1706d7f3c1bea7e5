//! Load a [Configuration] from a TOML file and apply command-line overrides.

use std::path::Path;

use blastlane_core::{Configuration, SubmitError, SubmitResult};
use error_stack::{Report, ResultExt};
use toml::{Table, Value};

use crate::args::Overrides;

pub async fn load_config(path: &Path, overrides: &Overrides) -> SubmitResult<Configuration> {
    let text = tokio::fs::read_to_string(path)
        .await
        .change_context_lazy(|| {
            SubmitError::config(format!(
                "Failed to read configuration file {}",
                path.display()
            ))
        })?;

    parse_config(&text, overrides).attach_printable_lazy(|| format!("File: {}", path.display()))
}

/// Overrides are applied before deserializing, so a value given on the command line may be
/// missing from the file.
pub fn parse_config(text: &str, overrides: &Overrides) -> SubmitResult<Configuration> {
    let mut table: Table = toml::from_str(text)
        .map_err(|e| invalid_config(format!("Invalid configuration file: {e}")))?;

    apply_overrides(&mut table, overrides)?;

    Value::Table(table)
        .try_into::<Configuration>()
        .map_err(|e| invalid_config(format!("Invalid configuration file: {e}")))
}

fn invalid_config(message: String) -> Report<SubmitError> {
    Report::new(SubmitError::config(message))
}

fn apply_overrides(table: &mut Table, overrides: &Overrides) -> SubmitResult<()> {
    let blast = table
        .entry("blast")
        .or_insert_with(|| Value::Table(Table::new()));
    let Value::Table(blast) = blast else {
        return Err(invalid_config(
            "Invalid configuration file: [blast] must be a table".to_string(),
        ));
    };

    let scalars = [
        ("results", &overrides.results),
        ("program", &overrides.program),
        ("db", &overrides.db),
    ];
    for (key, value) in scalars {
        if let Some(value) = value {
            blast.insert(key.to_string(), Value::String(value.clone()));
        }
    }

    match overrides.queries.as_slice() {
        [] => {}
        [single] => {
            blast.insert("queries".to_string(), Value::String(single.clone()));
        }
        many => {
            let many = many.iter().cloned().map(Value::String).collect();
            blast.insert("queries".to_string(), Value::Array(many));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use blastlane_core::{CloudProvider, QuerySpec, SubmitErrorKind};

    use super::*;

    const AWS_CONFIG: &str = r#"
[cloud-provider]
provider = "aws"
region = "us-east-1"

[cluster]
name = "search-cluster"
machine-type = "m5.8xlarge"
num-cpus = 32
mem-gb = 120.0

[cluster.labels]
team = "genomics"

[blast]
program = "blastn"
db = "nt"
queries = "s3://queries/batch.query-list"
results = "s3://results/run-1"
"#;

    #[test]
    fn parse_file() {
        let config = parse_config(AWS_CONFIG, &Overrides::default()).expect("parsing");
        assert_eq!(config.provider(), CloudProvider::Aws);
        assert_eq!(config.cluster_name(), "search-cluster");
        assert_eq!(config.cluster.num_nodes, 1);
        assert_eq!(config.cluster.labels["team"], "genomics");
        assert_eq!(
            config.blast.queries,
            QuerySpec::Single("s3://queries/batch.query-list".to_string())
        );
        config.validate().expect("valid config");
    }

    #[test]
    fn overrides_replace_file_values() {
        let overrides = Overrides {
            results: Some("s3://results/run-2".to_string()),
            program: Some("blastp".to_string()),
            db: Some("nr".to_string()),
            queries: vec!["a.fa".to_string(), "b.fa".to_string()],
        };

        let config = parse_config(AWS_CONFIG, &overrides).expect("parsing");
        assert_eq!(config.blast.results, "s3://results/run-2");
        assert_eq!(config.blast.program, "blastp");
        assert_eq!(config.blast.db, "nr");
        assert_eq!(
            config.blast.queries,
            QuerySpec::Many(vec!["a.fa".to_string(), "b.fa".to_string()])
        );
    }

    #[test]
    fn overrides_fill_missing_values() {
        let text = AWS_CONFIG.replace("db = \"nt\"\n", "");
        parse_config(&text, &Overrides::default()).expect_err("db is missing");

        let overrides = Overrides {
            db: Some("swissprot".to_string()),
            ..Default::default()
        };
        let config = parse_config(&text, &overrides).expect("parsing");
        assert_eq!(config.blast.db, "swissprot");
    }

    #[test]
    fn bad_toml() {
        let err = parse_config("[cluster\nname = 1", &Overrides::default())
            .expect_err("should fail");
        assert_eq!(err.current_context().kind, SubmitErrorKind::Config);
        assert!(err
            .current_context()
            .message
            .starts_with("Invalid configuration file"));
    }

    #[test]
    fn unknown_provider() {
        let text = AWS_CONFIG.replace("\"aws\"", "\"azure\"");
        let err = parse_config(&text, &Overrides::default()).expect_err("should fail");
        assert_eq!(err.current_context().kind, SubmitErrorKind::Config);
    }

    #[tokio::test]
    async fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(AWS_CONFIG.as_bytes()).unwrap();

        let config = load_config(file.path(), &Overrides::default())
            .await
            .expect("loading");
        assert_eq!(config.blast.db, "nt");
    }

    #[tokio::test]
    async fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        let err = load_config(&path, &Overrides::default())
            .await
            .expect_err("file does not exist");
        assert_eq!(err.current_context().kind, SubmitErrorKind::Config);
        assert!(err
            .current_context()
            .message
            .contains("Failed to read configuration file"));
    }
}
