//! Classify paths as local files or remote objects.
//!
//! Classification is a pure prefix check. Nothing here touches the filesystem or the network.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteScheme {
    S3,
    Gs,
    Http,
    Https,
    Ftp,
}

impl RemoteScheme {
    pub const ALL: [RemoteScheme; 5] = [
        RemoteScheme::S3,
        RemoteScheme::Gs,
        RemoteScheme::Http,
        RemoteScheme::Https,
        RemoteScheme::Ftp,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            RemoteScheme::S3 => "s3://",
            RemoteScheme::Gs => "gs://",
            RemoteScheme::Http => "http://",
            RemoteScheme::Https => "https://",
            RemoteScheme::Ftp => "ftp://",
        }
    }

    /// True for object storage schemes whose URIs are `<scheme>://<bucket>/<key>`.
    pub fn is_bucket_store(&self) -> bool {
        matches!(self, RemoteScheme::S3 | RemoteScheme::Gs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Local,
    Remote(RemoteScheme),
}

/// Classify a path. Only an exact, case-sensitive prefix match on one of the recognized schemes
/// makes a path remote.
pub fn classify(path: &str) -> PathKind {
    RemoteScheme::ALL
        .into_iter()
        .find(|scheme| path.starts_with(scheme.prefix()))
        .map(PathKind::Remote)
        .unwrap_or(PathKind::Local)
}

pub fn is_remote(path: &str) -> bool {
    matches!(classify(path), PathKind::Remote(_))
}

/// Returns true only if every path is local.
pub fn are_files_on_localhost<S: AsRef<str>>(paths: &[S]) -> bool {
    paths.iter().all(|p| !is_remote(p.as_ref()))
}

/// If the path starts with something shaped like a URI scheme that is not one of the
/// recognized ones (`az://...`), return that scheme.
pub fn unrecognized_scheme(path: &str) -> Option<&str> {
    if is_remote(path) {
        return None;
    }

    let (scheme, _) = path.split_once("://")?;
    let mut chars = scheme.chars();
    let first_ok = chars.next().map(|c| c.is_ascii_alphabetic()).unwrap_or(false);
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

    (first_ok && rest_ok).then_some(scheme)
}

/// Split a bucket-style URI into its bucket and key. The key may be empty.
pub fn split_bucket_uri(uri: &str) -> Option<(RemoteScheme, &str, &str)> {
    let PathKind::Remote(scheme) = classify(uri) else {
        return None;
    };

    if !scheme.is_bucket_store() {
        return None;
    }

    let rest = &uri[scheme.prefix().len()..];
    let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
    Some((scheme, bucket, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localhost_predicate() {
        assert!(are_files_on_localhost(&["valid/local/path"]));
        assert!(!are_files_on_localhost(&[
            "s3://bucket/key",
            "valid/local/path"
        ]));
        assert!(!are_files_on_localhost(&["valid/local/path", "gs://foo-bar"]));
        assert!(!are_files_on_localhost(&["http://x"]));
        assert!(!are_files_on_localhost(&["https://foo-bar"]));
        assert!(!are_files_on_localhost(&["ftp://foo-bar"]));
        assert!(are_files_on_localhost(&["this-file-does-not-exist"]));
    }

    #[test]
    fn scheme_must_be_a_prefix() {
        assert!(are_files_on_localhost(&["/tmp/this-file-does-not-existsftp"]));
        assert!(are_files_on_localhost(&["/tmp/this-file-does-not-exists3://"]));
        assert!(are_files_on_localhost(&["queries/ftp-dump.fa"]));
    }

    #[test]
    fn scheme_is_case_sensitive() {
        assert_eq!(classify("S3://bucket/key"), PathKind::Local);
        assert_eq!(
            classify("https://example.com/q.fa"),
            PathKind::Remote(RemoteScheme::Https)
        );
        assert_eq!(
            classify("http://example.com/q.fa"),
            PathKind::Remote(RemoteScheme::Http)
        );
    }

    #[test]
    fn empty_sequence_is_local() {
        let empty: [&str; 0] = [];
        assert!(are_files_on_localhost(&empty));
    }

    #[test]
    fn unrecognized() {
        assert_eq!(unrecognized_scheme("az://container/q.fa"), Some("az"));
        assert_eq!(unrecognized_scheme("s3://bucket/q.fa"), None);
        assert_eq!(unrecognized_scheme("dir/q.fa"), None);
        assert_eq!(unrecognized_scheme("dir/a://b"), None);
    }

    #[test]
    fn bucket_uri() {
        assert_eq!(
            split_bucket_uri("gs://blast-db/2020-20-20/blastdb-manifest.json"),
            Some((
                RemoteScheme::Gs,
                "blast-db",
                "2020-20-20/blastdb-manifest.json"
            ))
        );
        assert_eq!(
            split_bucket_uri("s3://bucket"),
            Some((RemoteScheme::S3, "bucket", ""))
        );
        assert_eq!(split_bucket_uri("https://example.com/a"), None);
    }
}
