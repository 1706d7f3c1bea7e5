//! Turn the configured query specification into a validated, ordered list of query locations.

use std::path::Path;

use error_stack::{Report, ResultExt};
use globset::{GlobBuilder, GlobMatcher};
use serde::Serialize;
use tracing::{event, instrument, Level};

use crate::{
    config::{Configuration, QuerySpec},
    error::{SubmitError, SubmitResult},
    probe::CloudProbe,
    uri::{classify, split_bucket_uri, unrecognized_scheme, PathKind, RemoteScheme},
};

/// Files with this extension list one query location per line.
pub const QUERY_LIST_EXT: &str = ".query-list";

/// Characters that make an object key unusable as a query reference.
const UNSAFE_KEY_CHARS: &[char] = &[
    '@', '#', '$', '*', '{', '}', '^', '%', '`', '\\', '<', '>', '|', '"', '~', '[', ']',
];

/// Characters that make a query entry a wildcard pattern.
const WILDCARD_CHARS: [char; 3] = ['*', '?', '['];

/// An ordered, non-empty list of query locations, each of which passed validation. Order matters
/// because downstream batches are numbered from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct QuerySourceList(Vec<String>);

impl QuerySourceList {
    /// Validate a list of query locations. Every invalid entry is listed in the error.
    pub fn new(entries: Vec<String>) -> SubmitResult<Self> {
        if entries.is_empty() {
            return Err(Report::new(SubmitError::query_validation(
                "No query files were provided",
            )));
        }

        let invalid = entries
            .iter()
            .filter(|entry| !is_valid_query_location(entry))
            .map(|entry| format!("'{entry}'"))
            .collect::<Vec<_>>();

        if !invalid.is_empty() {
            return Err(Report::new(SubmitError::query_validation(format!(
                "Incorrect query file location(s): {}",
                invalid.join(", ")
            ))));
        }

        Ok(Self(entries))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}

fn is_list_file(path: &str) -> bool {
    path.ends_with(QUERY_LIST_EXT)
}

/// Parse list-file contents: one location per line, surrounding whitespace ignored, blank lines
/// skipped, order preserved.
pub fn parse_query_list(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// Resolve the configuration's query specification into a [QuerySourceList]. A list-file may
/// live on the local disk or in cloud storage; remote list-files are read through the probe.
///
/// Entries given directly in the configuration may use `*`, `?`, and `[...]` in their last path
/// segment. Local patterns are matched against the directory listing and bucket patterns against
/// the objects the probe lists, each expanding to its matches in sorted order. Entries read from
/// a list-file are used as written.
#[instrument(level = "debug", skip_all)]
pub async fn assemble_query_files(
    config: &Configuration,
    probe: &dyn CloudProbe,
) -> SubmitResult<QuerySourceList> {
    let entries = match &config.blast.queries {
        QuerySpec::Single(path) if is_list_file(path) => read_query_list(path, probe).await?,
        QuerySpec::Single(path) => expand_wildcards(std::slice::from_ref(path), probe).await?,
        QuerySpec::Many(paths) => expand_wildcards(paths, probe).await?,
    };

    event!(Level::DEBUG, count = entries.len(), "assembled query files");
    QuerySourceList::new(entries)
}

async fn read_query_list(path: &str, probe: &dyn CloudProbe) -> SubmitResult<Vec<String>> {
    let contents = match classify(path) {
        PathKind::Local => tokio::fs::read(path)
            .await
            .change_context_lazy(|| {
                SubmitError::query_validation(format!("Cannot read query list file {path}"))
            })?,
        PathKind::Remote(_) => probe.fetch_object(path).await.change_context_lazy(|| {
            SubmitError::query_validation(format!("Cannot read query list file {path}"))
        })?,
    };

    let contents = String::from_utf8(contents).change_context_lazy(|| {
        SubmitError::query_validation(format!("Query list file {path} is not valid text"))
    })?;

    Ok(parse_query_list(&contents))
}

/// Where the matches for a wildcard entry come from.
#[derive(Debug, PartialEq, Eq)]
enum WildcardSource<'a> {
    /// A local directory, searched for file names matching the last path segment.
    LocalDir { dir: &'a Path, name_pattern: &'a str },
    /// Objects under a bucket URI prefix, matched against the whole entry.
    Bucket { prefix: &'a str },
}

/// Decide whether an entry is a wildcard pattern that can be expanded. Only the last path
/// segment may hold wildcards, and everything else must already be a valid location; anything
/// else is left as written for validation to judge.
fn wildcard_source(entry: &str) -> Option<WildcardSource<'_>> {
    if !entry.contains(WILDCARD_CHARS) {
        return None;
    }

    match classify(entry) {
        PathKind::Local => {
            if !is_valid_local_path(entry) {
                return None;
            }
            let path = Path::new(entry);
            let dir = path.parent()?;
            let name_pattern = path.file_name()?.to_str()?;
            let dir_has_wildcard = dir.to_str()?.contains(WILDCARD_CHARS);
            (!dir_has_wildcard && name_pattern.contains(WILDCARD_CHARS))
                .then_some(WildcardSource::LocalDir { dir, name_pattern })
        }
        PathKind::Remote(scheme) if scheme.is_bucket_store() => {
            let (_, bucket, key) = split_bucket_uri(entry)?;
            let (dir, name) = key.rsplit_once('/').unwrap_or(("", key));
            let literal_key = key.replace(['*', '?', '[', ']'], "x");
            let ok = is_valid_bucket_name(scheme, bucket)
                && !dir.contains(WILDCARD_CHARS)
                && name.contains(WILDCARD_CHARS)
                && is_valid_object_key(&literal_key);
            let wildcard_at = entry.find(WILDCARD_CHARS)?;
            ok.then_some(WildcardSource::Bucket {
                prefix: &entry[..wildcard_at],
            })
        }
        PathKind::Remote(_) => None,
    }
}

fn wildcard_matcher(pattern: &str) -> SubmitResult<GlobMatcher> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .change_context_lazy(|| {
            SubmitError::query_validation(format!("Invalid wildcard pattern '{pattern}'"))
        })?;
    Ok(glob.compile_matcher())
}

async fn expand_wildcards(
    entries: &[String],
    probe: &dyn CloudProbe,
) -> SubmitResult<Vec<String>> {
    let mut expanded = Vec::with_capacity(entries.len());
    for entry in entries {
        let matches = match wildcard_source(entry) {
            None => {
                expanded.push(entry.clone());
                continue;
            }
            Some(WildcardSource::LocalDir { dir, name_pattern }) => {
                list_local_matches(entry, dir, name_pattern).await?
            }
            Some(WildcardSource::Bucket { prefix }) => {
                list_bucket_matches(entry, prefix, probe).await?
            }
        };

        if matches.is_empty() {
            return Err(Report::new(SubmitError::query_validation(format!(
                "No query files match '{entry}'"
            ))));
        }

        event!(Level::DEBUG, pattern = %entry, count = matches.len(), "expanded wildcard");
        expanded.extend(matches);
    }

    Ok(expanded)
}

async fn list_local_matches(
    pattern: &str,
    dir: &Path,
    name_pattern: &str,
) -> SubmitResult<Vec<String>> {
    let matcher = wildcard_matcher(name_pattern)?;
    let cannot_list =
        || SubmitError::query_validation(format!("Cannot list query files matching '{pattern}'"));

    let search_dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    let mut listing = tokio::fs::read_dir(search_dir)
        .await
        .change_context_lazy(cannot_list)?;

    let mut matches = Vec::new();
    while let Some(item) = listing.next_entry().await.change_context_lazy(cannot_list)? {
        let is_file = item
            .file_type()
            .await
            .change_context_lazy(cannot_list)?
            .is_file();
        let name = item.file_name();
        if is_file && matcher.is_match(&name) {
            matches.push(dir.join(&name).to_string_lossy().to_string());
        }
    }

    matches.sort();
    Ok(matches)
}

async fn list_bucket_matches(
    pattern: &str,
    prefix: &str,
    probe: &dyn CloudProbe,
) -> SubmitResult<Vec<String>> {
    let matcher = wildcard_matcher(pattern)?;
    let mut matches = probe
        .list_objects(prefix)
        .await
        .change_context_lazy(|| {
            SubmitError::query_validation(format!("Cannot list query files matching '{pattern}'"))
        })?
        .into_iter()
        .filter(|uri| matcher.is_match(uri.as_str()))
        .collect::<Vec<_>>();

    matches.sort();
    Ok(matches)
}

/// Syntactic check for a query location. Existence is not checked.
pub fn is_valid_query_location(location: &str) -> bool {
    match classify(location) {
        // A wildcard that was not expanded is never a usable location.
        PathKind::Local => is_valid_local_path(location) && !location.contains(['*', '?']),
        PathKind::Remote(scheme) if scheme.is_bucket_store() => split_bucket_uri(location)
            .map(|(_, bucket, key)| {
                is_valid_bucket_name(scheme, bucket) && is_valid_object_key(key)
            })
            .unwrap_or(false),
        PathKind::Remote(_) => is_valid_web_url(location),
    }
}

fn is_valid_local_path(path: &str) -> bool {
    !path.trim().is_empty() && !path.contains('\0') && unrecognized_scheme(path).is_none()
}

/// Bucket names are 3 to 63 lowercase letters, digits, dots, and dashes, starting and ending
/// with a letter or digit. Cloud Storage also allows underscores.
fn is_valid_bucket_name(scheme: RemoteScheme, bucket: &str) -> bool {
    let underscore_ok = scheme == RemoteScheme::Gs;
    let len_ok = (3..=63).contains(&bucket.len());
    let chars_ok = bucket.chars().all(|c| {
        c.is_ascii_lowercase()
            || c.is_ascii_digit()
            || matches!(c, '.' | '-')
            || (c == '_' && underscore_ok)
    });
    let edges_ok = bucket
        .chars()
        .next()
        .zip(bucket.chars().last())
        .map(|(first, last)| first.is_ascii_alphanumeric() && last.is_ascii_alphanumeric())
        .unwrap_or(false);

    len_ok && chars_ok && edges_ok
}

fn is_valid_object_key(key: &str) -> bool {
    !key.is_empty()
        && !key.ends_with('/')
        && !key
            .chars()
            .any(|c| c.is_control() || UNSAFE_KEY_CHARS.contains(&c))
}

fn is_valid_web_url(location: &str) -> bool {
    url::Url::parse(location)
        .map(|u| u.host_str().map(|h| !h.is_empty()).unwrap_or(false) && u.path() != "/")
        .unwrap_or(false)
}
