//! Partition resolution: date range + path template → ordered blob list.
//!
//! A partition is the set of blobs under one calendar day of the template.
//! Days may hold timestamped sub-partitions (snapshots), of which the
//! newest one carrying a `.complete` marker and no `.ignore` marker wins
//! ("as-at" selection). `BACKOUT/` quarantine and `_SYS.` sidecar blobs are
//! excluded from the data set but remain visible to index discovery.

use std::sync::Arc;

use chrono::{Days, NaiveDate};

use crate::{
    cursor::Cursor,
    error::{Error, Result},
    index::SIDECAR_PREFIX,
    logging::granary_log,
    store::BlobStore,
};

/// Marker filename declaring a (sub-)partition ready.
pub const COMPLETE_MARKER: &str = ".complete";

/// Marker filename invalidating a (sub-)partition.
pub const IGNORE_MARKER: &str = ".ignore";

/// Quarantine sub-path holding backed-out records.
pub const BACKOUT_SEGMENT: &str = "BACKOUT";

/// Catalog configuration.
///
/// `template` must contain the `{date}` placeholder; each candidate day is
/// formatted with `date_format` and substituted in.
#[derive(Clone, Debug)]
pub struct CatalogConfig {
    pub(crate) template: String,
    pub(crate) date_format: String,
    pub(crate) step_back_limit: u32,
}

impl CatalogConfig {
    /// Config for `template` with ISO dates and no step-back allowance.
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            date_format: "%Y-%m-%d".to_owned(),
            step_back_limit: 0,
        }
    }

    /// Override the chrono format used for the `{date}` placeholder.
    #[must_use]
    pub fn date_format(self, format: impl Into<String>) -> Self {
        Self {
            date_format: format.into(),
            ..self
        }
    }

    /// How many whole-range one-day shifts backward are allowed when the
    /// range as given yields zero usable blobs.
    #[must_use]
    pub fn step_back_limit(self, limit: u32) -> Self {
        Self {
            step_back_limit: limit,
            ..self
        }
    }
}

/// Blobs grouped under one cycle date.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Partition {
    /// Integer partition id: days since the Unix epoch.
    pub id: u64,
    /// Cycle date.
    pub date: NaiveDate,
    /// Ordered data blobs; empty when no snapshot qualified for this date.
    pub blobs: Vec<String>,
}

impl Partition {
    /// Resumption marker pointing at `offset` within this partition.
    #[must_use]
    pub fn cursor_at(&self, offset: u64) -> Cursor {
        Cursor::at(self.id, offset)
    }
}

/// Resolves date ranges against a [`BlobStore`].
pub struct PartitionCatalog {
    store: Arc<dyn BlobStore>,
    config: CatalogConfig,
}

impl PartitionCatalog {
    /// Catalog over `store` with `config`.
    pub fn new(store: Arc<dyn BlobStore>, config: CatalogConfig) -> Self {
        Self { store, config }
    }

    /// Resolve `[start, end]` inclusive into ordered partitions.
    ///
    /// When the range yields zero usable blobs, both dates shift back one
    /// day at a time up to the configured limit; exhausting the limit is
    /// fatal, distinguishing "genuinely empty dataset" from
    /// "policy-exhausted search".
    pub fn resolve(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Partition>> {
        if start > end {
            return Err(Error::Syntax(format!(
                "start date {start} is after end date {end}"
            )));
        }
        // Without the placeholder every day would expand to the same prefix
        // and duplicate its blobs once per day in the range.
        if !self.config.template.contains("{date}") {
            return Err(Error::Syntax(format!(
                "catalog template '{}' lacks a {{date}} placeholder",
                self.config.template
            )));
        }
        let mut shift = 0u32;
        loop {
            let days = Days::new(u64::from(shift));
            let (from, to) = match (start.checked_sub_days(days), end.checked_sub_days(days)) {
                (Some(from), Some(to)) => (from, to),
                _ => break,
            };
            let partitions = self.resolve_range(from, to)?;
            if partitions.iter().any(|p| !p.blobs.is_empty()) {
                if shift > 0 {
                    granary_log!(
                        log::Level::Info,
                        "catalog_step_back",
                        "shift_days={shift} from={from} to={to}"
                    );
                }
                return Ok(partitions);
            }
            if shift >= self.config.step_back_limit {
                break;
            }
            shift += 1;
        }
        Err(Error::DataNotFound(format!(
            "no usable blobs in [{start}, {end}] after {} step-back day(s)",
            self.config.step_back_limit
        )))
    }

    fn resolve_range(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<Partition>> {
        let mut partitions = Vec::new();
        let mut day = start;
        while day <= end {
            partitions.push(self.resolve_day(day)?);
            let Some(next) = day.succ_opt() else { break };
            day = next;
        }
        Ok(partitions)
    }

    fn resolve_day(&self, date: NaiveDate) -> Result<Partition> {
        let stamp = date.format(&self.config.date_format).to_string();
        let mut prefix = self.config.template.replace("{date}", &stamp);
        // List with a trailing separator so one day's prefix can never
        // capture a longer sibling (2024-01-1 vs 2024-01-10).
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        let names = self.store.list_blobs(&prefix)?;

        let snapshots = snapshot_groups(&prefix, &names);
        let blobs = if snapshots.is_empty() {
            if has_marker(&names, IGNORE_MARKER) {
                granary_log!(log::Level::Info, "partition_ignored", "prefix={prefix}");
                Vec::new()
            } else {
                data_blobs(&names)
            }
        } else {
            select_snapshot(&prefix, &snapshots)
        };
        Ok(Partition {
            id: partition_id(date),
            date,
            blobs,
        })
    }
}

/// Flatten resolved partitions into the blob list a scan consumes,
/// optionally resuming after `cursor`.
#[must_use]
pub fn blobs_from(partitions: &[Partition], cursor: Option<Cursor>) -> Vec<String> {
    let mut out = Vec::new();
    for partition in partitions {
        match cursor {
            Some(c) if partition.id < c.partition => continue,
            Some(c) if partition.id == c.partition => {
                out.extend(
                    partition
                        .blobs
                        .iter()
                        .skip(c.offset as usize)
                        .cloned(),
                );
            }
            _ => out.extend(partition.blobs.iter().cloned()),
        }
    }
    out
}

fn partition_id(date: NaiveDate) -> u64 {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch date");
    date.signed_duration_since(epoch).num_days().max(0) as u64
}

fn filename(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn is_data_blob(name: &str) -> bool {
    let file = filename(name);
    !name
        .split('/')
        .any(|segment| segment == BACKOUT_SEGMENT)
        && !file.starts_with(SIDECAR_PREFIX)
        && file != COMPLETE_MARKER
        && file != IGNORE_MARKER
}

fn data_blobs(names: &[String]) -> Vec<String> {
    names
        .iter()
        .filter(|n| is_data_blob(n))
        .cloned()
        .collect()
}

fn has_marker(names: &[String], marker: &str) -> bool {
    names.iter().any(|n| filename(n) == marker)
}

/// Group listed names by timestamped sub-directory directly under the
/// partition prefix. A segment counts as a timestamp when it is non-empty,
/// starts with a digit and contains only digits, `T`, `-` and `:`.
fn snapshot_groups<'a>(prefix: &str, names: &'a [String]) -> Vec<(String, Vec<&'a String>)> {
    let mut groups: Vec<(String, Vec<&'a String>)> = Vec::new();
    for name in names {
        let Some(rest) = name.strip_prefix(prefix) else {
            continue;
        };
        let rest = rest.trim_start_matches('/');
        let Some((segment, _)) = rest.split_once('/') else {
            continue;
        };
        if !is_timestamp_segment(segment) {
            continue;
        }
        match groups.iter_mut().find(|(s, _)| s == segment) {
            Some((_, members)) => members.push(name),
            None => groups.push((segment.to_owned(), vec![name])),
        }
    }
    // Newest first; zero-padded stamps order lexicographically.
    groups.sort_by(|a, b| b.0.cmp(&a.0));
    groups
}

fn is_timestamp_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    match chars.next() {
        Some(c) if c.is_ascii_digit() => {}
        _ => return false,
    }
    segment
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, 'T' | '-' | ':'))
}

/// As-at selection: newest snapshot with a `.complete` marker and no
/// `.ignore` marker; disqualified snapshots fall through to the next
/// older; none qualifying yields an empty day.
fn select_snapshot(prefix: &str, groups: &[(String, Vec<&String>)]) -> Vec<String> {
    for (stamp, members) in groups {
        let complete = members.iter().any(|n| filename(n) == COMPLETE_MARKER);
        let ignored = members.iter().any(|n| filename(n) == IGNORE_MARKER);
        if !complete || ignored {
            granary_log!(
                log::Level::Debug,
                "snapshot_disqualified",
                "prefix={prefix} stamp={stamp} complete={complete} ignored={ignored}"
            );
            continue;
        }
        return members
            .iter()
            .filter(|n| is_data_blob(n))
            .map(|n| (*n).clone())
            .collect();
    }
    Vec::new()
}
