//! Label, timestamp, and pod-name helpers.
//!
//! Kubernetes label values are limited to 63 characters of
//! `[A-Za-z0-9_.-]`, beginning and ending with an alphanumeric. Pod names must
//! be DNS-1123 subdomains. Everything produced here is a pure function of its
//! inputs so rendered manifests stay reproducible.

use chrono::{DateTime, FixedOffset, Timelike};

use crate::ids::{DagId, TaskId};

/// Maximum length of a Kubernetes label value.
pub const MAX_LABEL_LENGTH: usize = 63;

/// Maximum length of a generated worker pod name.
pub const MAX_POD_NAME_LENGTH: usize = 63;

/// Number of hex characters of digest appended to truncated values.
const DIGEST_SUFFIX_LEN: usize = 9;

/// Number of hex characters of digest used as the pod name suffix.
const POD_SUFFIX_LEN: usize = 8;

/// Format a timestamp as ISO-8601 with an explicit offset.
///
/// Sub-second precision is emitted as microseconds only when non-zero, e.g.
/// `2024-03-01T12:30:00+00:00` or `2024-03-01T12:30:00.250000+02:00`.
#[must_use]
pub fn iso_format(dt: &DateTime<FixedOffset>) -> String {
    if dt.nanosecond() / 1_000 == 0 {
        dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string()
    } else {
        dt.format("%Y-%m-%dT%H:%M:%S%.6f%:z").to_string()
    }
}

/// Render a timestamp into a string safe for labels and file names.
///
/// Colons become `_` and `+` becomes `_plus_`.
#[must_use]
pub fn label_safe_datestring(dt: &DateTime<FixedOffset>) -> String {
    iso_format(dt).replace(':', "_").replace('+', "_plus_")
}

/// Sanitize an arbitrary string into a valid label value.
///
/// Illegal characters are removed and non-alphanumeric edges trimmed. If that
/// changed the value, or it is longer than 63 characters, the result is cut
/// short and suffixed with a digest of the original so distinct inputs stay
/// distinct.
#[must_use]
pub fn make_safe_label_value(value: &str) -> String {
    let filtered: String = value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .collect();
    let safe = filtered.trim_matches(|c: char| !c.is_ascii_alphanumeric());

    if safe.len() <= MAX_LABEL_LENGTH && safe == value {
        return safe.to_string();
    }

    let digest = short_digest(&[value.as_bytes()], DIGEST_SUFFIX_LEN);
    let keep = MAX_LABEL_LENGTH - DIGEST_SUFFIX_LEN - 1;
    let prefix = &safe[..safe.len().min(keep)];
    if prefix.is_empty() {
        digest
    } else {
        format!("{prefix}-{digest}")
    }
}

/// Generate the worker pod name for a task try.
///
/// The name is `<dag>-<task>-<digest>` lowercased and made DNS-safe, where the
/// digest covers dag id, task id and try number. The same task try always
/// yields the same name; a new try yields a new one.
#[must_use]
pub fn worker_pod_name(dag_id: &DagId, task_id: &TaskId, try_number: u32) -> String {
    let digest = short_digest(
        &[
            dag_id.as_str().as_bytes(),
            task_id.as_str().as_bytes(),
            &try_number.to_le_bytes(),
        ],
        POD_SUFFIX_LEN,
    );

    let base: String = format!("{dag_id}-{task_id}")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();

    let keep = MAX_POD_NAME_LENGTH - POD_SUFFIX_LEN - 1;
    let base = base[..base.len().min(keep)].trim_matches(|c: char| !c.is_ascii_alphanumeric());

    if base.is_empty() {
        format!("pod-{digest}")
    } else {
        format!("{base}-{digest}")
    }
}

fn short_digest(parts: &[&[u8]], len: usize) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(&(part.len() as u64).to_le_bytes());
        hasher.update(part);
    }
    let mut encoded = hex::encode(hasher.finalize().as_bytes());
    encoded.truncate(len);
    encoded
}
