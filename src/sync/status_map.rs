use std::collections::BTreeMap;

/// Translation between List bucket names and issue workflow statuses.
///
/// Lookups fall back to the input unchanged, so buckets and statuses without
/// an entry still round-trip.
#[derive(Debug, Clone, Default)]
pub struct StatusMap {
    bucket_to_status: BTreeMap<String, String>,
    equivalent: Vec<Vec<String>>,
}

impl StatusMap {
    pub fn new(bucket_to_status: BTreeMap<String, String>, equivalent: Vec<Vec<String>>) -> Self {
        Self {
            bucket_to_status,
            equivalent,
        }
    }

    pub fn status_for_bucket<'a>(&'a self, bucket: &'a str) -> &'a str {
        self.bucket_to_status
            .get(bucket)
            .map(String::as_str)
            .unwrap_or(bucket)
    }

    /// First bucket (in name order) mapped to `status`.
    pub fn bucket_for_status<'a>(&'a self, status: &'a str) -> &'a str {
        self.bucket_to_status
            .iter()
            .find(|(_, s)| s.as_str() == status)
            .map(|(b, _)| b.as_str())
            .unwrap_or(status)
    }

    /// Case-insensitive equality, or membership in the same equivalence group.
    pub fn statuses_equivalent(&self, a: &str, b: &str) -> bool {
        if a.eq_ignore_ascii_case(b) {
            return true;
        }
        self.equivalent.iter().any(|group| {
            group.iter().any(|s| s.eq_ignore_ascii_case(a))
                && group.iter().any(|s| s.eq_ignore_ascii_case(b))
        })
    }
}
