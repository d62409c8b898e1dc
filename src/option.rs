//! Scan configuration.

/// Options shared by every scan discipline.
///
/// Builder-style: `ScanOption::default().batch_size(64).projection(...)`.
#[derive(Debug, Clone)]
pub struct ScanOption {
    pub(crate) batch_size: usize,
    pub(crate) projection: Option<Vec<String>>,
    pub(crate) like_cache_capacity: usize,
}

impl Default for ScanOption {
    fn default() -> Self {
        Self {
            batch_size: 256,
            projection: None,
            like_cache_capacity: 64,
        }
    }
}

impl ScanOption {
    /// Maximum records per batch pushed onto the result queue. Bounded
    /// queues cap memory at roughly `pool × batch_size × record size`.
    #[must_use]
    pub fn batch_size(self, batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            ..self
        }
    }

    /// Column subset applied to surviving records; missing fields project
    /// to the null marker. `None` keeps whole records.
    #[must_use]
    pub fn projection(self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            projection: Some(columns.into_iter().map(Into::into).collect()),
            ..self
        }
    }

    /// Capacity of each evaluator's memoized `LIKE` pattern cache.
    #[must_use]
    pub fn like_cache_capacity(self, capacity: usize) -> Self {
        Self {
            like_cache_capacity: capacity.max(1),
            ..self
        }
    }
}
