//! Algorithm-selection tuning carried by every sequence handle.

/// Size thresholds for the dedup and membership algorithms.
///
/// The values are performance tuning only: every tier yields the same
/// elements in the same order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    /// Known input length up to which `uniq` scans its accepted output inline.
    pub uniq_linear_max: usize,
    /// Known input length up to which `uniq` keeps a heap seen-list; above it a `ValueSet`.
    pub uniq_list_max: usize,
    /// Known length of a comparison collection up to which membership is a linear scan.
    pub membership_linear_max: usize,
}

pub const DEFAULT_UNIQ_LINEAR_MAX: usize = 40;
pub const DEFAULT_UNIQ_LIST_MAX: usize = 200;
pub const DEFAULT_MEMBERSHIP_LINEAR_MAX: usize = 40;

impl Default for Tuning {
    fn default() -> Self {
        Self {
            uniq_linear_max: DEFAULT_UNIQ_LINEAR_MAX,
            uniq_list_max: DEFAULT_UNIQ_LIST_MAX,
            membership_linear_max: DEFAULT_MEMBERSHIP_LINEAR_MAX,
        }
    }
}

impl Tuning {
    pub fn builder() -> TuningBuilder {
        TuningBuilder::new()
    }
}

pub struct TuningBuilder {
    tuning: Tuning,
}

impl Default for TuningBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TuningBuilder {
    pub fn new() -> Self {
        Self { tuning: Tuning::default() }
    }

    pub fn with_uniq_linear_max(mut self, n: usize) -> Self {
        self.tuning.uniq_linear_max = n;
        self
    }

    pub fn with_uniq_list_max(mut self, n: usize) -> Self {
        self.tuning.uniq_list_max = n;
        self
    }

    pub fn with_membership_linear_max(mut self, n: usize) -> Self {
        self.tuning.membership_linear_max = n;
        self
    }

    /// Forces every dedup and membership test onto the hash table.
    pub fn always_hash(mut self) -> Self {
        self.tuning.uniq_linear_max = 0;
        self.tuning.uniq_list_max = 0;
        self.tuning.membership_linear_max = 0;
        self
    }

    /// The list tier never ends below the linear tier.
    pub fn build(self) -> Tuning {
        let mut t = self.tuning;
        t.uniq_list_max = t.uniq_list_max.max(t.uniq_linear_max);
        t
    }
}
