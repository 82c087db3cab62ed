/// Scheduling hint attached to the workers of a pool.
///
/// Values range from [`Priority::MIN`] (1) to [`Priority::MAX`] (10); anything
/// outside that range is clamped. The operating system is not asked to honor it.
/// Work running on a pool can read the value of its worker through
/// [`thread_util::current_priority`](crate::thread_util::current_priority).
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
#[must_use]
pub struct Priority(u8);

impl Priority {
    /// Lowest priority (1)
    pub const MIN: Self = Self(1);

    /// Default priority of new workers (5)
    pub const NORMAL: Self = Self(5);

    /// Highest priority (10)
    pub const MAX: Self = Self(10);

    /// Create a priority, clamping `value` into `1..=10`.
    pub const fn new(value: u8) -> Self {
        if value < Self::MIN.0 {
            Self::MIN
        } else if value > Self::MAX.0 {
            Self::MAX
        } else {
            Self(value)
        }
    }

    /// Get the raw priority value
    #[must_use]
    pub const fn value(&self) -> u8 {
        self.0
    }

    /// One step higher, capped at [`Priority::MAX`]
    pub const fn higher(&self) -> Self {
        Self::new(self.0.saturating_add(1))
    }

    /// One step lower, floored at [`Priority::MIN`]
    pub const fn lower(&self) -> Self {
        Self::new(self.0.saturating_sub(1))
    }
}

impl Default for Priority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> Self {
        priority.0
    }
}
