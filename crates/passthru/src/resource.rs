use std::fmt;

/// Error returned when a resource limit is exceeded while marshaling.
///
/// Managed allocations and native claim bookkeeping both go through the
/// tracker, so either can refuse to proceed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// Maximum number of managed heap allocations exceeded.
    Allocation { limit: usize, count: usize },
    /// Maximum number of live native claims exceeded.
    Claims { limit: usize, count: usize },
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation { limit, count } => {
                write!(f, "allocation limit exceeded: {count} > {limit}")
            }
            Self::Claims { limit, count } => {
                write!(f, "claim limit exceeded: {count} > {limit}")
            }
        }
    }
}

impl std::error::Error for ResourceError {}

/// Trait for tracking resource usage of the managed heap and the native runtime.
///
/// When `T = NoLimitTracker` every check compiles away to nothing.
pub trait ResourceTracker: fmt::Debug {
    /// Called before each managed heap allocation.
    ///
    /// Returns `Ok(())` if the allocation should proceed, or `Err(ResourceError)`
    /// if a limit would be exceeded.
    fn on_allocate(&mut self) -> Result<(), ResourceError>;

    /// Called when a managed heap value is freed.
    fn on_free(&mut self) {}

    /// Called before claim bookkeeping for a new opaque reference is allocated.
    ///
    /// # Arguments
    /// * `live_claims` - Number of claims currently outstanding (before this one)
    fn on_claim(&mut self, _live_claims: usize) -> Result<(), ResourceError> {
        Ok(())
    }

    /// Returns the total number of allocations tracked, if this tracker records them.
    fn allocation_count(&self) -> Option<usize> {
        None
    }
}

/// Configuration for resource limits.
///
/// All limits are optional - set to `None` to disable a specific limit.
/// Use `ResourceLimits::default()` for no limits, or build custom limits
/// with the builder pattern.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ResourceLimits {
    /// Maximum number of managed heap allocations allowed.
    pub max_allocations: Option<usize>,
    /// Maximum number of simultaneously live native claims.
    pub max_claims: Option<usize>,
}

impl ResourceLimits {
    /// Creates a new ResourceLimits with all limits disabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum number of allocations.
    #[must_use]
    pub fn max_allocations(mut self, limit: usize) -> Self {
        self.max_allocations = Some(limit);
        self
    }

    /// Sets the maximum number of simultaneously live claims.
    #[must_use]
    pub fn max_claims(mut self, limit: usize) -> Self {
        self.max_claims = Some(limit);
        self
    }
}

/// A resource tracker that never refuses anything.
///
/// Being a unit struct it doubles as a value expression: `Heap::new(16, NoLimitTracker)`.
#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct NoLimitTracker;

impl ResourceTracker for NoLimitTracker {
    #[inline]
    fn on_allocate(&mut self) -> Result<(), ResourceError> {
        Ok(())
    }
}

/// A resource tracker that enforces configurable limits.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LimitedTracker {
    limits: ResourceLimits,
    /// Total number of allocations made.
    allocation_count: usize,
}

impl LimitedTracker {
    /// Creates a new LimitedTracker with the given limits.
    #[must_use]
    pub fn new(limits: ResourceLimits) -> Self {
        Self {
            limits,
            allocation_count: 0,
        }
    }

    /// Returns the configured limits.
    #[must_use]
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

impl ResourceTracker for LimitedTracker {
    fn on_allocate(&mut self) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_allocations
            && self.allocation_count >= max
        {
            return Err(ResourceError::Allocation {
                limit: max,
                count: self.allocation_count + 1,
            });
        }
        self.allocation_count += 1;
        Ok(())
    }

    fn on_claim(&mut self, live_claims: usize) -> Result<(), ResourceError> {
        if let Some(max) = self.limits.max_claims
            && live_claims >= max
        {
            return Err(ResourceError::Claims {
                limit: max,
                count: live_claims + 1,
            });
        }
        Ok(())
    }

    fn allocation_count(&self) -> Option<usize> {
        Some(self.allocation_count)
    }
}
