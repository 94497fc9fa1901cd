use crate::domain::request::RequestId;

/// Hands out request ids 1, 2, 3, ... for the lifetime of one manager.
///
/// Every call to [`IdentityAllocator::allocate`] consumes an id, so the lifecycle manager only
/// allocates after a draft has validated and its fulfillment timers are known to fit.
#[derive(Clone, Debug)]
pub struct IdentityAllocator {
    next: u64,
}

impl IdentityAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn allocate(&mut self) -> RequestId {
        let id = RequestId(self.next);
        self.next += 1;
        id
    }
}

impl Default for IdentityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::request::RequestId;

    use super::IdentityAllocator;

    #[test]
    fn starts_at_one_and_increments_by_one() {
        let mut allocator = IdentityAllocator::new();
        assert_eq!(allocator.allocate(), RequestId(1));
        assert_eq!(allocator.allocate(), RequestId(2));
        assert_eq!(allocator.allocate(), RequestId(3));
    }

    #[test]
    fn separate_allocators_count_independently() {
        let mut first = IdentityAllocator::default();
        let mut second = IdentityAllocator::new();
        first.allocate();
        first.allocate();
        assert_eq!(second.allocate(), RequestId(1));
        assert_eq!(first.allocate(), RequestId(3));
    }
}
