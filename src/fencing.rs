//! Request fencing for asynchronous loads.
//!
//! Every load is stamped with the value returned by [`RequestLedger::next`].
//! Completions are applied only while their stamp is still the category's
//! current value, so an older request finishing late becomes a no-op.

/// Kind of asynchronous load, each with its own counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadCategory {
    Aggregate,
    Messages,
    Detail,
    Search,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestLedger {
    aggregate: u64,
    messages: u64,
    detail: u64,
    search: u64,
}

impl RequestLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot_mut(&mut self, category: LoadCategory) -> &mut u64 {
        match category {
            LoadCategory::Aggregate => &mut self.aggregate,
            LoadCategory::Messages => &mut self.messages,
            LoadCategory::Detail => &mut self.detail,
            LoadCategory::Search => &mut self.search,
        }
    }

    /// Issues a new id for `category`, superseding any outstanding one
    pub fn next(&mut self, category: LoadCategory) -> u64 {
        let slot = self.slot_mut(category);
        *slot += 1;
        *slot
    }

    pub fn current(&self, category: LoadCategory) -> u64 {
        match category {
            LoadCategory::Aggregate => self.aggregate,
            LoadCategory::Messages => self.messages,
            LoadCategory::Detail => self.detail,
            LoadCategory::Search => self.search,
        }
    }

    pub fn is_current(&self, category: LoadCategory, id: u64) -> bool {
        self.current(category) == id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_latest_id_is_current() {
        let mut ledger = RequestLedger::new();
        for _ in 0..5 {
            ledger.next(LoadCategory::Search);
        }
        assert!(!ledger.is_current(LoadCategory::Search, 3));
        assert!(ledger.is_current(LoadCategory::Search, 5));
    }

    #[test]
    fn test_categories_are_independent() {
        let mut ledger = RequestLedger::new();
        let agg = ledger.next(LoadCategory::Aggregate);
        let msgs = ledger.next(LoadCategory::Messages);
        ledger.next(LoadCategory::Messages);

        assert_eq!(agg, 1);
        assert!(ledger.is_current(LoadCategory::Aggregate, agg));
        assert!(!ledger.is_current(LoadCategory::Messages, msgs));
        assert_eq!(ledger.current(LoadCategory::Detail), 0);
    }
}
