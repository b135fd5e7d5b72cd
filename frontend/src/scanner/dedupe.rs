use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

/// Payloads submitted since the last periodic clear.
///
/// Clones share the same set. Entries do not expire individually: the
/// runtime calls [`DuplicateCache::clear`] on a fixed interval, so a payload
/// stays suppressed for anywhere up to one full interval.
#[derive(Clone, Default)]
pub struct DuplicateCache {
    seen: Rc<RefCell<HashSet<String>>>,
}

impl DuplicateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, payload: &str) -> bool {
        self.seen.borrow().contains(payload)
    }

    /// Returns false when the payload was already present.
    pub fn add(&self, payload: &str) -> bool {
        self.seen.borrow_mut().insert(payload.to_string())
    }

    pub fn remove(&self, payload: &str) -> bool {
        self.seen.borrow_mut().remove(payload)
    }

    pub fn clear(&self) {
        let mut seen = self.seen.borrow_mut();
        if !seen.is_empty() {
            log::debug!("clearing {} suppressed scan payload(s)", seen.len());
        }
        seen.clear();
    }

    pub fn len(&self) -> usize {
        self.seen.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_has_uses_exact_equality() {
        let cache = DuplicateCache::new();
        assert!(cache.add("abc"));
        assert!(cache.has("abc"));
        assert!(!cache.has("abc "));
        assert!(!cache.has("ABC"));
    }

    #[test]
    fn second_add_reports_existing_entry() {
        let cache = DuplicateCache::new();
        assert!(cache.add("abc"));
        assert!(!cache.add("abc"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn remove_reopens_payload() {
        let cache = DuplicateCache::new();
        cache.add("abc");
        assert!(cache.remove("abc"));
        assert!(!cache.has("abc"));
        assert!(!cache.remove("abc"));
    }

    #[test]
    fn clear_discards_everything_and_is_shared_by_clones() {
        let cache = DuplicateCache::new();
        let handle = cache.clone();
        cache.add("a");
        cache.add("b");
        handle.clear();
        assert!(cache.is_empty());
    }
}
