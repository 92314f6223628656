use super::node::Lookup;
use super::route::Route;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// A cached lookup outcome - `None` is a cached negative (no route
/// matched), distinct from "not yet looked up".
#[derive(Clone)]
pub(crate) enum CachedLookup {
    Matched {
        route: Arc<Route>,
        params: HashMap<Arc<str>, String>,
    },
    MethodNotAllowed(Vec<http::Method>),
    NotFound,
}

impl From<&Lookup> for CachedLookup {
    fn from(lookup: &Lookup) -> Self {
        match lookup {
            Lookup::Matched { route, params } => CachedLookup::Matched {
                route: route.clone(),
                params: params.clone(),
            },
            Lookup::MethodNotAllowed(methods) => CachedLookup::MethodNotAllowed(methods.clone()),
            Lookup::NotFound => CachedLookup::NotFound,
        }
    }
}

/// A bounded `method:path → lookup result` cache sitting in front of the
/// radix tree traversal. On overflow, evicts the oldest half of entries in
/// one pass rather than maintaining strict LRU order - simpler than strict
/// LRU, and accurate enough for a cache whose purpose is avoiding repeat
/// tree walks for hot paths.
pub(crate) struct RouteCache {
    capacity: usize,
    entries: HashMap<(http::Method, Box<str>), CachedLookup>,
    order: VecDeque<(http::Method, Box<str>)>,
}

impl RouteCache {
    pub(crate) const DEFAULT_CAPACITY: usize = 1000;

    pub(crate) fn new(capacity: usize) -> Self {
        RouteCache {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub(crate) fn get(&self, method: &http::Method, path: &str) -> Option<&CachedLookup> {
        self.entries.get(&(method.clone(), Box::from(path)))
    }

    pub(crate) fn insert(&mut self, method: http::Method, path: Box<str>, lookup: CachedLookup) {
        let key = (method, path);
        if !self.entries.contains_key(&key) {
            if self.order.len() >= self.capacity {
                self.evict_oldest_half();
            }
            self.order.push_back(key.clone());
        }
        self.entries.insert(key, lookup);
    }

    fn evict_oldest_half(&mut self) {
        let drop_count = self.order.len() / 2;
        for _ in 0..drop_count.max(1) {
            if let Some(key) = self.order.pop_front() {
                self.entries.remove(&key);
            }
        }
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_oldest_half_on_overflow() {
        let mut cache = RouteCache::new(4);
        for i in 0..4 {
            cache.insert(http::Method::GET, format!("/{i}").into(), CachedLookup::NotFound);
        }
        assert_eq!(cache.len(), 4);
        cache.insert(http::Method::GET, "/4".into(), CachedLookup::NotFound);
        assert_eq!(cache.len(), 3);
        assert!(cache.get(&http::Method::GET, "/0").is_none());
        assert!(cache.get(&http::Method::GET, "/4").is_some());
    }

    #[test]
    fn clear_empties_everything() {
        let mut cache = RouteCache::new(10);
        cache.insert(http::Method::GET, "/a".into(), CachedLookup::NotFound);
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
