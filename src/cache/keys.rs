//! Request fingerprints used as response cache keys.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use axum::http::{Method, Uri};

/// Identity of a cacheable request: method, path and normalized query.
///
/// Query pairs are ordered by name so `?a=1&b=2` and `?b=2&a=1` share an entry,
/// while any difference in method, path, parameter values or the order of a
/// repeated parameter's values yields a distinct key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    method: Method,
    path: String,
    query: String,
}

impl CacheKey {
    pub fn new(method: Method, path: impl Into<String>, query: &str) -> Self {
        Self {
            method,
            path: path.into(),
            query: normalize_query(query),
        }
    }

    /// Build the key for an incoming request.
    pub fn from_request(method: &Method, uri: &Uri) -> Self {
        Self::new(method.clone(), uri.path(), uri.query().unwrap_or(""))
    }

    /// Normalized query string (pairs ordered by name, empty segments dropped).
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Stable 64-bit digest, handy for log correlation.
    pub fn fingerprint(&self) -> u64 {
        hash_value(self)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.query.is_empty() {
            write!(f, "{} {}", self.method, self.path)
        } else {
            write!(f, "{} {}?{}", self.method, self.path, self.query)
        }
    }
}

fn hash_value<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Order pairs by parameter name. The sort is stable, so repeated names keep
/// their values in request order.
fn normalize_query(query: &str) -> String {
    let mut pairs: Vec<&str> = query.split('&').filter(|pair| !pair.is_empty()).collect();
    pairs.sort_by_key(|&pair| pair.split_once('=').map_or(pair, |(name, _)| name));
    pairs.join("&")
}
