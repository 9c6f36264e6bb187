/// Host alias resolution.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::TtlCache;
use crate::config::{Config, ServerConfig};

/// How long a resolved host stays cached.
pub const RESOLVE_TTL: Duration = Duration::from_secs(60);

/// Maps a host alias to its connection parameters.
pub trait HostResolver: Send + Sync {
    fn resolve(&self, host: &str) -> Option<ServerConfig>;
}

impl HostResolver for Config {
    fn resolve(&self, host: &str) -> Option<ServerConfig> {
        let name = self.resolve_server(Some(host))?;
        self.server.get(&name).cloned()
    }
}

impl HostResolver for HashMap<String, ServerConfig> {
    fn resolve(&self, host: &str) -> Option<ServerConfig> {
        self.get(host).cloned()
    }
}

/// Resolver wrapped in a [`TtlCache`]. Misses are not cached, so a host
/// added to the config is picked up on the next lookup.
pub struct CachedResolver {
    inner: Arc<dyn HostResolver>,
    cache: TtlCache<String, ServerConfig>,
}

impl CachedResolver {
    pub fn new(inner: Arc<dyn HostResolver>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: TtlCache::new(ttl),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }
}

impl HostResolver for CachedResolver {
    fn resolve(&self, host: &str) -> Option<ServerConfig> {
        self.cache
            .get_or_insert_with(&host.to_string(), || self.inner.resolve(host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingResolver {
        calls: AtomicUsize,
    }

    impl HostResolver for CountingResolver {
        fn resolve(&self, host: &str) -> Option<ServerConfig> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (host != "ghost").then(|| ServerConfig {
                host: format!("{}.internal", host),
                port: None,
                username: "root".to_string(),
                keypath: None,
                password: None,
                use_password: None,
            })
        }
    }

    #[test]
    fn test_config_resolves_through_aliases() {
        let mut config = Config::default();
        config.server.insert(
            "web01".to_string(),
            ServerConfig {
                host: "10.0.0.1".to_string(),
                port: Some(2222),
                username: "deploy".to_string(),
                keypath: None,
                password: None,
                use_password: None,
            },
        );
        config.aliases.insert("w".to_string(), "web01".to_string());

        assert_eq!(config.resolve("w").unwrap().host, "10.0.0.1");
        assert_eq!(config.resolve("web01").unwrap().port(), 2222);
        assert!(config.resolve("db01").is_none());
    }

    #[test]
    fn test_cached_resolver_hits_inner_once() {
        let inner = Arc::new(CountingResolver {
            calls: AtomicUsize::new(0),
        });
        let resolver = CachedResolver::new(inner.clone(), RESOLVE_TTL);

        for _ in 0..5 {
            assert_eq!(resolver.resolve("web01").unwrap().host, "web01.internal");
        }
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.cached_len(), 1);
    }

    #[test]
    fn test_cached_resolver_does_not_cache_misses() {
        let inner = Arc::new(CountingResolver {
            calls: AtomicUsize::new(0),
        });
        let resolver = CachedResolver::new(inner.clone(), RESOLVE_TTL);

        assert!(resolver.resolve("ghost").is_none());
        assert!(resolver.resolve("ghost").is_none());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
