//! [`PlaceResolver`] implementations backed by the HTTP providers.
//!
//! [`build_resolver`] picks the provider from the service registry, applies
//! the timeout and retry policy, and optionally wraps it in a
//! [`CachedResolver`].

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::GeocodeCache;
use crate::retry::{self, RetryPolicy};
use crate::service_registry::{self, ProviderConfig};
use crate::{GeocodeError, GeocodedPlace, PlaceResolver, google, nominatim, normalize_place_name};

/// Default provider when `GEOCODER_PROVIDER` is not set.
pub const DEFAULT_PROVIDER: &str = "nominatim";

/// Default number of cached place names.
pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Default lifetime of a cached place name.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Connection details for a single provider.
#[derive(Debug, Clone)]
pub enum ProviderSettings {
    /// Nominatim search endpoint.
    Nominatim {
        /// Search endpoint URL.
        base_url: String,
        /// `User-Agent` header value.
        user_agent: String,
    },
    /// Google Geocoding endpoint.
    Google {
        /// Geocode endpoint URL.
        base_url: String,
        /// API key.
        api_key: String,
    },
}

/// Resolver that calls a geocoding provider over HTTP.
pub struct HttpPlaceResolver {
    client: reqwest::Client,
    provider: ProviderSettings,
    retry: RetryPolicy,
}

impl HttpPlaceResolver {
    /// Creates a resolver whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Http`] if the HTTP client cannot be built.
    pub fn new(
        provider: ProviderSettings,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, GeocodeError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            provider,
            retry,
        })
    }

    async fn lookup_once(&self, place: &str) -> Result<Option<GeocodedPlace>, GeocodeError> {
        match &self.provider {
            ProviderSettings::Nominatim {
                base_url,
                user_agent,
            } => nominatim::geocode_freeform(&self.client, base_url, user_agent, place).await,
            ProviderSettings::Google { base_url, api_key } => {
                google::geocode(&self.client, base_url, api_key, place).await
            }
        }
    }
}

#[async_trait]
impl PlaceResolver for HttpPlaceResolver {
    async fn resolve(&self, place: &str) -> Result<GeocodedPlace, GeocodeError> {
        let unresolvable = || GeocodeError::Unresolvable {
            place: place.to_string(),
        };

        let query = place.trim();
        if query.is_empty() {
            return Err(unresolvable());
        }

        match retry::with_retries(&self.retry, || self.lookup_once(query)).await {
            Ok(Some(found)) => {
                log::debug!(
                    "Resolved '{query}' to ({}, {})",
                    found.coordinate.latitude,
                    found.coordinate.longitude
                );
                Ok(found)
            }
            Ok(None) => {
                log::info!("No geocoding match for '{query}'");
                Err(unresolvable())
            }
            Err(e) => {
                log::warn!("Geocoding '{query}' failed: {e}");
                Err(unresolvable())
            }
        }
    }
}

/// Wraps a resolver with a [`GeocodeCache`].
pub struct CachedResolver<R> {
    inner: R,
    cache: GeocodeCache,
}

impl<R> CachedResolver<R> {
    /// Wraps `inner` with `cache`.
    #[must_use]
    pub const fn new(inner: R, cache: GeocodeCache) -> Self {
        Self { inner, cache }
    }

    /// The underlying cache.
    #[must_use]
    pub const fn cache(&self) -> &GeocodeCache {
        &self.cache
    }
}

#[async_trait]
impl<R: PlaceResolver> PlaceResolver for CachedResolver<R> {
    async fn resolve(&self, place: &str) -> Result<GeocodedPlace, GeocodeError> {
        let key = normalize_place_name(place);
        if let Some(hit) = self.cache.get(&key) {
            log::debug!("Geocode cache hit for '{key}'");
            return Ok(hit);
        }

        let resolved = self.inner.resolve(place).await?;
        self.cache.insert(key, resolved.clone());
        Ok(resolved)
    }
}

/// How to build the process-wide resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverSettings {
    /// Service registry id (`"nominatim"` or `"google"`).
    pub service_id: String,
    /// API key; when absent it is read from the variable named by the
    /// service configuration.
    pub api_key: Option<String>,
    /// Overrides the service's default `User-Agent` (Nominatim only).
    pub user_agent: Option<String>,
    /// Overrides the service's request timeout.
    pub timeout: Option<Duration>,
    /// Cache size; `0` disables caching.
    pub cache_capacity: usize,
    /// Cache entry lifetime.
    pub cache_ttl: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            service_id: DEFAULT_PROVIDER.to_string(),
            api_key: None,
            user_agent: None,
            timeout: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl: DEFAULT_CACHE_TTL,
        }
    }
}

impl ResolverSettings {
    /// Reads settings from environment variables:
    ///
    /// * `GEOCODER_PROVIDER` - `nominatim` (default) or `google`
    /// * `NOMINATIM_USER_AGENT` - overrides the default `User-Agent`
    /// * `GEOCODE_TIMEOUT_SECS` - request timeout
    /// * `GEOCODE_CACHE_CAPACITY` - cache size, `0` disables caching
    /// * `GEOCODE_CACHE_TTL_SECS` - cache entry lifetime
    ///
    /// # Errors
    ///
    /// Returns [`GeocodeError::Config`] if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, GeocodeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GeocodeError> {
        let defaults = Self::default();
        Ok(Self {
            service_id: lookup("GEOCODER_PROVIDER").unwrap_or(defaults.service_id),
            api_key: None,
            user_agent: lookup("NOMINATIM_USER_AGENT").filter(|s| !s.trim().is_empty()),
            timeout: parse_var::<u64>(&lookup, "GEOCODE_TIMEOUT_SECS")?.map(Duration::from_secs),
            cache_capacity: parse_var(&lookup, "GEOCODE_CACHE_CAPACITY")?
                .unwrap_or(defaults.cache_capacity),
            cache_ttl: parse_var::<u64>(&lookup, "GEOCODE_CACHE_TTL_SECS")?
                .map_or(defaults.cache_ttl, Duration::from_secs),
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, GeocodeError> {
    lookup(key)
        .map(|value| {
            value.trim().parse().map_err(|_| GeocodeError::Config {
                message: format!("{key} must be a non-negative integer, got '{value}'"),
            })
        })
        .transpose()
}

/// Builds the resolver described by `settings`.
///
/// # Errors
///
/// Returns [`GeocodeError::Config`] if the service id is unknown or the
/// provider's API key is missing, and [`GeocodeError::Http`] if the HTTP
/// client cannot be built.
pub fn build_resolver(settings: &ResolverSettings) -> Result<Arc<dyn PlaceResolver>, GeocodeError> {
    let service =
        service_registry::service(&settings.service_id).ok_or_else(|| GeocodeError::Config {
            message: format!(
                "unknown geocoding provider '{}' (expected one of: nominatim, google)",
                settings.service_id
            ),
        })?;

    let provider = match service.provider {
        ProviderConfig::Nominatim {
            base_url,
            user_agent,
        } => ProviderSettings::Nominatim {
            base_url,
            user_agent: settings.user_agent.clone().unwrap_or(user_agent),
        },
        ProviderConfig::Google {
            base_url,
            api_key_env,
        } => {
            let api_key = settings
                .api_key
                .clone()
                .or_else(|| std::env::var(&api_key_env).ok())
                .filter(|k| !k.trim().is_empty())
                .ok_or_else(|| GeocodeError::Config {
                    message: format!("{api_key_env} must be set to use the {} geocoder", service.name),
                })?;
            ProviderSettings::Google { base_url, api_key }
        }
    };

    let timeout = settings
        .timeout
        .unwrap_or_else(|| Duration::from_secs(service.timeout_secs));
    let http = HttpPlaceResolver::new(provider, timeout, service.retry)?;

    log::info!(
        "Geocoding with {} (timeout {timeout:?}, up to {} attempts)",
        service.name,
        service.retry.max_attempts.max(1)
    );

    if settings.cache_capacity == 0 {
        log::info!("Geocode cache disabled");
        return Ok(Arc::new(http));
    }

    log::info!(
        "Geocode cache: {} entries, ttl {:?}",
        settings.cache_capacity,
        settings.cache_ttl
    );
    Ok(Arc::new(CachedResolver::new(
        http,
        GeocodeCache::new(settings.cache_capacity, settings.cache_ttl),
    )))
}
