//! Reverse geocode cascade
//!
//! Strategies run strictly in order; the first non-empty name wins. A
//! strategy that errors, times out or returns nothing is a miss and the next
//! one runs. When every strategy misses, the coordinates themselves become
//! the place name, so `resolve` never yields an empty string.

use crate::domain::record::join_unique;
use crate::domain::types::Coordinates;
use crate::error::GeocodeError;
use crate::infra::config::Config;
use crate::infra::metrics::{GeocodeSource, Metrics};
use crate::io::geo::{GeoProvider, NativeAddress};
use crate::io::nominatim::NominatimClient;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[async_trait]
pub trait GeocodeStrategy: Send + Sync {
    fn source(&self) -> GeocodeSource;

    /// `Ok(None)` is a clean miss
    async fn lookup(&self, coords: Coordinates) -> Result<Option<String>, GeocodeError>;
}

/// HTTP reverse geocoding
pub struct NetworkStrategy {
    client: NominatimClient,
}

impl NetworkStrategy {
    pub fn new(client: NominatimClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GeocodeStrategy for NetworkStrategy {
    fn source(&self) -> GeocodeSource {
        GeocodeSource::Network
    }

    async fn lookup(&self, coords: Coordinates) -> Result<Option<String>, GeocodeError> {
        self.client.reverse(coords).await
    }
}

/// The location provider's own reverse geocoder
pub struct NativeStrategy {
    provider: Arc<dyn GeoProvider>,
}

impl NativeStrategy {
    pub fn new(provider: Arc<dyn GeoProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl GeocodeStrategy for NativeStrategy {
    fn source(&self) -> GeocodeSource {
        GeocodeSource::Native
    }

    async fn lookup(&self, coords: Coordinates) -> Result<Option<String>, GeocodeError> {
        let results = self.provider.reverse_geocode(coords).await?;
        Ok(results.first().and_then(format_native_address))
    }
}

/// Name from a native result: the place name (unless it merely repeats the
/// street), else the street, then the city or subregion
pub fn format_native_address(address: &NativeAddress) -> Option<String> {
    fn present(v: &Option<String>) -> Option<&str> {
        v.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    let street = present(&address.street);
    let name = present(&address.name).filter(|n| Some(*n) != street);
    let area = present(&address.city).or_else(|| present(&address.subregion));

    join_unique([name.or(street), area])
}

pub struct ReverseGeocoder {
    strategies: Vec<Box<dyn GeocodeStrategy>>,
    strategy_timeout: Option<Duration>,
    metrics: Arc<Metrics>,
}

impl ReverseGeocoder {
    pub fn new(
        strategies: Vec<Box<dyn GeocodeStrategy>>,
        strategy_timeout: Option<Duration>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self { strategies, strategy_timeout, metrics }
    }

    /// Network first, then the provider's native geocoder
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn GeoProvider>,
        metrics: Arc<Metrics>,
    ) -> Result<Self, GeocodeError> {
        let network = NetworkStrategy::new(NominatimClient::from_config(config)?);
        let native = NativeStrategy::new(provider);
        Ok(Self::new(
            vec![Box::new(network), Box::new(native)],
            config.geocode_strategy_timeout(),
            metrics,
        ))
    }

    /// Best available place name for `coords`. Never empty.
    pub async fn resolve(&self, coords: Coordinates) -> String {
        let started = Instant::now();

        for strategy in &self.strategies {
            let source = strategy.source();
            if let Some(name) = self.run(strategy.as_ref(), coords).await {
                let latency_ms = started.elapsed().as_millis() as u64;
                self.metrics.record_geocode(source, latency_ms);
                debug!(source = %source.as_str(), coords = %coords, latency_ms = %latency_ms, "geocode_resolved");
                return name;
            }
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        self.metrics.record_geocode(GeocodeSource::Coordinates, latency_ms);
        debug!(coords = %coords, latency_ms = %latency_ms, "geocode_fell_back_to_coordinates");
        coords.to_fixed5()
    }

    async fn run(&self, strategy: &dyn GeocodeStrategy, coords: Coordinates) -> Option<String> {
        let source = strategy.source();
        let outcome = match self.strategy_timeout {
            Some(limit) => tokio::time::timeout(limit, strategy.lookup(coords))
                .await
                .unwrap_or(Err(GeocodeError::Timeout(limit))),
            None => strategy.lookup(coords).await,
        };

        match outcome {
            Ok(Some(name)) => {
                let trimmed = name.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Ok(None) => {
                debug!(source = %source.as_str(), "geocode_strategy_miss");
                None
            }
            Err(GeocodeError::Timeout(limit)) => {
                self.metrics.record_strategy_timeout();
                warn!(source = %source.as_str(), timeout_ms = %limit.as_millis(), "geocode_strategy_timeout");
                None
            }
            Err(e) => {
                self.metrics.record_strategy_error();
                warn!(source = %source.as_str(), error = %e, "geocode_strategy_failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Reply {
        Hit(&'static str),
        Miss,
        Fail,
        Hang,
    }

    struct Scripted {
        source: GeocodeSource,
        reply: Reply,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn boxed(source: GeocodeSource, reply: Reply) -> (Box<dyn GeocodeStrategy>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (Box::new(Self { source, reply, calls: calls.clone() }), calls)
        }
    }

    #[async_trait]
    impl GeocodeStrategy for Scripted {
        fn source(&self) -> GeocodeSource {
            self.source
        }

        async fn lookup(&self, _coords: Coordinates) -> Result<Option<String>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Reply::Hit(name) => Ok(Some(name.to_string())),
                Reply::Miss => Ok(None),
                Reply::Fail => Err(GeocodeError::Platform("boom".into())),
                Reply::Hang => {
                    std::future::pending::<()>().await;
                    Ok(None)
                }
            }
        }
    }

    fn coords() -> Coordinates {
        Coordinates::new(10.9, 75.92)
    }

    #[tokio::test]
    async fn test_first_hit_wins_and_later_strategies_skipped() {
        let (network, _) = Scripted::boxed(GeocodeSource::Network, Reply::Hit("Tirur, Malappuram"));
        let (native, native_calls) = Scripted::boxed(GeocodeSource::Native, Reply::Hit("Elsewhere"));
        let metrics = Arc::new(Metrics::new());
        let geocoder = ReverseGeocoder::new(vec![network, native], None, metrics.clone());

        assert_eq!(geocoder.resolve(coords()).await, "Tirur, Malappuram");
        assert_eq!(native_calls.load(Ordering::SeqCst), 0);
        assert_eq!(metrics.geocode_count(GeocodeSource::Network), 1);
    }

    #[tokio::test]
    async fn test_network_miss_falls_through_to_native() {
        let (network, network_calls) = Scripted::boxed(GeocodeSource::Network, Reply::Miss);
        let (native, native_calls) = Scripted::boxed(GeocodeSource::Native, Reply::Hit("Bazaar Road, Tirur"));
        let geocoder = ReverseGeocoder::new(vec![network, native], None, Arc::new(Metrics::new()));

        assert_eq!(geocoder.resolve(coords()).await, "Bazaar Road, Tirur");
        assert_eq!(network_calls.load(Ordering::SeqCst), 1);
        assert_eq!(native_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_and_blank_names_are_misses() {
        let (network, _) = Scripted::boxed(GeocodeSource::Network, Reply::Fail);
        let (native, _) = Scripted::boxed(GeocodeSource::Native, Reply::Hit("   "));
        let metrics = Arc::new(Metrics::new());
        let geocoder = ReverseGeocoder::new(vec![network, native], None, metrics.clone());

        let name = geocoder.resolve(Coordinates::new(10.123456, 75.987654)).await;
        assert_eq!(name, "10.12346, 75.98765");
        assert_eq!(metrics.geocode_count(GeocodeSource::Coordinates), 1);
        assert_eq!(metrics.report().strategy_errors, 1);
    }

    #[tokio::test]
    async fn test_no_strategies_never_empty() {
        let geocoder = ReverseGeocoder::new(Vec::new(), None, Arc::new(Metrics::new()));
        let name = geocoder.resolve(Coordinates::new(0.0, 0.0)).await;
        assert_eq!(name, "0.00000, 0.00000");
        assert!(!name.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_strategy_times_out() {
        let (network, _) = Scripted::boxed(GeocodeSource::Network, Reply::Hang);
        let (native, _) = Scripted::boxed(GeocodeSource::Native, Reply::Hit("Tirur"));
        let metrics = Arc::new(Metrics::new());
        let geocoder = ReverseGeocoder::new(vec![network, native], Some(Duration::from_secs(10)), metrics.clone());

        assert_eq!(geocoder.resolve(coords()).await, "Tirur");
        assert_eq!(metrics.report().strategy_timeouts, 1);
        assert_eq!(metrics.report().strategy_errors, 0);
    }

    #[test]
    fn test_format_native_address() {
        let full = NativeAddress {
            name: Some("Tirur Bus Stand".into()),
            street: Some("Bazaar Road".into()),
            city: Some("Tirur".into()),
            subregion: Some("Malappuram".into()),
        };
        assert_eq!(format_native_address(&full).as_deref(), Some("Tirur Bus Stand, Tirur"));

        let name_is_street = NativeAddress {
            name: Some("Bazaar Road".into()),
            street: Some("Bazaar Road".into()),
            city: None,
            subregion: Some("Malappuram".into()),
        };
        assert_eq!(format_native_address(&name_is_street).as_deref(), Some("Bazaar Road, Malappuram"));

        assert_eq!(format_native_address(&NativeAddress::default()), None);
    }
}
