use std::time::Duration;

use anyhow::Error;
use async_trait::async_trait;
use fred::prelude::*;
use tracing::error;
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{Observation, Price, SymbolId};

/// Durable symbol -> observations mapping.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Return the id for `name`, creating the record on first sight.
    /// Concurrent callers for the same name always agree on one id.
    async fn resolve_symbol(&self, name: &str) -> Result<SymbolId, StoreError>;

    /// Read-only lookup, never creates a record.
    async fn lookup_symbol(&self, name: &str) -> Result<Option<SymbolId>, StoreError>;

    /// Append one observation. Identical calls append identical rows.
    async fn record_price(
        &self,
        id: SymbolId,
        price: Price,
        observed_at: i64,
    ) -> Result<(), StoreError>;

    /// Observation with the smallest distance to `target`.
    async fn nearest_price(&self, id: SymbolId, target: i64) -> Result<Observation, StoreError>;
}

#[derive(Clone)]
pub struct RedisPriceStore {
    client: Client,
    key_prefix: String,
}

impl RedisPriceStore {
    pub async fn new(redis_url: &str, key: impl Into<String>) -> Result<Self, Error> {
        let config = Config::from_url(redis_url)?;

        let client = Builder::from_config(config)
            .with_connection_config(|config| {
                config.connection_timeout = Duration::from_secs(5);
                config.tcp = TcpConfig {
                    nodelay: Some(true),
                    ..Default::default()
                };
            })
            .build()?;

        client.on_error(|(error, server)| async move {
            error!(?server, %error, "redis connection error");
            Ok(())
        });

        client.connect();
        client.wait_for_connect().await?;

        Ok(Self {
            client,
            key_prefix: key.into(),
        })
    }

    /// Create a new RedisPriceStore from environment variables.
    /// Expects REDIS_URL and REDIS_KEY_PREFIX to be set.
    pub async fn from_env() -> Result<Self, Error> {
        use std::env;

        let redis_url = env::var("REDIS_URL")
            .map_err(|_| Error::msg("REDIS_URL environment variable not set"))?;
        let key_prefix = env::var("REDIS_KEY_PREFIX")
            .map_err(|_| Error::msg("REDIS_KEY_PREFIX environment variable not set"))?;

        Self::new(&redis_url, key_prefix).await
    }

    pub async fn quit(&self) -> Result<(), Error> {
        self.client.quit().await.map_err(Error::from)
    }

    fn symbols_key(&self) -> String {
        format!("{}:symbols", self.key_prefix)
    }

    fn prices_key(&self, id: SymbolId) -> String {
        format!("{}:prices:{}", self.key_prefix, id)
    }

    fn parse_id(raw: &str) -> Result<SymbolId, StoreError> {
        SymbolId::parse(raw).ok_or_else(|| StoreError::Corrupt(format!("symbol id {raw:?}")))
    }

    /// Members are `{ts}:{cents}:{nonce}` so equal observations stay distinct rows.
    fn encode_member(price: Price, observed_at: i64) -> String {
        format!(
            "{}:{}:{}",
            observed_at,
            price.cents(),
            Uuid::new_v4().simple()
        )
    }

    fn decode_member(member: &str) -> Result<Observation, StoreError> {
        let mut parts = member.splitn(3, ':');
        let observed_at = parts.next().and_then(|s| s.parse().ok());
        let cents = parts.next().and_then(|s| s.parse().ok());

        match (observed_at, cents) {
            (Some(observed_at), Some(cents)) => Ok(Observation {
                price: Price::from_cents(cents),
                observed_at,
            }),
            _ => Err(StoreError::Corrupt(format!("price member {member:?}"))),
        }
    }
}

#[async_trait]
impl PriceStore for RedisPriceStore {
    async fn resolve_symbol(&self, name: &str) -> Result<SymbolId, StoreError> {
        if let Some(id) = self.lookup_symbol(name).await? {
            return Ok(id);
        }

        // HSETNX keeps whichever writer got there first; read back the winner.
        let candidate = SymbolId::generate();
        let created: bool = self
            .client
            .hsetnx(self.symbols_key(), name, candidate.to_string())
            .await?;
        if created {
            return Ok(candidate);
        }

        self.lookup_symbol(name)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("symbol {name:?} vanished after insert")))
    }

    async fn lookup_symbol(&self, name: &str) -> Result<Option<SymbolId>, StoreError> {
        let raw: Option<String> = self.client.hget(self.symbols_key(), name).await?;
        raw.as_deref().map(Self::parse_id).transpose()
    }

    async fn record_price(
        &self,
        id: SymbolId,
        price: Price,
        observed_at: i64,
    ) -> Result<(), StoreError> {
        let member = Self::encode_member(price, observed_at);
        let _: i64 = self
            .client
            .zadd(
                self.prices_key(id),
                None,
                None,
                false,
                false,
                (observed_at as f64, member),
            )
            .await?;

        Ok(())
    }

    async fn nearest_price(&self, id: SymbolId, target: i64) -> Result<Observation, StoreError> {
        let key = self.prices_key(id);

        let below: Vec<String> = self
            .client
            .zrevrangebyscore(key.as_str(), target as f64, "-inf", false, Some((0, 1)))
            .await?;
        let above: Vec<String> = self
            .client
            .zrangebyscore(key.as_str(), target as f64, "+inf", false, Some((0, 1)))
            .await?;

        let below = below.first().map(|m| Self::decode_member(m)).transpose()?;
        let above = above.first().map(|m| Self::decode_member(m)).transpose()?;

        closer(below, above, target).ok_or(StoreError::NotFound)
    }
}

/// Pick whichever neighbour of `target` is nearer. `below` is the latest row
/// at or before the target, `above` the earliest at or after it. Ties go to
/// the earlier row.
fn closer(
    below: Option<Observation>,
    above: Option<Observation>,
    target: i64,
) -> Option<Observation> {
    match (below, above) {
        (Some(b), Some(a)) => {
            if target.abs_diff(b.observed_at) <= a.observed_at.abs_diff(target) {
                Some(b)
            } else {
                Some(a)
            }
        }
        (Some(only), None) | (None, Some(only)) => Some(only),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(cents: i64, observed_at: i64) -> Observation {
        Observation {
            price: Price::from_cents(cents),
            observed_at,
        }
    }

    #[test]
    fn closer_picks_nearest_neighbour() {
        // rows at 100, 200 and 500
        let mid = closer(Some(obs(2000, 200)), Some(obs(5000, 500)), 260);
        assert_eq!(mid, Some(obs(2000, 200)));

        let before_all = closer(None, Some(obs(1000, 100)), 10);
        assert_eq!(before_all, Some(obs(1000, 100)));

        let after_all = closer(Some(obs(5000, 500)), None, 1000);
        assert_eq!(after_all, Some(obs(5000, 500)));

        let nearer_above = closer(Some(obs(2000, 200)), Some(obs(5000, 500)), 400);
        assert_eq!(nearer_above, Some(obs(5000, 500)));
    }

    #[test]
    fn closer_tie_prefers_earlier_row() {
        let tie = closer(Some(obs(1000, 100)), Some(obs(2000, 200)), 150);
        assert_eq!(tie, Some(obs(1000, 100)));
    }

    #[test]
    fn closer_exact_match_is_returned() {
        let exact = obs(2000, 200);
        assert_eq!(closer(Some(exact), Some(exact), 200), Some(exact));
    }

    #[test]
    fn closer_without_rows_is_none() {
        assert_eq!(closer(None, None, 42), None);
    }

    #[test]
    fn member_encoding_keeps_timestamp_and_cents() {
        let member = RedisPriceStore::encode_member(Price::from_cents(4237), 1_700_000_000);
        assert!(member.starts_with("1700000000:4237:"));

        let obs = RedisPriceStore::decode_member(&member).unwrap();
        assert_eq!(obs.price.cents(), 4237);
        assert_eq!(obs.observed_at, 1_700_000_000);
    }

    #[test]
    fn equal_observations_encode_to_distinct_members() {
        let a = RedisPriceStore::encode_member(Price::from_cents(1), 100);
        let b = RedisPriceStore::encode_member(Price::from_cents(1), 100);
        assert_ne!(a, b);
    }

    #[test]
    fn negative_values_decode() {
        let obs = RedisPriceStore::decode_member("-5:-12:abc").unwrap();
        assert_eq!(obs.observed_at, -5);
        assert_eq!(obs.price.cents(), -12);
    }

    #[test]
    fn rejects_garbage_member() {
        let err = RedisPriceStore::decode_member("garbage").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }
}
