use crate::core::cache::OracleCache;
use crate::core::resolver::LocationResolver;
use crate::domain::model::{OracleFailure, RawLocation, ResolutionSource, UnresolvedReason};
use crate::domain::ports::{CleanedLocation, CleanupOracle, OracleLocation, PlaceDetails, PlacesOracle};
use crate::domain::settings::AugmentationSettings;
use crate::domain::states::{self, State};
use crate::utils::error::{EtlError, Result};
use crate::utils::rate_limit::RateGate;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{self, JoinSet};

/// 第二輪解析得到的答案
#[derive(Debug, Clone, PartialEq)]
pub struct Augmentation {
    pub fips: String,
    pub source: ResolutionSource,
}

#[derive(Debug, Default)]
pub struct AugmentOutcome {
    pub resolved: HashMap<RawLocation, Augmentation>,
    /// 只記錄與 oracle 有關的未解析原因，其餘沿用第一輪的原因
    pub unresolved: HashMap<RawLocation, UnresolvedReason>,
    pub failures: Vec<OracleFailure>,
}

impl AugmentOutcome {
    fn record_error(&mut self, location: &RawLocation, err: &EtlError) {
        if matches!(err, EtlError::Interrupted { .. }) {
            self.unresolved.insert(location.clone(), UnresolvedReason::Interrupted);
            return;
        }
        self.unresolved.insert(location.clone(), UnresolvedReason::OracleFailure);
        self.failures.push(OracleFailure {
            location: location.clone(),
            message: err.to_string(),
        });
    }
}

enum Consensus {
    Agreed(String),
    Disagreed,
    NoAnswer,
}

/// 外部 oracle 的橋接層：清理建議重跑本地比對，再以地點查詢的共同候選補足
///
/// 所有呼叫共用同一個速率閘門與快取；停止旗標在每次請求前檢查。
/// 同一個快取鍵同時只有一個請求在途，其他任務等它寫入快取後直接讀取。
#[derive(Clone)]
pub struct AugmentationBridge {
    cleanup: Option<Arc<dyn CleanupOracle>>,
    places: Option<Arc<dyn PlacesOracle>>,
    cache: Arc<OracleCache>,
    in_flight: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
    gate: Arc<RateGate>,
    retry_delay: Duration,
    batch_size: usize,
    concurrency: usize,
    stop: Arc<AtomicBool>,
}

impl AugmentationBridge {
    pub fn new(settings: &AugmentationSettings, cache: Arc<OracleCache>) -> Self {
        Self {
            cleanup: None,
            places: None,
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            gate: Arc::new(RateGate::per_second(settings.requests_per_second)),
            retry_delay: Duration::from_millis(settings.retry_delay_ms),
            batch_size: settings.batch_size.max(1),
            concurrency: settings.concurrency.max(1),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_cleanup(mut self, oracle: Arc<dyn CleanupOracle>) -> Self {
        self.cleanup = Some(oracle);
        self
    }

    pub fn with_places(mut self, oracle: Arc<dyn PlacesOracle>) -> Self {
        self.places = Some(oracle);
        self
    }

    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.cleanup.is_some() || self.places.is_some()
    }

    pub fn cache(&self) -> &OracleCache {
        &self.cache
    }

    pub async fn augment(
        &self,
        resolver: Arc<LocationResolver>,
        unresolved: &[RawLocation],
    ) -> AugmentOutcome {
        let mut outcome = AugmentOutcome::default();
        if unresolved.is_empty() || !self.is_enabled() {
            return outcome;
        }
        if self.cleanup.is_none() {
            tracing::info!("Places oracle needs a cleanup suggestion to compare against; skipping augmentation");
            return outcome;
        }

        tracing::info!("🤖 Augmenting {} unresolved locations", unresolved.len());
        let suggestions = self.cleanup_suggestions(unresolved, &mut outcome).await;

        let mut pending = Vec::new();
        for location in unresolved {
            let Some(cleaned) = suggestions.get(location) else {
                continue;
            };
            let second = resolver.resolve(cleaned);
            if second.is_resolved() {
                tracing::debug!("{} resolved after cleanup as {}", location, cleaned);
                outcome.resolved.insert(
                    location.clone(),
                    Augmentation {
                        fips: second.fips,
                        source: ResolutionSource::LlmCleanup,
                    },
                );
            } else {
                pending.push((location.clone(), cleaned.clone()));
            }
        }
        let after_cleanup = outcome.resolved.len();
        tracing::info!("🤖 Cleanup suggestions resolved {} locations", after_cleanup);

        if let Some(places) = self.places.clone() {
            self.places_consensus(places, resolver, pending, &mut outcome).await;
            tracing::info!(
                "📍 Places consensus resolved {} locations",
                outcome.resolved.len() - after_cleanup
            );
        }

        if !outcome.failures.is_empty() {
            tracing::warn!("⚠️ {} locations failed at the oracle after retry", outcome.failures.len());
        }
        outcome
    }

    async fn cleanup_suggestions(
        &self,
        locations: &[RawLocation],
        outcome: &mut AugmentOutcome,
    ) -> HashMap<RawLocation, RawLocation> {
        let mut suggestions = HashMap::new();
        let Some(oracle) = self.cleanup.clone() else {
            return suggestions;
        };

        let mut misses: Vec<&RawLocation> = Vec::new();
        for location in locations {
            match self.cache.get(&cleanup_key(location)).await {
                Some(Value::Null) => {}
                Some(value) => match serde_json::from_value::<CleanedLocation>(value) {
                    Ok(cleaned) => {
                        suggestions.insert(location.clone(), apply_cleanup(location, &cleaned));
                    }
                    Err(e) => {
                        tracing::warn!("Ignoring unreadable cached cleanup for {}: {}", location, e);
                        misses.push(location);
                    }
                },
                None => misses.push(location),
            }
        }
        tracing::info!(
            "🤖 Cleanup oracle: {} cached, {} to request",
            locations.len() - misses.len(),
            misses.len()
        );

        for chunk in misses.chunks(self.batch_size) {
            let batch: Vec<OracleLocation> = chunk
                .iter()
                .enumerate()
                .map(|(i, l)| OracleLocation {
                    id: i as u64,
                    city: l.city.clone(),
                    county: l.county.clone(),
                    state: l.state.clone(),
                    zip: l.zip.clone(),
                })
                .collect();

            match self
                .call_with_retry("cleanup", || oracle.clean_batch(&batch))
                .await
            {
                Ok(response) => {
                    let by_id: HashMap<u64, CleanedLocation> =
                        response.into_iter().map(|c| (c.id, c)).collect();
                    for (i, location) in chunk.iter().enumerate() {
                        let cleaned = by_id.get(&(i as u64));
                        // 沒有回覆的 id 也寫入快取，下次不再詢問
                        let value = cleaned
                            .and_then(|c| serde_json::to_value(c).ok())
                            .unwrap_or(Value::Null);
                        self.remember(&cleanup_key(location), value).await;
                        if let Some(cleaned) = cleaned {
                            suggestions.insert((*location).clone(), apply_cleanup(location, cleaned));
                        }
                    }
                }
                Err(err) => {
                    for location in chunk {
                        outcome.record_error(location, &err);
                    }
                }
            }
        }
        suggestions
    }

    async fn places_consensus(
        &self,
        oracle: Arc<dyn PlacesOracle>,
        resolver: Arc<LocationResolver>,
        pending: Vec<(RawLocation, RawLocation)>,
        outcome: &mut AugmentOutcome,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut locations: HashMap<task::Id, RawLocation> = HashMap::new();

        for (original, cleaned) in pending {
            let bridge = self.clone();
            let oracle = oracle.clone();
            let resolver = resolver.clone();
            let semaphore = semaphore.clone();
            let location = original.clone();
            let handle = tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let err = EtlError::ProcessingError {
                            message: e.to_string(),
                        };
                        return (original, Err(err));
                    }
                };
                let verdict = bridge
                    .consensus_for(oracle.as_ref(), &resolver, &original, &cleaned)
                    .await;
                (original, verdict)
            });
            locations.insert(handle.id(), location);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            let (location, verdict) = match joined {
                Ok((_, result)) => result,
                Err(e) => {
                    tracing::error!("❌ Places consensus task failed: {}", e);
                    let Some(location) = locations.remove(&e.id()) else {
                        continue;
                    };
                    let err = EtlError::ProcessingError {
                        message: format!("places consensus task failed: {}", e),
                    };
                    outcome.record_error(&location, &err);
                    continue;
                }
            };
            match verdict {
                Ok(Consensus::Agreed(fips)) => {
                    outcome.resolved.insert(
                        location,
                        Augmentation {
                            fips,
                            source: ResolutionSource::PlacesConsensus,
                        },
                    );
                }
                Ok(Consensus::Disagreed) => {
                    outcome
                        .unresolved
                        .insert(location, UnresolvedReason::OracleDisagreement);
                }
                Ok(Consensus::NoAnswer) => {}
                Err(err) => outcome.record_error(&location, &err),
            }
        }
    }

    /// 原始與清理後的查詢各自取得郡名，只接受兩邊共同且唯一的郡
    async fn consensus_for(
        &self,
        oracle: &dyn PlacesOracle,
        resolver: &LocationResolver,
        original: &RawLocation,
        cleaned: &RawLocation,
    ) -> Result<Consensus> {
        let Some(state) = states::lookup(&original.state).or_else(|| states::lookup(&cleaned.state))
        else {
            return Ok(Consensus::NoAnswer);
        };
        let (Some(original_query), Some(cleaned_query)) =
            (query_text(original, state), query_text(cleaned, state))
        else {
            return Ok(Consensus::NoAnswer);
        };

        let first = self.county_candidates(oracle, &original_query, state).await?;
        let second = self.county_candidates(oracle, &cleaned_query, state).await?;
        if first.is_empty() || second.is_empty() {
            return Ok(Consensus::NoAnswer);
        }

        let common: Vec<&String> = first.iter().filter(|c| second.contains(c)).collect();
        if common.is_empty() {
            tracing::debug!("{}: {:?} and {:?} share no county", original, first, second);
            return Ok(Consensus::Disagreed);
        }

        let mut codes: Vec<String> = Vec::new();
        for name in common {
            if let Some(fips) = resolver.county_fips(state, name) {
                if !codes.contains(&fips) {
                    codes.push(fips);
                }
            }
        }
        Ok(match codes.len() {
            0 => Consensus::NoAnswer,
            1 => Consensus::Agreed(codes.remove(0)),
            _ => Consensus::Disagreed,
        })
    }

    /// 查詢結果中州別相符的郡名 (大寫、不重複)
    async fn county_candidates(
        &self,
        oracle: &dyn PlacesOracle,
        query: &str,
        state: &State,
    ) -> Result<Vec<String>> {
        let mut counties = Vec::new();
        for place_id in self.search(oracle, query).await? {
            let details = self.details(oracle, &place_id).await?;
            let same_state = details
                .state
                .as_deref()
                .and_then(states::lookup)
                .map(|s| s.abbr == state.abbr)
                .unwrap_or(false);
            if !same_state {
                tracing::debug!("Place {} is outside {}; ignored", place_id, state.abbr);
                continue;
            }
            if let Some(county) = details.county_equivalent {
                let county = county.trim().to_uppercase();
                if !county.is_empty() && !counties.contains(&county) {
                    counties.push(county);
                }
            }
        }
        Ok(counties)
    }

    async fn search(&self, oracle: &dyn PlacesOracle, query: &str) -> Result<Vec<String>> {
        let key = format!("places:search:{}", query);
        let lock = self.key_lock(&key).await;
        let _guard = lock.lock().await;
        if let Some(value) = self.cache.get(&key).await {
            if let Ok(ids) = serde_json::from_value::<Vec<String>>(value) {
                return Ok(ids);
            }
        }
        let ids = self
            .call_with_retry("places", || oracle.search_text(query))
            .await?;
        self.remember(&key, serde_json::to_value(&ids)?).await;
        Ok(ids)
    }

    async fn details(&self, oracle: &dyn PlacesOracle, place_id: &str) -> Result<PlaceDetails> {
        let key = format!("places:details:{}", place_id);
        let lock = self.key_lock(&key).await;
        let _guard = lock.lock().await;
        if let Some(value) = self.cache.get(&key).await {
            if let Ok(details) = serde_json::from_value::<PlaceDetails>(value) {
                return Ok(details);
            }
        }
        let details = self
            .call_with_retry("places", || oracle.place_details(place_id))
            .await?;
        self.remember(&key, serde_json::to_value(&details)?).await;
        Ok(details)
    }

    async fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.in_flight
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    async fn remember(&self, key: &str, value: Value) {
        if let Err(e) = self.cache.put(key, value).await {
            tracing::warn!("⚠️ Could not persist oracle response {}: {}", key, e);
        }
    }

    /// 暫時性錯誤 (逾時、連線、429、5xx) 固定延遲後重試一次
    async fn call_with_retry<T, F, Fut>(&self, oracle: &str, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.ensure_running(oracle)?;
        self.gate.acquire().await;
        match call().await {
            Ok(value) => Ok(value),
            Err(err) if err.is_transient() => {
                tracing::warn!(
                    "⚠️ {} oracle call failed ({}), retrying in {:?}",
                    oracle,
                    err,
                    self.retry_delay
                );
                tokio::time::sleep(self.retry_delay).await;
                self.ensure_running(oracle)?;
                self.gate.acquire().await;
                call().await
            }
            Err(err) => Err(err),
        }
    }

    fn ensure_running(&self, oracle: &str) -> Result<()> {
        if self.stop.load(Ordering::SeqCst) {
            return Err(EtlError::Interrupted {
                stage: format!("{} oracle request", oracle),
            });
        }
        Ok(())
    }
}

pub fn cleanup_key(location: &RawLocation) -> String {
    format!("cleanup:{}", location.signature())
}

/// null 或空白欄位保留原值
pub fn apply_cleanup(original: &RawLocation, cleaned: &CleanedLocation) -> RawLocation {
    let pick = |suggested: &Option<String>, fallback: &str| {
        suggested
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(fallback)
            .to_string()
    };
    RawLocation {
        city: pick(&cleaned.city, &original.city),
        county: pick(&cleaned.county, &original.county),
        state: pick(&cleaned.state, &original.state),
        zip: pick(&cleaned.zip, &original.zip),
    }
}

/// 地點查詢字串：非空的城市、郡與州全名，以 ", " 串接；少於兩段不查
pub fn query_text(location: &RawLocation, state: &State) -> Option<String> {
    let parts: Vec<&str> = [location.city.trim(), location.county.trim(), state.name]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() < 2 {
        return None;
    }
    Some(parts.join(", "))
}
