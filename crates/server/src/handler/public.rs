use crate::{AppState, response};
use axum::extract::{Query, State};
use axum::response::Response;
use keymeter_core::error::UsageError;
use keymeter_core::range::RangeQuery;
use keymeter_core::timezone;
use keymeter_core::usage::UsageStats;
use serde::Serialize;

/// Query string of `GET /api/v1/public/usage`.
#[derive(Debug, Default)]
pub struct UsageQuery {
    pub key: String,
    pub timezone: String,
    pub period: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl UsageQuery {
    /// Build from raw query pairs. A repeated parameter keeps its first
    /// value; unknown parameters are ignored.
    pub fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut query = Self::default();
        let (mut key, mut timezone) = (None, None);
        for (name, value) in pairs {
            let slot = match name.as_str() {
                "key" => &mut key,
                "timezone" => &mut timezone,
                "period" => &mut query.period,
                "start_date" => &mut query.start_date,
                "end_date" => &mut query.end_date,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        query.key = key.unwrap_or_default();
        query.timezone = timezone.unwrap_or_default();
        query
    }

    fn range(&self) -> RangeQuery {
        RangeQuery {
            period: self.period.clone(),
            start_date: self.start_date.clone(),
            end_date: self.end_date.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PublicUsageStats {
    pub total_requests: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cache_creation_tokens: i64,
    pub total_cache_read_tokens: i64,
    pub total_tokens: i64,
    pub total_cost: f64,
    pub total_actual_cost: f64,
    pub average_duration_ms: f64,
}

impl From<UsageStats> for PublicUsageStats {
    fn from(stats: UsageStats) -> Self {
        Self {
            total_requests: stats.total_requests,
            total_input_tokens: stats.total_input_tokens,
            total_output_tokens: stats.total_output_tokens,
            total_cache_creation_tokens: stats.total_cache_creation_tokens,
            total_cache_read_tokens: stats.total_cache_read_tokens,
            total_tokens: stats.total_tokens,
            total_cost: stats.total_cost,
            total_actual_cost: stats.total_actual_cost,
            average_duration_ms: stats.average_duration_ms,
        }
    }
}

/// GET /api/v1/public/usage — usage statistics for an API key.
///
/// `?key=xxx&period=today|week|month` or
/// `?key=xxx&start_date=2024-01-01&end_date=2024-01-31`, with an optional
/// IANA `timezone`. No authentication: the key is only a lookup handle.
pub async fn usage(
    State(state): State<AppState>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Response, UsageError> {
    let query = UsageQuery::from_pairs(pairs);
    let result = lookup_usage(&state, &query).await;
    match &result {
        Ok(_) => state.metrics.record_usage_query(),
        Err(e) if e.status_code().is_client_error() => state.metrics.record_usage_rejection(),
        Err(e) => tracing::error!(error = %e, "Usage lookup failed"),
    }
    result.map(|stats| response::success(PublicUsageStats::from(stats)))
}

async fn lookup_usage(state: &AppState, query: &UsageQuery) -> Result<UsageStats, UsageError> {
    if query.key.is_empty() {
        return Err(UsageError::MissingParameter(
            "API key is required".to_string(),
        ));
    }

    let api_key = state
        .keys
        .get_by_key(&query.key)
        .await
        .map_err(super::lookup_failure)?;
    if !api_key.is_active() {
        return Err(UsageError::KeyInactive);
    }

    let tz = timezone::resolve_zone(&query.timezone, state.config.load().default_zone());
    let now = timezone::now_in(tz);
    let range = query.range().resolve(now)?;

    tracing::debug!(
        api_key_id = api_key.id,
        timezone = %tz,
        start = %range.start,
        end = %range.end,
        "Resolved usage window"
    );

    state.usage.detailed_stats(api_key.id, &range).await
}
