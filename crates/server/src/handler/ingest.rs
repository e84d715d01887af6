use crate::{AppState, response};
use axum::body::Bytes;
use axum::extract::State;
use axum::response::Response;
use chrono::{DateTime, Utc};
use keymeter_core::cost::TokenCounts;
use keymeter_core::error::UsageError;
use keymeter_core::usage::UsageRecord;
use serde::Deserialize;

/// Body of `POST /api/v1/internal/usage`.
#[derive(Debug, Deserialize)]
pub struct RecordUsageRequest {
    pub api_key_id: i64,
    pub model: String,
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default)]
    pub cache_creation_tokens: i64,
    #[serde(default)]
    pub cache_read_tokens: i64,
    #[serde(default)]
    pub duration_ms: i64,
    /// Nominal cost; priced from the model table when absent.
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl RecordUsageRequest {
    fn validate(&self) -> Result<(), UsageError> {
        if self.model.trim().is_empty() {
            return Err(UsageError::BadRequest("model is required".into()));
        }
        let counters = [
            ("input_tokens", self.input_tokens),
            ("output_tokens", self.output_tokens),
            ("cache_creation_tokens", self.cache_creation_tokens),
            ("cache_read_tokens", self.cache_read_tokens),
            ("duration_ms", self.duration_ms),
        ];
        if let Some((name, _)) = counters.iter().find(|(_, v)| *v < 0) {
            return Err(UsageError::BadRequest(format!("{name} must not be negative")));
        }
        if let Some(cost) = self.cost
            && !(cost.is_finite() && cost >= 0.0)
        {
            return Err(UsageError::BadRequest(
                "cost must be a non-negative number".into(),
            ));
        }
        Ok(())
    }

    fn token_counts(&self) -> TokenCounts {
        TokenCounts {
            input: self.input_tokens as u64,
            output: self.output_tokens as u64,
            cache_creation: self.cache_creation_tokens as u64,
            cache_read: self.cache_read_tokens as u64,
        }
    }
}

/// POST /api/v1/internal/usage — record one completed call for a key.
pub async fn record_usage(State(state): State<AppState>, body: Bytes) -> Result<Response, UsageError> {
    let req: RecordUsageRequest = serde_json::from_slice(&body)?;
    req.validate()?;

    let api_key = state
        .keys
        .get_by_id(req.api_key_id)
        .await
        .map_err(super::lookup_failure)?;

    let cost = match req.cost {
        Some(cost) => cost,
        None => state
            .cost_calculator
            .calculate(&req.model, &req.token_counts())
            .unwrap_or_else(|| {
                tracing::debug!(model = %req.model, "No price for model, recording zero cost");
                0.0
            }),
    };

    let record = UsageRecord {
        api_key_id: api_key.id,
        model: req.model,
        input_tokens: req.input_tokens,
        output_tokens: req.output_tokens,
        cache_creation_tokens: req.cache_creation_tokens,
        cache_read_tokens: req.cache_read_tokens,
        cost,
        actual_cost: cost * api_key.rate_multiplier,
        duration_ms: req.duration_ms,
        created_at: req.created_at.unwrap_or_else(Utc::now),
    };

    state.ledger.record(record.clone())?;
    state.metrics.record_usage_ingest();

    tracing::debug!(
        api_key_id = record.api_key_id,
        model = %record.model,
        total_tokens = record.total_tokens(),
        cost = record.cost,
        "Usage recorded"
    );

    Ok(response::created(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(model: &str) -> RecordUsageRequest {
        RecordUsageRequest {
            api_key_id: 1,
            model: model.to_string(),
            input_tokens: 10,
            output_tokens: 5,
            cache_creation_tokens: 0,
            cache_read_tokens: 0,
            duration_ms: 40,
            cost: None,
            created_at: None,
        }
    }

    #[test]
    fn test_validate_accepts_plain_request() {
        assert!(request("gpt-4o").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_model() {
        let err = request("  ").validate().unwrap_err();
        assert_eq!(err.to_string(), "model is required");
    }

    #[test]
    fn test_validate_rejects_negative_counters() {
        let mut req = request("gpt-4o");
        req.cache_read_tokens = -1;
        let err = req.validate().unwrap_err();
        assert_eq!(err.to_string(), "cache_read_tokens must not be negative");
    }

    #[test]
    fn test_validate_rejects_bad_cost() {
        let mut req = request("gpt-4o");
        req.cost = Some(f64::NAN);
        assert!(req.validate().is_err());
        req.cost = Some(-0.5);
        assert!(req.validate().is_err());
    }
}
