use anyhow::Result;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::Credential;
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::models::*;

/// Condition sent when the caller leaves it blank.
pub const DEFAULT_SUGGESTION_CONDITION: &str = "general";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<Value>,
}

/// HTTP client for the health predictor backend.
///
/// Holds no credential of its own: every authenticated call takes the
/// caller's [`Credential`], so flows sharing one client never observe each
/// other's tokens.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.normalized_base_url().to_string(),
        })
    }

    /// Client configured from `HEALTH_API_URL` / `HEALTH_API_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue one JSON request against `base_url + path`.
    ///
    /// Transport failures become [`ApiError::Network`], non-2xx responses
    /// [`ApiError::Http`] (message taken from the body's `detail` when there
    /// is one), and undecodable success bodies [`ApiError::Parse`].
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        credential: Option<&Credential>,
        body: Option<&Value>,
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("{} {}", method, url);

        let mut req = self
            .client
            .request(method.clone(), &url)
            .header(CONTENT_TYPE, "application/json");

        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(credential) = credential {
            req = req.bearer_auth(credential.as_str());
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = error_message(status, &text);
            tracing::warn!("{} {} failed: {} - {}", method, path, status, message);
            return Err(ApiError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let text = resp.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Submit a validated meal for a glucose prediction.
    pub async fn generate_prediction(
        &self,
        credential: &Credential,
        request: &PredictionRequest,
    ) -> Result<PredictionData, ApiError> {
        let body = serde_json::to_value(request)?;
        self.request(Method::POST, "/api/predict", &[], Some(credential), Some(&body))
            .await
    }

    /// Store a glucose reading. Returns the server's acknowledgement as-is.
    pub async fn add_glucose_reading(
        &self,
        credential: &Credential,
        reading: &GlucoseReading,
    ) -> Result<Value, ApiError> {
        let body = serde_json::to_value(reading)?;
        self.request(
            Method::POST,
            "/api/glucose-reading",
            &[],
            Some(credential),
            Some(&body),
        )
        .await
    }

    /// Readings from the last `days` days, newest first as the server orders
    /// them. A response without `data` yields an empty list.
    pub async fn get_glucose_history(
        &self,
        credential: &Credential,
        days: u32,
    ) -> Result<Vec<GlucoseReading>, ApiError> {
        let envelope: DataEnvelope<GlucoseReading> = self
            .request(
                Method::GET,
                "/api/glucose-history",
                &[("days", days.to_string())],
                Some(credential),
                None,
            )
            .await?;
        Ok(envelope.data.unwrap_or_default())
    }

    /// Get the user profile. The backend creates a default one on first access.
    pub async fn get_profile(&self, credential: &Credential) -> Result<UserProfile, ApiError> {
        self.request(Method::GET, "/api/profile", &[], Some(credential), None)
            .await
    }

    /// Update the profile. Fields left as `None` are not sent.
    pub async fn update_profile(
        &self,
        credential: &Credential,
        profile: &UserProfile,
    ) -> Result<UserProfile, ApiError> {
        let body = serde_json::to_value(profile)?;
        self.request(Method::PUT, "/api/profile", &[], Some(credential), Some(&body))
            .await
    }

    pub async fn get_meal_history(
        &self,
        credential: &Credential,
        days: u32,
    ) -> Result<Vec<MealLogEntry>, ApiError> {
        let envelope: DataEnvelope<MealLogEntry> = self
            .request(
                Method::GET,
                "/api/meal-history",
                &[("days", days.to_string())],
                Some(credential),
                None,
            )
            .await?;
        Ok(envelope.data.unwrap_or_default())
    }

    /// Knowledge-base suggestions for a condition such as `"glucose"` or
    /// `"liver"`. A blank condition asks for [`DEFAULT_SUGGESTION_CONDITION`].
    pub async fn get_food_suggestions(
        &self,
        credential: &Credential,
        condition: &str,
    ) -> Result<Vec<FoodSuggestion>, ApiError> {
        let condition = match condition.trim() {
            "" => DEFAULT_SUGGESTION_CONDITION,
            c => c,
        };
        let envelope: SuggestionsEnvelope = self
            .request(
                Method::GET,
                "/api/food-suggestions",
                &[("condition", condition.to_string())],
                Some(credential),
                None,
            )
            .await?;
        Ok(envelope.suggestions.unwrap_or_default())
    }

    /// Unauthenticated liveness probe.
    pub async fn health_check(&self) -> Result<HealthStatus, ApiError> {
        self.request(Method::GET, "/health", &[], None, None).await
    }
}

/// Pick the user-facing message for a failed response.
fn error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.detail);

    match detail {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(Value::Bool(true)) => "true".to_string(),
        Some(Value::Number(n)) if n.as_f64() != Some(0.0) => n.to_string(),
        // FastAPI validation errors carry a list here
        Some(v @ (Value::Array(_) | Value::Object(_))) => v.to_string(),
        _ => format!("Request failed with status {}", status.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_is_used_when_present() {
        let msg = error_message(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"detail": "model unavailable"}"#,
        );
        assert_eq!(msg, "model unavailable");
    }

    #[test]
    fn missing_or_unparsable_detail_falls_back_to_status() {
        for body in [
            "",
            "<html>oops</html>",
            "{}",
            r#"{"detail": ""}"#,
            r#"{"detail": null}"#,
            r#"{"detail": false}"#,
            r#"{"detail": 0}"#,
            "[1,2]",
        ] {
            assert_eq!(
                error_message(StatusCode::BAD_GATEWAY, body),
                "Request failed with status 502",
                "body: {body:?}"
            );
        }
    }

    #[test]
    fn scalar_detail_is_shown_as_is() {
        assert_eq!(error_message(StatusCode::BAD_REQUEST, r#"{"detail": "  "}"#), "  ");
        assert_eq!(error_message(StatusCode::BAD_REQUEST, r#"{"detail": 42}"#), "42");
        assert_eq!(error_message(StatusCode::BAD_REQUEST, r#"{"detail": true}"#), "true");
    }

    #[test]
    fn structured_detail_is_rendered_as_json() {
        let msg = error_message(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"detail": [{"loc": ["body", "mealItems"], "msg": "field required"}]}"#,
        );
        assert!(msg.contains("field required"));
    }

    #[test]
    fn base_url_is_normalized() {
        let client = ApiClient::new(ClientConfig::new("http://localhost:8000/")).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8000");
    }
}
