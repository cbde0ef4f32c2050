use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;

pub const EMPTY_MEAL_MESSAGE: &str = "Please add at least one food item to your meal.";

/// One line of the meal being logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealItem {
    /// Creation-order identifier, unique within a draft.
    pub id: u64,
    /// Free-text food description.
    pub value: String,
}

impl MealItem {
    pub fn new(id: u64, value: impl Into<String>) -> Self {
        Self {
            id,
            value: value.into(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub duration: String,
}

impl Exercise {
    pub fn new(kind: impl Into<String>, duration: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            duration: duration.into(),
        }
    }
}

/// Ayurvedic constitution label, passed through to the prediction model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dosha {
    Vata,
    Pitta,
    Kapha,
    #[default]
    #[serde(rename = "Vata-Pitta")]
    VataPitta,
    #[serde(rename = "Pitta-Kapha")]
    PittaKapha,
    #[serde(rename = "Vata-Kapha")]
    VataKapha,
    Tridoshic,
}

impl Dosha {
    pub const ALL: [Dosha; 7] = [
        Dosha::Vata,
        Dosha::Pitta,
        Dosha::Kapha,
        Dosha::VataPitta,
        Dosha::PittaKapha,
        Dosha::VataKapha,
        Dosha::Tridoshic,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Dosha::Vata => "Vata",
            Dosha::Pitta => "Pitta",
            Dosha::Kapha => "Kapha",
            Dosha::VataPitta => "Vata-Pitta",
            Dosha::PittaKapha => "Pitta-Kapha",
            Dosha::VataKapha => "Vata-Kapha",
            Dosha::Tridoshic => "Tridoshic",
        }
    }
}

impl fmt::Display for Dosha {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Dosha {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Dosha::ALL
            .into_iter()
            .find(|d| d.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ApiError::Validation(format!("Unknown dosha: {}", s)))
    }
}

/// Body of `POST /api/predict`.
///
/// Only obtainable through [`PredictionRequest::new`], which guarantees at
/// least one non-blank meal item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionRequest {
    meal_items: Vec<MealItem>,
    exercise: Exercise,
    lifestyle_factors: String,
    dosha: Dosha,
}

impl PredictionRequest {
    /// Drop blank entries (keeping the relative order of the rest) and
    /// reject the meal when nothing is left.
    pub fn new(
        meal_items: &[MealItem],
        exercise: Exercise,
        lifestyle_factors: String,
        dosha: Dosha,
    ) -> Result<Self, ApiError> {
        let meal_items: Vec<MealItem> = meal_items
            .iter()
            .filter(|item| !item.is_blank())
            .cloned()
            .collect();

        if meal_items.is_empty() {
            return Err(ApiError::Validation(EMPTY_MEAL_MESSAGE.to_string()));
        }

        Ok(Self {
            meal_items,
            exercise,
            lifestyle_factors,
            dosha,
        })
    }

    pub fn meal_items(&self) -> &[MealItem] {
        &self.meal_items
    }

    pub fn exercise(&self) -> &Exercise {
        &self.exercise
    }

    pub fn lifestyle_factors(&self) -> &str {
        &self.lifestyle_factors
    }

    pub fn dosha(&self) -> Dosha {
        self.dosha
    }
}

/// Prediction payload exactly as the server sent it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionData(Value);

impl PredictionData {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Decode into a typed view such as [`PredictionResponse`].
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_value(self.0.clone())?)
    }
}

/// Shape the prediction service currently returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionResponse {
    pub predicted_glucose: String,
    pub explanation: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    pub dietary_suggestions: Option<Vec<DietarySuggestion>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DietarySuggestion {
    pub meal: String,
    pub foods_to_favor: String,
    pub foods_to_avoid: String,
    pub notes: String,
}

/// A blood glucose measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlucoseReading {
    /// mg/dL. Stored rows call this `glucose_value`.
    #[serde(alias = "glucose_value")]
    pub value: f64,
    #[serde(with = "instant")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl GlucoseReading {
    /// Blank notes are treated as absent.
    pub fn new(
        value: f64,
        timestamp: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<Self, ApiError> {
        if !value.is_finite() {
            return Err(ApiError::Validation(
                "Glucose value must be a number".to_string(),
            ));
        }
        Ok(Self {
            value,
            timestamp,
            notes: notes.filter(|n| !n.trim().is_empty()),
        })
    }

    pub fn band(&self) -> GlucoseBand {
        GlucoseBand::classify(self.value)
    }
}

/// Parse the text of a glucose input field.
pub fn parse_glucose_input(input: &str) -> Result<f64, ApiError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ApiError::Validation(
            "Please enter a glucose value".to_string(),
        ));
    }
    input
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ApiError::Validation(format!("Not a valid glucose value: {}", input)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GlucoseBand {
    Low,
    Normal,
    Elevated,
    High,
}

impl GlucoseBand {
    /// Display band for a mg/dL value. NaN compares false everywhere and
    /// lands in `High`.
    pub fn classify(value: f64) -> Self {
        if value < 70.0 {
            GlucoseBand::Low
        } else if value < 100.0 {
            GlucoseBand::Normal
        } else if value < 140.0 {
            GlucoseBand::Elevated
        } else {
            GlucoseBand::High
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GlucoseBand::Low => "low",
            GlucoseBand::Normal => "normal",
            GlucoseBand::Elevated => "elevated",
            GlucoseBand::High => "high",
        }
    }
}

impl fmt::Display for GlucoseBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// `{"data": [...]}` envelope used by the history endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    pub data: Option<Vec<T>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SuggestionsEnvelope {
    #[serde(default)]
    pub suggestions: Option<Vec<FoodSuggestion>>,
}

/// User profile. Unset fields are omitted on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Stored as free text; labels outside [`Dosha::ALL`] read as `None`.
    #[serde(
        default,
        deserialize_with = "lenient_dosha",
        skip_serializing_if = "Option::is_none"
    )]
    pub dosha: Option<Dosha>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    /// cm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// kg
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_goals: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_conditions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dietary_restrictions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// A meal previously submitted for prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealLogEntry {
    pub id: Option<i64>,
    pub user_id: Option<String>,
    #[serde(default)]
    pub meal_items: Vec<String>,
    pub exercise: Option<Exercise>,
    pub lifestyle_factors: Option<String>,
    pub dosha: Option<String>,
    #[serde(default, with = "instant::option")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A knowledge-base passage recommended for a condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodSuggestion {
    pub context: String,
    #[serde(default)]
    pub relevance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: Option<String>,
}

fn lenient_dosha<'de, D>(deserializer: D) -> Result<Option<Dosha>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

/// Accepts RFC 3339 as well as offset-less ISO timestamps (read as UTC).
mod instant {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&dt.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", s)))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            dt: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match dt {
                Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(s) => super::parse(&s).map(Some).ok_or_else(|| {
                    serde::de::Error::custom(format!("invalid timestamp: {}", s))
                }),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn band_boundaries() {
        assert_eq!(GlucoseBand::classify(69.999), GlucoseBand::Low);
        assert_eq!(GlucoseBand::classify(70.0), GlucoseBand::Normal);
        assert_eq!(GlucoseBand::classify(99.999), GlucoseBand::Normal);
        assert_eq!(GlucoseBand::classify(100.0), GlucoseBand::Elevated);
        assert_eq!(GlucoseBand::classify(139.999), GlucoseBand::Elevated);
        assert_eq!(GlucoseBand::classify(140.0), GlucoseBand::High);
        assert_eq!(GlucoseBand::classify(-5.0), GlucoseBand::Low);
        assert_eq!(GlucoseBand::classify(f64::NAN), GlucoseBand::High);
    }

    #[test]
    fn prediction_request_filters_blank_items_in_order() {
        let items = vec![
            MealItem::new(1, "rice"),
            MealItem::new(2, "   "),
            MealItem::new(3, "dal"),
            MealItem::new(4, ""),
        ];
        let request =
            PredictionRequest::new(&items, Exercise::default(), String::new(), Dosha::default())
                .unwrap();

        let values: Vec<&str> = request.meal_items().iter().map(|i| i.value.as_str()).collect();
        assert_eq!(values, vec!["rice", "dal"]);
        assert_eq!(items.len(), 4, "draft is left untouched");
    }

    #[test]
    fn prediction_request_rejects_all_blank() {
        let items = vec![MealItem::new(1, ""), MealItem::new(2, " \t ")];
        let err = PredictionRequest::new(&items, Exercise::default(), String::new(), Dosha::Kapha)
            .unwrap_err();
        assert_eq!(err, ApiError::Validation(EMPTY_MEAL_MESSAGE.to_string()));

        assert!(
            PredictionRequest::new(&[], Exercise::default(), String::new(), Dosha::Kapha).is_err()
        );
    }

    #[test]
    fn prediction_request_wire_shape() {
        let items = vec![MealItem::new(7, "rice")];
        let request = PredictionRequest::new(
            &items,
            Exercise::new("walking", "20 min"),
            "slept well".to_string(),
            Dosha::VataPitta,
        )
        .unwrap();

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "mealItems": [{"id": 7, "value": "rice"}],
                "exercise": {"type": "walking", "duration": "20 min"},
                "lifestyleFactors": "slept well",
                "dosha": "Vata-Pitta"
            })
        );
    }

    #[test]
    fn history_envelope_without_data() {
        let envelope: DataEnvelope<GlucoseReading> = serde_json::from_value(json!({})).unwrap();
        assert!(envelope.data.is_none());

        let envelope: DataEnvelope<MealLogEntry> =
            serde_json::from_value(json!({"data": null})).unwrap();
        assert!(envelope.data.is_none());
    }

    #[test]
    fn profile_dosha_is_read_leniently() {
        let profile: UserProfile = serde_json::from_value(json!({"dosha": "vata-pitta"})).unwrap();
        assert_eq!(profile.dosha, Some(Dosha::VataPitta));

        let profile: UserProfile =
            serde_json::from_value(json!({"dosha": "Agni", "email": "a@example.com"})).unwrap();
        assert_eq!(profile.dosha, None);
        assert_eq!(profile.email.as_deref(), Some("a@example.com"));

        let profile: UserProfile = serde_json::from_value(json!({"dosha": null})).unwrap();
        assert_eq!(profile.dosha, None);
    }

    #[test]
    fn dosha_parses_labels() {
        assert_eq!("pitta-kapha".parse::<Dosha>().unwrap(), Dosha::PittaKapha);
        assert_eq!(Dosha::default().to_string(), "Vata-Pitta");
        assert!("Agni".parse::<Dosha>().is_err());
    }

    #[test]
    fn reading_accepts_storage_column_and_naive_timestamp() {
        let reading: GlucoseReading = serde_json::from_value(json!({
            "glucose_value": 112.5,
            "timestamp": "2025-03-01T08:30:00.123456",
            "notes": null,
            "user_id": "auth0|abc"
        }))
        .unwrap();

        assert_eq!(reading.value, 112.5);
        assert_eq!(reading.timestamp.to_rfc3339(), "2025-03-01T08:30:00.123456+00:00");
        assert_eq!(reading.band(), GlucoseBand::Elevated);
    }

    #[test]
    fn reading_rejects_non_finite_and_drops_blank_notes() {
        let now = Utc::now();
        assert!(GlucoseReading::new(f64::INFINITY, now, None).is_err());

        let reading = GlucoseReading::new(95.0, now, Some("  ".to_string())).unwrap();
        assert_eq!(reading.notes, None);
        assert!(serde_json::to_value(&reading).unwrap().get("notes").is_none());
    }

    #[test]
    fn glucose_input_parsing() {
        assert_eq!(parse_glucose_input(" 95 ").unwrap(), 95.0);
        assert!(parse_glucose_input("").is_err());
        assert!(parse_glucose_input("abc").is_err());
        assert!(parse_glucose_input("NaN").is_err());
    }

    #[test]
    fn prediction_data_is_kept_verbatim() {
        let raw = json!({"predictedGlucose": "110-130 mg/dL", "explanation": "x", "recommendations": [], "extra": {"a": 1}});
        let data: PredictionData = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(data.as_value(), &raw);

        let typed: PredictionResponse = data.decode().unwrap();
        assert_eq!(typed.predicted_glucose, "110-130 mg/dL");
        assert!(typed.dietary_suggestions.is_none());
    }
}
