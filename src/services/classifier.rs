/// Route classifier client
///
/// The classifier is an external inference service trained on historical
/// visit sequences. It reads a route rendered as text and returns one score
/// per class, where class index `i` stands for POI id `i`.
///
/// The service is optional. When no endpoint is configured, or the endpoint
/// fails, the recommender simply works without classifier predictions.
use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    error::{AppError, AppResult},
    models::{ClassifierPrediction, PoiId},
    store::PoiStore,
};

/// Class indices tried, in score order, when the top class is unusable
const FALLBACK_CANDIDATES: usize = 3;

/// Raw classifier output for one route context
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ClassScores {
    /// Class the model itself picked, when it reports one
    #[serde(default)]
    pub prediction: Option<i64>,
    pub scores: Vec<f64>,
}

impl ClassScores {
    /// Class index with the highest score
    fn argmax(&self) -> Option<usize> {
        self.scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, _)| idx)
    }

    /// Class indices ordered by descending score (ties by index)
    fn ranked(&self) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..self.scores.len()).collect();
        indices.sort_by(|a, b| self.scores[*b].total_cmp(&self.scores[*a]).then(a.cmp(b)));
        indices
    }
}

/// Trait for route classifiers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RouteClassifier: Send + Sync {
    /// Scores every class for a route context string
    async fn predict(&self, context: &str) -> AppResult<ClassScores>;

    /// Name used in logs and health output
    fn name(&self) -> &'static str;
}

/// Classifier reached over HTTP: `POST {url}/predict` with `{"text": ...}`
#[derive(Clone)]
pub struct HttpClassifier {
    http_client: HttpClient,
    url: String,
}

impl HttpClassifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            url: url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Serialize)]
struct PredictRequest<'a> {
    text: &'a str,
}

#[async_trait::async_trait]
impl RouteClassifier for HttpClassifier {
    #[instrument(skip(self))]
    async fn predict(&self, context: &str) -> AppResult<ClassScores> {
        let url = format!("{}/predict", self.url);

        let response = self
            .http_client
            .post(&url)
            .json(&PredictRequest { text: context })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "Classifier returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Renders a route as the classifier's input text: `"<id> <theme>"` per known POI
pub fn format_route_context(store: &PoiStore, route: &[PoiId]) -> String {
    route
        .iter()
        .filter_map(|id| store.theme_of(*id).map(|theme| format!("{} {}", id, theme)))
        .collect::<Vec<_>>()
        .join(" ")
}

fn usable(store: &PoiStore, route: &[PoiId], class: i64) -> bool {
    store.contains(class) && !route.contains(&class)
}

/// Turns raw class scores into at most one prediction for the route
///
/// The model's own pick (or the argmax) wins when it names a known POI not
/// already in the route; otherwise the best of the top three classes does.
pub fn resolve_prediction(
    store: &PoiStore,
    route: &[PoiId],
    scores: &ClassScores,
) -> Option<ClassifierPrediction> {
    let top = scores.argmax()?;
    let confidence = scores.scores[top];
    let class = scores.prediction.unwrap_or(top as i64);

    if usable(store, route, class) {
        return Some(ClassifierPrediction {
            poi_id: class,
            confidence,
        });
    }

    scores
        .ranked()
        .into_iter()
        .take(FALLBACK_CANDIDATES)
        .find(|idx| usable(store, route, *idx as i64))
        .map(|idx| ClassifierPrediction {
            poi_id: idx as i64,
            confidence: scores.scores[idx],
        })
}

/// Queries the classifier for a route; any failure yields no predictions
pub async fn predict_next(
    classifier: &dyn RouteClassifier,
    store: &PoiStore,
    route: &[PoiId],
) -> Vec<ClassifierPrediction> {
    let context = format_route_context(store, route);
    if context.is_empty() {
        return Vec::new();
    }

    match classifier.predict(&context).await {
        Ok(scores) => resolve_prediction(store, route, &scores).into_iter().collect(),
        Err(e) => {
            tracing::warn!(
                classifier = classifier.name(),
                error = %e,
                "Classifier prediction failed"
            );
            Vec::new()
        }
    }
}
