use crate::domain::ports::{CleanedLocation, CleanupOracle, OracleLocation, PlaceDetails, PlacesOracle};
use crate::domain::settings::OracleEndpoint;
use crate::utils::error::{EtlError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

fn build_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// 429 與 5xx 可重試，其他非成功狀態視為回應錯誤
async fn check_status(oracle: &str, response: Response) -> Result<Response> {
    let status = response.status();
    tracing::debug!("{} oracle response status: {}", oracle, status);
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("HTTP {}: {}", status.as_u16(), body.chars().take(200).collect::<String>());
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        Err(EtlError::OracleTransient {
            oracle: oracle.to_string(),
            message,
        })
    } else {
        Err(EtlError::OracleResponse {
            oracle: oracle.to_string(),
            message,
        })
    }
}

/// 地址清理服務 (LLM)：POST {"locations": [...]}，回傳陣列或 {"locations": [...]}
pub struct HttpCleanupOracle {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpCleanupOracle {
    pub fn new(endpoint: &OracleEndpoint, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: endpoint.endpoint.clone(),
            api_key: endpoint.api_key.clone(),
        })
    }
}

#[async_trait]
impl CleanupOracle for HttpCleanupOracle {
    async fn clean_batch(&self, batch: &[OracleLocation]) -> Result<Vec<CleanedLocation>> {
        tracing::debug!("Sending {} locations to cleanup oracle", batch.len());
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "locations": batch }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = check_status("cleanup", request.send().await?).await?;
        let body: Value = response.json().await?;
        let items = match body {
            Value::Array(_) => body,
            Value::Object(mut obj) => obj.remove("locations").ok_or_else(|| EtlError::OracleResponse {
                oracle: "cleanup".to_string(),
                message: "response object has no 'locations' field".to_string(),
            })?,
            other => {
                return Err(EtlError::OracleResponse {
                    oracle: "cleanup".to_string(),
                    message: format!("unexpected response: {}", other),
                })
            }
        };
        Ok(serde_json::from_value(items)?)
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    places: Vec<PlaceId>,
}

#[derive(Debug, Deserialize)]
struct PlaceId {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DetailsResponse {
    #[serde(default)]
    address_components: Vec<AddressComponent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressComponent {
    #[serde(default)]
    long_text: String,
    #[serde(default)]
    short_text: String,
    #[serde(default)]
    types: Vec<String>,
}

impl AddressComponent {
    fn is(&self, kind: &str) -> bool {
        self.types.iter().any(|t| t == kind) && self.types.iter().any(|t| t == "political")
    }
}

impl From<DetailsResponse> for PlaceDetails {
    fn from(response: DetailsResponse) -> Self {
        let mut details = PlaceDetails::default();
        for component in response.address_components {
            if component.is("locality") {
                details.locality = Some(component.long_text);
            } else if component.is("administrative_area_level_2") {
                details.county_equivalent = Some(component.long_text);
            } else if component.is("administrative_area_level_1") {
                details.state = Some(component.short_text);
            }
        }
        details
    }
}

/// 地點查詢服務 (Places API v1)
pub struct HttpPlacesOracle {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpPlacesOracle {
    pub fn new(endpoint: &OracleEndpoint, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: endpoint.endpoint.trim_end_matches('/').to_string(),
            api_key: endpoint.api_key.clone(),
        })
    }

    fn with_key(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("X-Goog-Api-Key", key),
            None => request,
        }
    }
}

#[async_trait]
impl PlacesOracle for HttpPlacesOracle {
    async fn search_text(&self, query: &str) -> Result<Vec<String>> {
        tracing::debug!("Places text search: {:?}", query);
        let request = self
            .client
            .post(format!("{}/v1/places:searchText", self.base_url))
            .header("X-Goog-FieldMask", "places.id")
            .json(&serde_json::json!({ "textQuery": query }));

        let response = check_status("places", self.with_key(request).send().await?).await?;
        let body: SearchResponse = response.json().await?;
        Ok(body.places.into_iter().map(|p| p.id).collect())
    }

    async fn place_details(&self, place_id: &str) -> Result<PlaceDetails> {
        tracing::debug!("Places details: {}", place_id);
        let request = self
            .client
            .get(format!("{}/v1/places/{}", self.base_url, place_id))
            .header("X-Goog-FieldMask", "addressComponents");

        let response = check_status("places", self.with_key(request).send().await?).await?;
        let body: DetailsResponse = response.json().await?;
        Ok(body.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn endpoint(url: String, key: Option<&str>) -> OracleEndpoint {
        OracleEndpoint {
            endpoint: url,
            api_key: key.map(String::from),
        }
    }

    fn batch() -> Vec<OracleLocation> {
        vec![OracleLocation {
            id: 0,
            city: "Pars".to_string(),
            county: "Bourbn".to_string(),
            state: "KY".to_string(),
            zip: "".to_string(),
        }]
    }

    #[tokio::test]
    async fn test_cleanup_array_response() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/clean")
                .header("Authorization", "Bearer secret")
                .json_body(json!({"locations": [{"id": 0, "city": "Pars", "county": "Bourbn", "state": "KY", "zip": ""}]}));
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!([{"id": 0, "city": "PARIS", "county": "BOURBON", "state": null, "zipcode": null, "confidence": "high"}]));
        });

        let oracle =
            HttpCleanupOracle::new(&endpoint(server.url("/clean"), Some("secret")), Duration::from_secs(5)).unwrap();
        let cleaned = oracle.clean_batch(&batch()).await.unwrap();

        mock.assert();
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].city.as_deref(), Some("PARIS"));
        assert_eq!(cleaned[0].state, None);
        assert_eq!(cleaned[0].confidence, "high");
    }

    #[tokio::test]
    async fn test_cleanup_wrapped_response() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/clean");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({"locations": [{"id": 0, "county": "BOURBON", "confidence": "medium"}]}));
        });

        let oracle = HttpCleanupOracle::new(&endpoint(server.url("/clean"), None), Duration::from_secs(5)).unwrap();
        let cleaned = oracle.clean_batch(&batch()).await.unwrap();
        assert_eq!(cleaned[0].county.as_deref(), Some("BOURBON"));
        assert_eq!(cleaned[0].city, None);
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/busy");
            then.status(503);
        });
        server.mock(|when, then| {
            when.method(POST).path("/bad");
            then.status(400).body("bad request");
        });

        let busy = HttpCleanupOracle::new(&endpoint(server.url("/busy"), None), Duration::from_secs(5)).unwrap();
        let err = busy.clean_batch(&batch()).await.unwrap_err();
        assert!(matches!(err, EtlError::OracleTransient { .. }));
        assert!(err.is_transient());

        let bad = HttpCleanupOracle::new(&endpoint(server.url("/bad"), None), Duration::from_secs(5)).unwrap();
        let err = bad.clean_batch(&batch()).await.unwrap_err();
        assert!(matches!(err, EtlError::OracleResponse { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_places_search_text() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/v1/places:searchText")
                .header("X-Goog-Api-Key", "key")
                .header("X-Goog-FieldMask", "places.id")
                .json_body(json!({"textQuery": "Paris, KENTUCKY"}));
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({"places": [{"id": "abc"}, {"id": "def"}]}));
        });

        let oracle = HttpPlacesOracle::new(&endpoint(server.base_url(), Some("key")), Duration::from_secs(5)).unwrap();
        let ids = oracle.search_text("Paris, KENTUCKY").await.unwrap();

        mock.assert();
        assert_eq!(ids, vec!["abc", "def"]);
    }

    #[tokio::test]
    async fn test_places_search_without_results() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/v1/places:searchText");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({}));
        });

        let oracle = HttpPlacesOracle::new(&endpoint(server.base_url(), None), Duration::from_secs(5)).unwrap();
        assert!(oracle.search_text("Nowhere, KANSAS").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_places_details_maps_components() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/places/abc")
                .header("X-Goog-FieldMask", "addressComponents");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(json!({"addressComponents": [
                    {"longText": "Paris", "shortText": "Paris", "types": ["locality", "political"]},
                    {"longText": "Bourbon County", "shortText": "Bourbon County", "types": ["administrative_area_level_2", "political"]},
                    {"longText": "Kentucky", "shortText": "KY", "types": ["administrative_area_level_1", "political"]},
                    {"longText": "United States", "shortText": "US", "types": ["country", "political"]}
                ]}));
        });

        let oracle = HttpPlacesOracle::new(&endpoint(format!("{}/", server.base_url()), None), Duration::from_secs(5)).unwrap();
        let details = oracle.place_details("abc").await.unwrap();

        mock.assert();
        assert_eq!(
            details,
            PlaceDetails {
                locality: Some("Paris".to_string()),
                county_equivalent: Some("Bourbon County".to_string()),
                state: Some("KY".to_string()),
            }
        );
    }
}
