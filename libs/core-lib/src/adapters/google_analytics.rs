use super::error_from_response;
use crate::{
    UpstreamError,
    domain::tenant::AnalyticsCredential,
    ga4::{AnalyticsDataApi, RunReportRequest, RunReportResponse},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const ANALYTICS_DATA_URL: &str = "https://analyticsdata.googleapis.com/v1beta";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// HTTP client for the OAuth token endpoint and the Analytics Data API.
///
/// Every fetch exchanges the refresh credential again; access tokens are not cached.
#[derive(Debug, Clone)]
pub struct GoogleAnalyticsClient {
    client: Client,
    client_id: String,
    client_secret: String,
    token_url: String,
    api_base: String,
}

impl GoogleAnalyticsClient {
    pub fn new(client: Client, client_id: String, client_secret: String) -> Self {
        Self {
            client,
            client_id,
            client_secret,
            token_url: GOOGLE_TOKEN_URL.to_string(),
            api_base: ANALYTICS_DATA_URL.to_string(),
        }
    }

    pub fn with_endpoints(
        mut self,
        token_url: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        self.token_url = token_url.into();
        self.api_base = api_base.into();
        self
    }

    fn run_report_url(&self, property: &str) -> String {
        format!("{}/{}:runReport", self.api_base.trim_end_matches('/'), property)
    }

    fn token_form<'a>(
        &'a self,
        credential: &'a AnalyticsCredential,
    ) -> [(&'static str, &'a str); 4] {
        [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", credential.expose()),
            ("grant_type", "refresh_token"),
        ]
    }
}

#[async_trait]
impl AnalyticsDataApi for GoogleAnalyticsClient {
    async fn access_token(
        &self,
        credential: &AnalyticsCredential,
    ) -> Result<String, UpstreamError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(UpstreamError::new(
                "Missing GOOGLE_CLIENT_ID or GOOGLE_CLIENT_SECRET",
            ));
        }

        let response = self
            .client
            .post(&self.token_url)
            .form(&self.token_form(credential)[..])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response("token endpoint", response).await);
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    async fn run_report(
        &self,
        access_token: &str,
        property: &str,
        request: &RunReportRequest,
    ) -> Result<RunReportResponse, UpstreamError> {
        let url = self.run_report_url(property);
        debug!(%url, "Running analytics report");
        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response("analytics runReport", response).await);
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GoogleAnalyticsClient {
        GoogleAnalyticsClient::new(Client::new(), "id".into(), "secret".into())
    }

    #[test]
    fn test_run_report_url() {
        assert_eq!(
            client().run_report_url("properties/42"),
            "https://analyticsdata.googleapis.com/v1beta/properties/42:runReport"
        );
        let local = client().with_endpoints("http://localhost/token", "http://localhost/v1beta/");
        assert_eq!(
            local.run_report_url("properties/1"),
            "http://localhost/v1beta/properties/1:runReport"
        );
    }

    #[test]
    fn test_token_form_uses_refresh_grant() {
        let client = client();
        let credential = AnalyticsCredential::new("1//refresh").unwrap();
        let form = client.token_form(&credential);
        assert!(form.contains(&("grant_type", "refresh_token")));
        assert!(form.contains(&("refresh_token", "1//refresh")));
        assert!(form.contains(&("client_id", "id")));
    }

    #[tokio::test]
    async fn test_missing_client_config_fails_before_request() {
        let client = GoogleAnalyticsClient::new(Client::new(), String::new(), String::new());
        let credential = AnalyticsCredential::new("1//refresh").unwrap();
        let err = client.access_token(&credential).await.unwrap_err();
        assert!(err.message.contains("GOOGLE_CLIENT_ID"));
    }
}
