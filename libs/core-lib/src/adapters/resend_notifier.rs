use super::error_from_response;
use crate::{Notifier, UpstreamError, render::ReportDocument};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

pub const RESEND_API_URL: &str = "https://api.resend.com/emails";
pub const REPORT_SUBJECT: &str = "Your Analytics Insight";

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    subject: &'a str,
    html: String,
}

/// Wraps a rendered report fragment in the full email page.
pub fn email_page(fragment: &str, app_url: &str) -> String {
    let dashboard = format!("{}/dashboard", app_url.trim_end_matches('/'));
    format!(
        r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>{subject}</title>
    <style>
      body {{ font-family: sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px; }}
      h2 {{ color: #2563eb; border-bottom: 2px solid #eee; padding-bottom: 10px; margin-top: 30px; }}
      ul {{ padding-left: 20px; }}
      li {{ margin-bottom: 8px; }}
      .footer {{ margin-top: 50px; font-size: 12px; color: #666; text-align: center; border-top: 1px solid #eee; padding-top: 20px; }}
    </style>
  </head>
  <body>
{fragment}
    <div class="footer">
      <p>You are receiving this email because you subscribed to analytics reports.</p>
      <p><a href="{dashboard}">View Dashboard</a></p>
    </div>
  </body>
</html>
"#,
        subject = REPORT_SUBJECT,
        fragment = fragment,
        dashboard = crate::render::escape(&dashboard),
    )
}

/// Email delivery through the Resend HTTP API.
///
/// Without an API key the notifier is disabled: sends are skipped with a
/// warning and reported as successful.
#[derive(Debug, Clone)]
pub struct ResendNotifier {
    client: Client,
    api_key: Option<String>,
    from: String,
    app_url: String,
    endpoint: String,
}

impl ResendNotifier {
    pub fn new(client: Client, api_key: Option<String>, from: String, app_url: String) -> Self {
        Self {
            client,
            api_key,
            from,
            app_url,
            endpoint: RESEND_API_URL.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn send(&self, address: &str, document: &ReportDocument) -> Result<(), UpstreamError> {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("RESEND_API_KEY is not set; skipping email send");
            return Ok(());
        };

        let body = SendEmailRequest {
            from: &self.from,
            to: vec![address],
            subject: REPORT_SUBJECT,
            html: email_page(&document.html, &self.app_url),
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_from_response("mail API", response).await);
        }
        info!("Report email sent");
        Ok(())
    }
}
