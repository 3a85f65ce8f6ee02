// Mood report to the playlist decision service

use crate::error::{MoodDetectorError, Result};
use crate::models::{MoodReport, MoodResponse};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{error, info};

/// Sends the detected mood and returns the service's decision
#[async_trait]
pub trait MoodReporter: Send + Sync {
    async fn report(&self, report: MoodReport) -> Result<MoodResponse>;
}

/// Reports over HTTP as `POST <server>/detect_mood` with a JSON body
pub struct HttpMoodReporter {
    client: Client,
    endpoint: Url,
}

impl HttpMoodReporter {
    /// Creates a reporter for `endpoint_path` on `server_url`
    pub fn new(server_url: &Url, endpoint_path: &str, timeout: Duration) -> Result<Self> {
        let endpoint = server_url.join(endpoint_path).map_err(|e| {
            MoodDetectorError::Config(format!("invalid mood endpoint {endpoint_path:?}: {e}"))
        })?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl MoodReporter for HttpMoodReporter {
    async fn report(&self, report: MoodReport) -> Result<MoodResponse> {
        info!("Sending mood {} to {}", report.mood, self.endpoint);

        // `json` sets Content-Type: application/json
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&report)
            .send()
            .await
            .map_err(|e| {
                error!("Error sending mood to backend: {}", e);
                MoodDetectorError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<MoodResponse>()
                .await
                .ok()
                .and_then(|body| body.error);
            let reason = match detail {
                Some(detail) => format!("server returned {status}: {detail}"),
                None => format!("server returned {status}"),
            };
            error!("Error sending mood to backend: {}", reason);
            return Err(MoodDetectorError::ReportTransport(reason));
        }

        let body = response.json::<MoodResponse>().await.map_err(|e| {
            error!("Malformed response from backend: {}", e);
            MoodDetectorError::from(e)
        })?;
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_joined_onto_server_url() {
        let server = Url::parse("http://127.0.0.1:5000").unwrap();
        let reporter = HttpMoodReporter::new(&server, "/detect_mood", Duration::from_secs(5))
            .unwrap();
        assert_eq!(
            reporter.endpoint().as_str(),
            "http://127.0.0.1:5000/detect_mood"
        );
    }
}
