//! Fire-and-forget reporting of referral clicks to the server-side recorder.

use serde_json::json;

/// Posts `{ref}` to the click endpoint on a detached task.
///
/// Nothing here can fail the surrounding flow: errors (network, non-2xx)
/// are routed to the log sink and dropped. The server records the click with
/// whatever attribution it can resolve; an unreported click only costs an
/// audit row.
#[derive(Debug, Clone)]
pub struct ClickReporter {
    http: reqwest::Client,
    endpoint: reqwest::Url,
}

impl ClickReporter {
    pub fn new(endpoint: reqwest::Url) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
        }
    }

    /// Dispatch one report without awaiting it.
    pub fn report(&self, code: &str) {
        let http = self.http.clone();
        let endpoint = self.endpoint.clone();
        let body = json!({ "ref": code });

        tokio::spawn(async move {
            match http.post(endpoint).json(&body).send().await {
                Ok(response) if !response.status().is_success() => {
                    tracing::debug!(status = %response.status(), "click report rejected");
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::debug!(error = %err, "click report failed");
                }
            }
        });
    }
}
