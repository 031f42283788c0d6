//! Outbound call client and connection markup
//!
//! Placing a call is a single REST request: the provider dials the number,
//! and once the call is answered it fetches `{public_url}/twiml` and follows
//! the markup's instruction to open a media-stream WebSocket back to `/ws`.

use serde::Deserialize;

use dialtone_config::TelephonySettings;

use crate::TelephonyError;

/// REST client for the telephony provider.
pub struct TwilioClient {
    http: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct CallCreated {
    sid: String,
}

impl TwilioClient {
    pub fn new(settings: &TelephonySettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            account_sid: settings.account_sid.clone(),
            auth_token: settings.auth_token.clone(),
            from_number: settings.from_number.clone(),
            endpoint: settings.endpoint.clone(),
        }
    }

    /// Place an outbound call to `to_number` (E.164).
    ///
    /// Returns the provider's call sid. The answered call will fetch
    /// `{public_url}/twiml` for its connection instructions.
    pub async fn create_call(
        &self,
        to_number: &str,
        public_url: &str,
    ) -> Result<String, TelephonyError> {
        if !to_number.starts_with('+') {
            return Err(TelephonyError::InvalidNumber(to_number.to_string()));
        }

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.endpoint, self.account_sid
        );
        let twiml_url = format!("{public_url}/twiml");
        let params = [
            ("To", to_number),
            ("From", self.from_number.as_str()),
            ("Url", twiml_url.as_str()),
        ];

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let created: CallCreated = response.json().await?;
        tracing::info!(call_sid = %created.sid, to = %to_number, "outbound call created");
        Ok(created.sid)
    }
}

/// Render the connection markup pointing the provider at our stream endpoint.
pub fn connect_twiml(public_url: &str) -> String {
    let ws_url = public_url
        .replacen("https://", "wss://", 1)
        .replacen("http://", "ws://", 1);
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <Response>\n    <Connect>\n        <Stream url=\"{ws_url}/ws\" />\n    </Connect>\n</Response>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn twiml_points_at_websocket_endpoint() {
        let twiml = connect_twiml("https://example.ngrok.app");
        assert!(twiml.contains("wss://example.ngrok.app/ws"));
        assert!(twiml.contains("<Connect>"));
    }

    #[test]
    fn twiml_handles_plain_http() {
        let twiml = connect_twiml("http://localhost:3040");
        assert!(twiml.contains("ws://localhost:3040/ws"));
    }

    #[tokio::test]
    async fn create_call_rejects_non_e164_numbers() {
        let client = TwilioClient::new(&TelephonySettings {
            account_sid: "AC0".into(),
            auth_token: "tok".into(),
            from_number: "+15550001111".into(),
            endpoint: "https://api.invalid".into(),
        });
        let err = client
            .create_call("5550001111", "https://example.test")
            .await
            .unwrap_err();
        assert!(matches!(err, TelephonyError::InvalidNumber(_)));
    }
}
