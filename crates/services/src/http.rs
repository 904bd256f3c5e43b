use serde::{Deserialize, Serialize};
use snafu::ResultExt;

use super::error::{DecodeBodySnafu, HttpRequestSnafu, HttpStatusSnafu, ServiceResult};
use super::service::{BoxFuture, ClassificationService, HistoryService, PersistenceService};
use super::types::{HistoryRecord, OutboundMessage, PeerId, TopicPrediction, UserId};

pub const HISTORY_ROUTE: &str = "/api/messages/getmsg";
pub const PERSIST_ROUTE: &str = "/api/messages/addmsg";

#[derive(Debug, Serialize)]
struct HistoryQuery<'a> {
    from: &'a UserId,
    to: &'a PeerId,
}

#[derive(Debug, Serialize)]
struct PersistBody<'a> {
    from: &'a UserId,
    to: &'a PeerId,
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct ClassificationRequest<'a> {
    transcript: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ClassificationResponse {
    data: Vec<TopicPrediction>,
}

/// Chat server adapter covering both history reads and message persistence.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }
}

impl HistoryService for HttpChatApi {
    fn fetch<'a>(
        &'a self,
        user_id: &'a UserId,
        peer_id: &'a PeerId,
    ) -> BoxFuture<'a, ServiceResult<Vec<HistoryRecord>>> {
        Box::pin(async move {
            let url = self.endpoint(HISTORY_ROUTE);
            let query = HistoryQuery {
                from: user_id,
                to: peer_id,
            };
            let payload = post_json(&self.client, &url, &query, "fetch-history").await?;
            let records = decode_history(&payload)?;
            tracing::debug!(
                user_id = %user_id,
                peer_id = %peer_id,
                record_count = records.len(),
                "fetched conversation history"
            );
            Ok(records)
        })
    }
}

impl PersistenceService for HttpChatApi {
    fn record<'a>(&'a self, message: &'a OutboundMessage) -> BoxFuture<'a, ServiceResult<()>> {
        Box::pin(async move {
            let url = self.endpoint(PERSIST_ROUTE);
            let body = PersistBody {
                from: &message.from,
                to: &message.to,
                message: &message.text,
            };
            post_json(&self.client, &url, &body, "persist-message").await?;
            Ok(())
        })
    }
}

/// Topic classifier reached over a JSON POST endpoint.
#[derive(Debug, Clone)]
pub struct HttpTopicClassifier {
    client: reqwest::Client,
    url: String,
}

impl HttpTopicClassifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into().trim().to_string(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ClassificationService for HttpTopicClassifier {
    fn classify<'a>(
        &'a self,
        samples: &'a [String],
    ) -> BoxFuture<'a, ServiceResult<Vec<TopicPrediction>>> {
        Box::pin(async move {
            let request = ClassificationRequest {
                transcript: samples,
            };
            let payload = post_json(&self.client, &self.url, &request, "classify-topics").await?;
            decode_topics(&payload)
        })
    }
}

async fn post_json<B>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
    stage: &'static str,
) -> ServiceResult<String>
where
    B: Serialize + ?Sized,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .context(HttpRequestSnafu { stage })?;
    let status = response.status();
    let payload = response.text().await.context(HttpRequestSnafu {
        stage: "read-response-body",
    })?;

    if !status.is_success() {
        return HttpStatusSnafu {
            stage,
            endpoint: url.to_string(),
            status: status.as_u16(),
            body: payload,
        }
        .fail();
    }

    Ok(payload)
}

pub fn decode_history(payload: &str) -> ServiceResult<Vec<HistoryRecord>> {
    serde_json::from_str(payload).context(DecodeBodySnafu {
        stage: "decode-history",
    })
}

pub fn decode_topics(payload: &str) -> ServiceResult<Vec<TopicPrediction>> {
    let response: ClassificationResponse =
        serde_json::from_str(payload).context(DecodeBodySnafu {
            stage: "decode-topics",
        })?;
    Ok(response.data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ServiceError;

    #[test]
    fn history_rows_keep_server_order() {
        let payload = r#"[
            {"fromSelf": false, "message": "hi"},
            {"fromSelf": true, "message": "hello"},
            {"fromSelf": false, "message": "how are you"}
        ]"#;

        let records = decode_history(payload).expect("history payload should decode");

        assert_eq!(
            records,
            vec![
                HistoryRecord::new(false, "hi"),
                HistoryRecord::new(true, "hello"),
                HistoryRecord::new(false, "how are you"),
            ]
        );
    }

    #[test]
    fn topic_payload_keeps_duplicate_predictions() {
        let payload = r#"{"data": [
            {"prediction": "sports"},
            {"prediction": "sports"},
            {"prediction": "music"}
        ]}"#;

        let topics = decode_topics(payload).expect("topic payload should decode");

        assert_eq!(
            topics,
            vec![
                TopicPrediction::new("sports"),
                TopicPrediction::new("sports"),
                TopicPrediction::new("music"),
            ]
        );
    }

    #[test]
    fn topic_payload_without_data_is_a_decode_error() {
        let error = decode_topics(r#"{"detail": "model not loaded"}"#)
            .expect_err("missing data field must fail");

        assert!(matches!(
            error,
            ServiceError::DecodeBody {
                stage: "decode-topics",
                ..
            }
        ));
    }

    #[test]
    fn endpoint_joins_base_url_without_double_slash() {
        let api = HttpChatApi::new(" http://localhost:5000/ ");

        assert_eq!(
            api.endpoint(HISTORY_ROUTE),
            "http://localhost:5000/api/messages/getmsg"
        );
        assert_eq!(
            api.endpoint(PERSIST_ROUTE),
            "http://localhost:5000/api/messages/addmsg"
        );
    }

    #[test]
    fn request_bodies_use_server_field_names() {
        let user = UserId::new("u-1");
        let peer = PeerId::new("p-2");
        let samples = vec!["hi".to_string(), "bye".to_string()];

        let history = serde_json::to_value(HistoryQuery {
            from: &user,
            to: &peer,
        })
        .expect("history query should serialize");
        let persist = serde_json::to_value(PersistBody {
            from: &user,
            to: &peer,
            message: "hello",
        })
        .expect("persist body should serialize");
        let classify = serde_json::to_value(ClassificationRequest {
            transcript: &samples,
        })
        .expect("classification body should serialize");

        assert_eq!(history, serde_json::json!({"from": "u-1", "to": "p-2"}));
        assert_eq!(
            persist,
            serde_json::json!({"from": "u-1", "to": "p-2", "message": "hello"})
        );
        assert_eq!(classify, serde_json::json!({"transcript": ["hi", "bye"]}));
    }
}
