//! Session record creation.

use super::ApiClient;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct SessionCreated {
    id: i64,
}

impl ApiClient {
    /// Creates a new session for the given patient and returns its id.
    ///
    /// Must succeed before recording or file upload can begin; everything
    /// else (audio, transcript, report) hangs off this record.
    pub async fn create_session(&self, patient_id: i64) -> anyhow::Result<i64> {
        let created: SessionCreated = self
            .post_json("/sessions/", &json!({ "patient": patient_id }))
            .await?;
        tracing::info!("Created session {} for patient {}", created.id, patient_id);
        Ok(created.id)
    }
}
