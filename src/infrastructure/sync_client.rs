use crate::infrastructure::error::EngineError;
use crate::infrastructure::wire::{
    SlotPullResponse, SlotPushRequest, SlotPushResponse, TaskPullResponse, TaskPushRequest,
    TaskPushResponse,
};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

/// Remote endpoints used by the sync engines. One method per wire call so
/// tests can script responses without a server.
#[async_trait]
pub trait SyncApi: Send + Sync {
    async fn push_tasks(
        &self,
        token: &str,
        request: &TaskPushRequest,
    ) -> Result<TaskPushResponse, EngineError>;

    async fn pull_tasks(&self, token: &str, since: &str) -> Result<TaskPullResponse, EngineError>;

    async fn push_slots(
        &self,
        token: &str,
        request: &SlotPushRequest,
    ) -> Result<SlotPushResponse, EngineError>;

    async fn pull_slots(&self, token: &str, since: &str) -> Result<SlotPullResponse, EngineError>;
}

pub struct ReqwestSyncApi {
    base: Url,
    client: reqwest::Client,
}

impl ReqwestSyncApi {
    pub fn new(base: Url) -> Self {
        Self {
            base,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, EngineError> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| EngineError::InvalidConfig("sync base url cannot be a base".into()))?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        url: Url,
        token: &str,
        body: &B,
    ) -> Result<R, EngineError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::Remote(format!("request failed: {e}")))?;
        Self::read_json(response).await
    }

    async fn get_json<R: DeserializeOwned>(&self, url: Url, token: &str) -> Result<R, EngineError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| EngineError::Remote(format!("request failed: {e}")))?;
        Self::read_json(response).await
    }

    async fn read_json<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, EngineError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Remote(format!(
                "server returned {status}: {body}"
            )));
        }
        response
            .json::<R>()
            .await
            .map_err(|e| EngineError::Remote(format!("malformed response body: {e}")))
    }
}

#[async_trait]
impl SyncApi for ReqwestSyncApi {
    async fn push_tasks(
        &self,
        token: &str,
        request: &TaskPushRequest,
    ) -> Result<TaskPushResponse, EngineError> {
        let url = self.endpoint(&["sync", "push"])?;
        self.post_json(url, token, request).await
    }

    async fn pull_tasks(&self, token: &str, since: &str) -> Result<TaskPullResponse, EngineError> {
        let mut url = self.endpoint(&["sync", "pull"])?;
        url.query_pairs_mut().append_pair("since", since);
        self.get_json(url, token).await
    }

    async fn push_slots(
        &self,
        token: &str,
        request: &SlotPushRequest,
    ) -> Result<SlotPushResponse, EngineError> {
        let url = self.endpoint(&["schedule", "sync", "push"])?;
        self.post_json(url, token, request).await
    }

    async fn pull_slots(&self, token: &str, since: &str) -> Result<SlotPullResponse, EngineError> {
        let mut url = self.endpoint(&["schedule", "sync", "pull"])?;
        url.query_pairs_mut().append_pair("since", since);
        self.get_json(url, token).await
    }
}
