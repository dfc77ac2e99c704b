//! Webhook notification sink
//!
//! Posts a JSON summary of every successful apply to an HTTP endpoint.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use kube::ResourceExt;
use serde::Serialize;
use tracing::debug;

use crate::manifest::Objects;
use crate::reconcilers::{DeclarativeObject, Sink};

/// Notification body sent to the webhook
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyNotification {
    pub name: String,
    pub namespace: Option<String>,
    pub uid: Option<String>,
    pub objects: Vec<AppliedObject>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedObject {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl ApplyNotification {
    pub fn new<K: DeclarativeObject>(instance: &K, objects: &Objects) -> Self {
        Self {
            name: instance.name_any(),
            namespace: instance.namespace(),
            uid: instance.uid(),
            objects: objects
                .items
                .iter()
                .map(|o| AppliedObject {
                    api_version: o.api_version().to_string(),
                    kind: o.kind().to_string(),
                    name: o.name().to_string(),
                    namespace: o.namespace().map(str::to_string),
                })
                .collect(),
        }
    }
}

/// Sink posting [`ApplyNotification`]s
#[derive(Clone, Debug)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build webhook client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl<K: DeclarativeObject> Sink<K> for WebhookSink {
    async fn notify(&self, instance: &K, objects: &Objects) -> anyhow::Result<()> {
        let body = serde_json::to_vec(&ApplyNotification::new(instance, objects))?;

        self.client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .with_context(|| format!("Failed to post notification to {}", self.url))?
            .error_for_status()?;

        debug!(url = %self.url, name = %instance.name_any(), "Sent apply notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use crate::manifest::parse_objects;

    #[test]
    fn test_notification_body() {
        let instance = ConfigMap {
            metadata: ObjectMeta {
                name: Some("source".to_string()),
                namespace: Some("demo".to_string()),
                uid: Some("u1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let objects = parse_objects(
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\n  namespace: demo\n",
        )
        .unwrap();

        let body = serde_json::to_value(ApplyNotification::new(&instance, &objects)).unwrap();

        assert_eq!(body["name"], "source");
        assert_eq!(body["uid"], "u1");
        assert_eq!(body["objects"][0]["apiVersion"], "apps/v1");
        assert_eq!(body["objects"][0]["namespace"], "demo");
    }
}
