//! Core NATS publishing for match-found events.
//!
//! `NatsNotifier` talks to a `NatsPublisher`, which is the live client in the
//! server and `TestNats` in tests.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::sync::Mutex;

#[async_trait]
pub trait NatsPublisher: Send + Sync {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()>;
}

/// Fire-and-forget publish on core NATS. No JetStream ack is awaited.
pub struct NatsClientPublisher {
    client: async_nats::Client,
}

impl NatsClientPublisher {
    pub fn new(client: async_nats::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NatsPublisher for NatsClientPublisher {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        self.client.publish(subject, payload).await?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub subject: String,
    pub payload: Bytes,
}

/// In-process publisher that keeps every message in publish order.
#[derive(Default)]
pub struct TestNats {
    published: Mutex<Vec<PublishedMessage>>,
}

impl TestNats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.messages().into_iter().map(|m| m.subject).collect()
    }

    /// Decode every payload published on `subject`.
    pub fn decoded<T: DeserializeOwned>(&self, subject: &str) -> Result<Vec<T>> {
        self.messages()
            .iter()
            .filter(|m| m.subject == subject)
            .map(|m| serde_json::from_slice(&m.payload).map_err(Into::into))
            .collect()
    }

    fn messages(&self) -> Vec<PublishedMessage> {
        self.published
            .lock()
            .map(|m| m.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl NatsPublisher for TestNats {
    async fn publish(&self, subject: String, payload: Bytes) -> Result<()> {
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(PublishedMessage { subject, payload });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_keeps_publish_order_and_decodes_by_subject() {
        let nats = TestNats::new();

        nats.publish("matches.found".into(), Bytes::from(r#"{"id":"1"}"#))
            .await
            .unwrap();
        nats.publish("users.ann.matches".into(), Bytes::from(r#"{"id":"1"}"#))
            .await
            .unwrap();

        assert_eq!(nats.subjects(), vec!["matches.found", "users.ann.matches"]);
        let decoded: Vec<serde_json::Value> = nats.decoded("matches.found").unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0]["id"], "1");
    }

    #[test]
    fn test_undecodable_payload_is_an_error() {
        let nats = TestNats::new();
        nats.published
            .lock()
            .unwrap()
            .push(PublishedMessage {
                subject: "matches.found".into(),
                payload: Bytes::from_static(b"not json"),
            });

        assert!(nats.decoded::<serde_json::Value>("matches.found").is_err());
    }
}
