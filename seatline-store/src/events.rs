use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use seatline_core::events::{HoldReleasedEvent, ReleaseNotifier};
use std::time::Duration;
use tracing::{info, error};

/// Kafka producer for hold lifecycle events.
#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
    release_topic: String,
}

impl EventProducer {
    pub fn new(brokers: &str, release_topic: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            release_topic: release_topic.to_string(),
        })
    }

    pub async fn publish(&self, topic: &str, key: &str, payload: &str) -> Result<(), rdkafka::error::KafkaError> {
        let record = FutureRecord::to(topic)
            .key(key)
            .payload(payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                info!("Sent message to {}/{}: partition {} offset {}", topic, key, delivery.partition, delivery.offset);
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send message to {}: {}", topic, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl ReleaseNotifier for EventProducer {
    async fn holds_released(&self, events: &[HoldReleasedEvent]) {
        for event in events {
            let payload = match serde_json::to_string(event) {
                Ok(p) => p,
                Err(e) => {
                    error!(hold_id = %event.hold_id, "Failed to encode release event: {}", e);
                    continue;
                }
            };
            // Best effort, no retry
            if let Err(e) = self.publish(&self.release_topic, &event.group_token.to_string(), &payload).await {
                error!(hold_id = %event.hold_id, group_token = %event.group_token, "Dropped release event: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_unreachable_broker_does_not_fail_sweep_hook() {
        // Nothing listens on port 1; delivery times out and is logged.
        let producer = EventProducer::new("127.0.0.1:1", "seating.holds.released").unwrap();
        let event = HoldReleasedEvent {
            hold_id: Uuid::new_v4(),
            group_token: Uuid::new_v4(),
            event_id: "evt-1".to_string(),
            seat_code: "A1".to_string(),
            user_id: "user-1".to_string(),
            expired_at: 1_740_852_090,
            released_at: 1_740_852_100,
        };

        producer.holds_released(&[event]).await;
        assert!(producer.publish("seating.holds.released", "k", "{}").await.is_err());
    }
}
