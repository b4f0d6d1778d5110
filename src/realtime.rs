use anyhow::{Context, Result};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
    options::{BasicPublishOptions, ExchangeDeclareOptions},
    types::FieldTable,
};
use serde::{Deserialize, Serialize};

/// Topic exchange carrying real-time events. Connected clients bind a queue
/// with their own `user.{id}` routing key after authenticating.
pub const REALTIME_EXCHANGE: &str = "farmconnect.realtime";

/// Events pushed to users over the real-time channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum RealtimeEvent {
    OrderPlaced {
        order_id: i32,
        sub_order_id: i32,
        farmer_id: i32,
        message: String,
    },
    OrderStatusUpdated {
        order_id: i32,
        sub_order_id: i32,
        status: String,
        message: String,
    },
    OrderCanceled {
        order_id: i32,
        sub_order_id: i32,
        farmer_id: i32,
        message: String,
    },
    ReceiveMessage {
        message_id: i32,
        sender_id: i32,
        content: String,
    },
}

#[derive(Clone)]
pub struct RealtimePublisher {
    channel: Channel,
}

impl RealtimePublisher {
    /// Connect to the broker and declare the durable realtime exchange.
    pub async fn connect(amqp_url: &str) -> Result<Self> {
        let connection = Connection::connect(amqp_url, ConnectionProperties::default())
            .await
            .context("Failed to connect to AMQP broker")?;
        let channel = connection
            .create_channel()
            .await
            .context("Failed to create AMQP channel")?;

        channel
            .exchange_declare(
                REALTIME_EXCHANGE,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .context("Failed to declare realtime exchange")?;

        Ok(Self { channel })
    }

    pub fn routing_key(user_id: i32) -> String {
        format!("user.{user_id}")
    }

    /// Publish one event to a user's room. Best-effort: callers log failures
    /// and never let them fail the surrounding request.
    pub async fn publish(&self, user_id: i32, event: &RealtimeEvent) -> Result<()> {
        let payload = serde_json::to_vec(event).context("Failed to serialize realtime event")?;
        self.channel
            .basic_publish(
                REALTIME_EXCHANGE,
                &Self::routing_key(user_id),
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default(),
            )
            .await
            .context("Failed to publish realtime event")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_key_is_keyed_by_user_id() {
        assert_eq!(RealtimePublisher::routing_key(42), "user.42");
    }

    #[test]
    fn events_are_tagged_in_kebab_case() {
        let event = RealtimeEvent::OrderPlaced {
            order_id: 1,
            sub_order_id: 2,
            farmer_id: 3,
            message: "A new order has been placed by customer 9".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "order-placed");
        assert_eq!(json["sub_order_id"], 2);

        let event = RealtimeEvent::OrderStatusUpdated {
            order_id: 1,
            sub_order_id: 2,
            status: "shipped".into(),
            message: "Your order status has been updated to shipped".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "order-status-updated");

        let event = RealtimeEvent::ReceiveMessage {
            message_id: 7,
            sender_id: 3,
            content: "hello".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "receive-message");
    }
}
