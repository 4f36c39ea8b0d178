//! Message types for chat connector communication.
//!
//! The connector speaks the Bot Framework activity schema. Only the fields the
//! relay reads or writes are modeled; unknown fields are ignored on input.

use crate::traits::{ChannelError, ChannelResult};
use serde::{Deserialize, Serialize};

/// Activity type tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityType {
    #[default]
    Message,
    ConversationUpdate,
    ContactRelationUpdate,
    Typing,
    EndOfConversation,
    Event,
    Invoke,
    #[serde(other)]
    Other,
}

/// A user or bot account on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// The conversation an activity belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_group: Option<bool>,
}

/// Inbound or outbound connector activity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type", default)]
    pub activity_type: ActivityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_format: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
}

impl Activity {
    /// Build a plain-text reply addressed back through `reference`.
    pub fn reply(reference: &ConversationReference, text: impl Into<String>) -> Self {
        Self {
            activity_type: ActivityType::Message,
            channel_id: Some(reference.channel_id.clone()),
            service_url: Some(reference.service_url.clone()),
            from: reference.bot.clone(),
            recipient: reference.user.clone(),
            conversation: Some(reference.conversation.clone()),
            text: Some(text.into()),
            text_format: Some("plain".into()),
            reply_to_id: reference.activity_id.clone(),
            ..Default::default()
        }
    }
}

/// Everything needed to send a reply into an existing conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationReference {
    pub service_url: String,
    pub channel_id: String,
    pub conversation: ConversationAccount,
    /// The bot's own account (recipient of the inbound activity).
    pub bot: Option<ChannelAccount>,
    pub user: Option<ChannelAccount>,
    /// Inbound activity being replied to.
    pub activity_id: Option<String>,
}

/// Unified inbound message handed from the webhook to the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message ID (activity id, or a generated one)
    pub id: String,
    /// Conversation the message belongs to; keys the session binding.
    pub conversation_id: String,
    /// User identifier
    pub user_id: String,
    /// Raw, unsanitized text
    pub text: String,
    /// Reply routing
    pub reference: ConversationReference,
    /// Receive time (Unix millis)
    pub timestamp: i64,
    /// Trace ID for following this message through the logs
    pub trace_id: String,
}

impl ChannelMessage {
    /// Convert an inbound activity into a relayable message.
    ///
    /// Returns `Ok(None)` for activities the relay does not act on: anything
    /// other than a `message`, or a message without text.
    pub fn from_activity(activity: Activity) -> ChannelResult<Option<Self>> {
        if activity.activity_type != ActivityType::Message {
            return Ok(None);
        }
        let Some(text) = activity.text else {
            return Ok(None);
        };

        let conversation = activity
            .conversation
            .ok_or_else(|| ChannelError::InvalidMessage("activity has no conversation".into()))?;
        if conversation.id.is_empty() {
            return Err(ChannelError::InvalidMessage("conversation id is empty".into()));
        }
        let service_url = activity
            .service_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ChannelError::InvalidMessage("activity has no serviceUrl".into()))?;

        let user_id = activity
            .from
            .as_ref()
            .map(|account| account.id.clone())
            .unwrap_or_else(|| "unknown".to_string());

        let id = activity
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Ok(Some(Self {
            id,
            conversation_id: conversation.id.clone(),
            user_id,
            text,
            reference: ConversationReference {
                service_url,
                channel_id: activity.channel_id.unwrap_or_default(),
                conversation,
                bot: activity.recipient,
                user: activity.from,
                activity_id: activity.id,
            },
            timestamp: chrono::Utc::now().timestamp_millis(),
            trace_id: relay_common::logging::generate_trace_id(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inbound() -> serde_json::Value {
        json!({
            "type": "message",
            "id": "act-1",
            "timestamp": "2020-05-01T10:00:00.000Z",
            "serviceUrl": "https://smba.trafficmanager.net/emea/",
            "channelId": "msteams",
            "from": { "id": "user-1", "name": "Ada" },
            "recipient": { "id": "bot-1", "name": "relay" },
            "conversation": { "id": "conv-1" },
            "text": "Hello\tthere",
            "entities": []
        })
    }

    #[test]
    fn test_message_activity_conversion() {
        let activity: Activity = serde_json::from_value(inbound()).unwrap();
        let msg = ChannelMessage::from_activity(activity).unwrap().unwrap();

        assert_eq!(msg.id, "act-1");
        assert_eq!(msg.conversation_id, "conv-1");
        assert_eq!(msg.user_id, "user-1");
        assert_eq!(msg.text, "Hello\tthere");
        assert_eq!(msg.reference.channel_id, "msteams");
        assert_eq!(msg.reference.bot.as_ref().unwrap().id, "bot-1");
        assert_eq!(msg.reference.activity_id.as_deref(), Some("act-1"));
    }

    #[test]
    fn test_non_message_activity_ignored() {
        let mut value = inbound();
        value["type"] = json!("conversationUpdate");
        let activity: Activity = serde_json::from_value(value).unwrap();
        assert_eq!(activity.activity_type, ActivityType::ConversationUpdate);
        assert!(ChannelMessage::from_activity(activity).unwrap().is_none());
    }

    #[test]
    fn test_unknown_activity_type() {
        let mut value = inbound();
        value["type"] = json!("messageReaction");
        let activity: Activity = serde_json::from_value(value).unwrap();
        assert_eq!(activity.activity_type, ActivityType::Other);
    }

    #[test]
    fn test_message_without_conversation_rejected() {
        let mut value = inbound();
        value.as_object_mut().unwrap().remove("conversation");
        let activity: Activity = serde_json::from_value(value).unwrap();
        assert!(matches!(
            ChannelMessage::from_activity(activity),
            Err(ChannelError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_reply_swaps_accounts() {
        let activity: Activity = serde_json::from_value(inbound()).unwrap();
        let msg = ChannelMessage::from_activity(activity).unwrap().unwrap();
        let reply = Activity::reply(&msg.reference, "Hi Ada");

        assert_eq!(reply.from.unwrap().id, "bot-1");
        assert_eq!(reply.recipient.unwrap().id, "user-1");
        assert_eq!(reply.reply_to_id.as_deref(), Some("act-1"));

        let json = serde_json::to_value(Activity::reply(&msg.reference, "x")).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["replyToId"], "act-1");
        assert_eq!(json["conversation"]["id"], "conv-1");
        assert!(json.get("timestamp").is_none());
    }
}
