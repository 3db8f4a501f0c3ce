//! Realtime wire protocol.
//!
//! Every frame is a JSON text frame `{"event": "<name>", "data": <payload>}`.
//! Payload-less events omit `data`.

use serde::{Deserialize, Serialize};

use socialbook_shared::{GroupId, PostId, StoryId, UserId};
use socialbook_store::{Group, GroupMessage, Message, Post, Story};

/// Events pushed from the server to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    NewMessage(Message),
    NewPost(Post),
    UpdatePost(Post),
    DeletePost(PostId),
    NewStory(Story),
    StoryDeleted(StoryId),
    /// Tells the client to re-fetch its notifications.
    Notification,
    FriendRequest,
    UserOnline(UserId),
    UserOffline(UserId),
    Typing {
        from: UserId,
    },
    StopTyping {
        from: UserId,
    },
    NewGroupMessage {
        #[serde(rename = "groupId")]
        group_id: GroupId,
        message: GroupMessage,
    },
    AddedToGroup(Group),
    RemovedFromGroup(GroupId),
    GroupDeleted(GroupId),
    IncomingCall(CallSignal),
    CallAccepted(CallSignal),
    CallEnded(CallSignal),
    Error {
        message: String,
    },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Wire name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NewMessage(_) => "newMessage",
            Self::NewPost(_) => "newPost",
            Self::UpdatePost(_) => "updatePost",
            Self::DeletePost(_) => "deletePost",
            Self::NewStory(_) => "newStory",
            Self::StoryDeleted(_) => "storyDeleted",
            Self::Notification => "notification",
            Self::FriendRequest => "friendRequest",
            Self::UserOnline(_) => "userOnline",
            Self::UserOffline(_) => "userOffline",
            Self::Typing { .. } => "typing",
            Self::StopTyping { .. } => "stopTyping",
            Self::NewGroupMessage { .. } => "newGroupMessage",
            Self::AddedToGroup(_) => "addedToGroup",
            Self::RemovedFromGroup(_) => "removedFromGroup",
            Self::GroupDeleted(_) => "groupDeleted",
            Self::IncomingCall(_) => "incomingCall",
            Self::CallAccepted(_) => "callAccepted",
            Self::CallEnded(_) => "callEnded",
            Self::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Audio,
    Video,
}

/// Call signaling relayed between two users. `from` is always the bound
/// identity of the sending connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSignal {
    pub from: UserId,
    pub to: UserId,
    #[serde(rename = "type")]
    pub kind: CallKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<serde_json::Value>,
}

/// Events sent by clients.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientEvent {
    Join(JoinRequest),
    Typing(TypingRequest),
    StopTyping(TypingRequest),
    JoinGroup(GroupId),
    LeaveGroup(GroupId),
    StartCall(CallRequest),
    AcceptCall(CallRequest),
    EndCall(CallRequest),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub user_id: UserId,
    pub token: String,
}

/// `from` is accepted for compatibility; the bound identity wins.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TypingRequest {
    pub to: UserId,
    #[serde(default)]
    pub from: Option<UserId>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallRequest {
    pub to: UserId,
    #[serde(default)]
    pub from: Option<UserId>,
    #[serde(rename = "type")]
    pub kind: CallKind,
    #[serde(default)]
    pub signal: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_event_framing() {
        let user = UserId::new();
        let value = serde_json::to_value(ServerEvent::UserOnline(user)).unwrap();
        assert_eq!(value, json!({ "event": "userOnline", "data": user.to_string() }));

        let value = serde_json::to_value(ServerEvent::Typing { from: user }).unwrap();
        assert_eq!(value, json!({ "event": "typing", "data": { "from": user.to_string() } }));
    }

    #[test]
    fn test_signal_events_have_no_data() {
        let value = serde_json::to_value(ServerEvent::Notification).unwrap();
        assert_eq!(value, json!({ "event": "notification" }));
        assert_eq!(ServerEvent::FriendRequest.name(), "friendRequest");
    }

    #[test]
    fn test_group_message_payload_keys() {
        let group_id = GroupId::new();
        let message = GroupMessage {
            id: socialbook_shared::GroupMessageId::new(),
            group_id,
            from: UserId::new(),
            text: "hey".into(),
            created_at: chrono::Utc::now(),
        };
        let value = serde_json::to_value(ServerEvent::NewGroupMessage {
            group_id,
            message,
        })
        .unwrap();
        assert_eq!(value["event"], "newGroupMessage");
        assert_eq!(value["data"]["groupId"], group_id.to_string());
        assert_eq!(value["data"]["message"]["text"], "hey");
        assert_eq!(value["data"]["message"]["groupId"], group_id.to_string());
    }

    #[test]
    fn test_parse_client_events() {
        let user = UserId::new();
        let frame = json!({ "event": "join", "data": { "userId": user.to_string(), "token": "t" } });
        assert_eq!(
            serde_json::from_value::<ClientEvent>(frame).unwrap(),
            ClientEvent::Join(JoinRequest {
                user_id: user,
                token: "t".into()
            })
        );

        let frame = json!({ "event": "startCall", "data": { "to": user.to_string(), "type": "video" } });
        match serde_json::from_value::<ClientEvent>(frame).unwrap() {
            ClientEvent::StartCall(call) => {
                assert_eq!(call.to, user);
                assert_eq!(call.kind, CallKind::Video);
                assert!(call.from.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let group = GroupId::new();
        let frame = json!({ "event": "joinGroup", "data": group.to_string() });
        assert_eq!(
            serde_json::from_value::<ClientEvent>(frame).unwrap(),
            ClientEvent::JoinGroup(group)
        );
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let frame = json!({ "event": "selfDestruct", "data": {} });
        assert!(serde_json::from_value::<ClientEvent>(frame).is_err());
    }

    #[test]
    fn test_call_signal_uses_type_key() {
        let signal = CallSignal {
            from: UserId::new(),
            to: UserId::new(),
            kind: CallKind::Audio,
            signal: None,
        };
        let value = serde_json::to_value(ServerEvent::CallEnded(signal)).unwrap();
        assert_eq!(value["data"]["type"], "audio");
        assert!(value["data"].get("signal").is_none());
    }
}
