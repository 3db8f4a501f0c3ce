//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` so it can be handed directly to HTTP
//! clients and realtime events. Field names go over the wire in camelCase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use socialbook_shared::{
    CommentId, FriendRequestId, GroupId, GroupMessageId, MessageId, NotificationId, PostId,
    StoryId, UserId,
};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// An account. The credential hash is never part of this struct; see
/// [`Credentials`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub avatar: String,
    pub cover: String,
    pub bio: String,
    /// Ids of accepted friends.
    pub friends: Vec<UserId>,
    /// True while at least one realtime connection is bound to this user.
    /// Written only by the presence lifecycle.
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
    pub is_admin: bool,
    pub is_owner: bool,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            avatar: self.avatar.clone(),
            is_online: self.is_online,
        }
    }
}

/// The public slice of a user shown next to conversations and requests.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    pub avatar: String,
    pub is_online: bool,
}

/// Fields needed to create an account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password_hash: String,
    pub avatar: String,
    pub is_admin: bool,
    pub is_owner: bool,
}

/// Partial profile update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub avatar: Option<String>,
    pub cover: Option<String>,
    pub bio: Option<String>,
}

/// Login material for one account.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: UserId,
    pub password_hash: String,
    pub is_banned: bool,
}

// ---------------------------------------------------------------------------
// Direct message
// ---------------------------------------------------------------------------

/// A direct message. `expires_at` is fixed at creation and never extended.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub from: UserId,
    pub to: UserId,
    pub text: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Message {
    /// The other party of this message, seen from `me`.
    pub fn counterpart(&self, me: &UserId) -> UserId {
        if self.from == *me {
            self.to
        } else {
            self.from
        }
    }
}

/// One inbox row: derived on read, never persisted.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub counterpart: UserId,
    /// Public summary of the counterpart; `None` when that account is gone.
    pub user: Option<UserSummary>,
    pub last_message: Message,
    /// Messages from the counterpart to the viewer that are still unread.
    pub unread: u32,
}

// ---------------------------------------------------------------------------
// Posts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub author: UserId,
    pub content: Option<String>,
    pub image: Option<String>,
    pub likes: Vec<UserId>,
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// A group chat. The creator is always both a member and an admin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub creator: UserId,
    pub admins: Vec<UserId>,
    pub members: Vec<UserId>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Group {
    pub fn is_member(&self, user: &UserId) -> bool {
        self.members.contains(user)
    }

    pub fn is_admin(&self, user: &UserId) -> bool {
        self.admins.contains(user)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    pub id: GroupMessageId,
    pub group_id: GroupId,
    pub from: UserId,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Stories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: StoryId,
    pub author: UserId,
    pub image: String,
    pub viewers: Vec<UserId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
    Friend,
    Message,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Like => "like",
            Self::Comment => "comment",
            Self::Friend => "friend",
            Self::Message => "message",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "like" => Some(Self::Like),
            "comment" => Some(Self::Comment),
            "friend" => Some(Self::Friend),
            "message" => Some(Self::Message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub user: UserId,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub read: bool,
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Friend requests
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl FriendRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: FriendRequestId,
    pub from: UserId,
    pub to: UserId,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
}
