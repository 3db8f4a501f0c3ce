use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a UUID-backed identifier that serializes as a bare string.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }
    };
}

uuid_id!(
    /// Account identity. Also names the per-user realtime room.
    UserId
);
uuid_id!(PostId);
uuid_id!(CommentId);
uuid_id!(MessageId);
uuid_id!(
    /// Group identity. Also names the per-group realtime room.
    GroupId
);
uuid_id!(GroupMessageId);
uuid_id!(StoryId);
uuid_id!(NotificationId);
uuid_id!(FriendRequestId);
uuid_id!(
    /// Opaque handle for one live realtime connection (one tab/device).
    ConnectionId
);

impl UserId {
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}
