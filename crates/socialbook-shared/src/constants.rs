/// Application name
pub const APP_NAME: &str = "SocialBook";

/// Direct messages expire this many hours after creation
pub const MESSAGE_TTL_HOURS: i64 = 48;

/// Stories expire this many hours after creation
pub const STORY_TTL_HOURS: i64 = 24;

/// Group messages older than this are pruned by the retention sweep
pub const GROUP_MESSAGE_RETENTION_HOURS: i64 = 48;

/// Delay before the first group-message sweep after startup
pub const SWEEP_INITIAL_DELAY_SECS: u64 = 5;

/// Period of the group-message sweep (60 minutes)
pub const SWEEP_INTERVAL_SECS: u64 = 60 * 60;

/// Period of the store-level TTL monitor for messages and stories
pub const TTL_MONITOR_INTERVAL_SECS: u64 = 60;

/// Bearer token lifetime (7 days)
pub const SESSION_TTL_HOURS: i64 = 7 * 24;

/// Upper bound on likes a single post accepts
pub const MAX_REACTIONS_PER_POST: usize = 10_000;

/// Number of notifications returned by the notification feed
pub const NOTIFICATION_PAGE_SIZE: u32 = 20;

/// Number of friend suggestions returned
pub const SUGGESTION_LIMIT: u32 = 10;

/// Outbound realtime events buffered per connection before dropping
pub const CONNECTION_BUFFER: usize = 256;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Maximum request body size in bytes (50 MiB)
pub const MAX_BODY_BYTES: usize = 50 * 1024 * 1024;
