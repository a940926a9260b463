pub mod id;
pub mod snowflake;

pub use id::{ConnectionId, GroupId, IdentityId, MessageId, PrefixedId};
pub use snowflake::SnowflakeGenerator;
