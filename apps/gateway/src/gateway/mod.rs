pub mod conversation;
pub mod events;
pub mod fanout;
pub mod groups;
pub mod handler;
pub mod hub;
pub mod registry;
pub mod router;
pub mod server;
pub mod session;
pub mod sync;
