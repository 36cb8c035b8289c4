pub mod auth;
pub mod content;
pub mod media;
pub mod notifications;
pub mod posts;
pub mod privacy;
pub mod social;
pub mod users;
