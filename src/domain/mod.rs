pub mod media;
pub mod notification;
pub mod post;
pub mod privacy;
pub mod user;
