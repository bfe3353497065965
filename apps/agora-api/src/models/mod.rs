pub mod alert;
pub mod community;
pub mod membership;
pub mod reply;
pub mod room;
pub mod star;
pub mod thread;
pub mod user;
