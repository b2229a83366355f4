//! Live delivery of chat frames to connected users.

pub mod fanout;
pub mod hub;
