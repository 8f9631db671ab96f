//! The built-in handlers (§4.4-4.6, §4.12), each owning one command id.

pub mod ask_around;
pub mod bye;
pub mod connector;
pub mod heart_beat;

pub use ask_around::AskAroundHandler;
pub use bye::ByeHandler;
pub use connector::ConnectorHandler;
pub use heart_beat::HeartBeatHandler;
