//! Core types shared by the relay pipeline.

pub mod event;
pub mod message;
pub mod openai;

pub use event::*;
pub use message::*;
pub use openai::*;
