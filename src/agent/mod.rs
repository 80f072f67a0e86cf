#[path = "loop/mod.rs"]
pub mod agent_loop;
pub mod tools;
pub mod truncation;

pub use agent_loop::{AgentLoop, AgentLoopConfig, AgentOutput, AgentReply, StopReason};
