//! Protobuf wire types for the task topic
//!
//! - `TaskMessage` - descriptor published when a validation task is scheduled
//! - `QueuedMessage` - a payload persisted on the durable queue
//! - `DeadLetter` - a message that could not be handled
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mediasweep::proto::TaskMessage;
//! use prost::Message;
//!
//! let message = TaskMessage {
//!     task_id: "0190...".to_string(),
//!     ..Default::default()
//! };
//!
//! let bytes = message.encode_to_vec();
//! let decoded = TaskMessage::decode(&bytes[..])?;
//! ```

/// Published once per scheduled task; the task record holds everything else.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskMessage {
    #[prost(string, tag = "1")]
    pub task_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub requested_by: ::prost::alloc::string::String,
    #[prost(uint64, tag = "3")]
    pub requested_at_ms: u64,
    #[prost(string, tag = "4")]
    pub trace_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueuedMessage {
    #[prost(string, tag = "1")]
    pub topic: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub payload: ::prost::alloc::vec::Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub enqueued_at_ms: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DeadLetter {
    #[prost(message, optional, tag = "1")]
    pub message: ::core::option::Option<QueuedMessage>,
    #[prost(string, tag = "2")]
    pub failure_code: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub failure_message: ::prost::alloc::string::String,
    #[prost(uint64, tag = "4")]
    pub failed_at_ms: u64,
}
