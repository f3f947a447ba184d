//! Event bus module (C6, §4.5): topic-keyed pull-based fan-out with
//! at-least-once delivery, cursor-based subscriptions, and bounded
//! subscriber lag.

pub mod domain;
pub mod dto;
pub mod module;
pub mod routes;

pub use domain::EventBusService;
pub use module::{EventBusModule, descriptor};
