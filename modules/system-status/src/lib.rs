//! System status module: topology and health observability over the
//! running engine, exposed as REST alongside the baseline
//! `GET /system/status` that `engine-http` mounts for every deployment.

pub mod module;
pub mod routes;

pub use module::{SystemStatusModule, descriptor};
