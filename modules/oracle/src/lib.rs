//! Oracle module (C4/C5, §4.3/§4.4): the canonical long-running request
//! dispatcher plus the HTTP resolver reference implementation. §9 Design
//! Notes: "the Oracle core is specified in full and declared the
//! canonical pattern" every sibling dispatcher-shaped service reuses.

pub mod dispatcher;
pub mod domain;
pub mod dto;
pub mod http_resolver;
pub mod module;
pub mod resolver;
pub mod routes;

pub use domain::OracleService;
pub use module::{OracleModule, descriptor};
