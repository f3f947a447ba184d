//! Account & secret fabric module (C2, §4.2): account records,
//! envelope-encrypted secrets with owner-or-policy access control,
//! wallet binding/verification, and the gasbank ledger.

pub mod domain;
pub mod dto;
pub mod module;
pub mod routes;

pub use domain::AccountsService;
pub use module::{AccountsModule, descriptor};
