//! Row-Level Security enforcement (§4.6): a policy registry lookup, an
//! expression compiler for the restricted policy grammar, and a cache over
//! both. Registry storage itself lives in `crate::db::rls`.

pub mod cache;
pub mod engine;
pub mod expr;
pub mod principal;

pub use cache::PolicyCache;
pub use engine::{Command, Enforcement, RlsEngine};
pub use principal::Principal;
