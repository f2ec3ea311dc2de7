//! Access control and trade workflow of the investment back office.
//!
//! Handlers resolve an [`Identity`](identity::Identity) per request, gate
//! reads and writes through [`access`], and submit trades through
//! [`trade::submit_trade`].

pub mod access;
pub mod accounts;
pub mod commission;
pub mod error;
pub mod identity;
pub mod org;
pub mod password;
pub mod session;
pub mod store;
pub mod trade;

#[cfg(test)]
mod test_support;

pub use access::{Resource, can_access, require_access};
pub use commission::CommissionPolicy;
pub use error::{DeskError, Result};
pub use identity::{EntityKind, EntityRef, Identity, can_access_all, resolve_identity};
pub use model::entities::user::{PrivilegeTier, Role};
pub use session::SessionManager;
pub use trade::{PortfolioLocks, TradeReceipt, TradeRequest, TradeState, submit_trade};
