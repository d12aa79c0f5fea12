//! Access gating: grants, the membership oracle, and the per-request
//! authorization decision.

mod decision;
mod grant;
mod oracle;

pub use decision::{AuthorizationDecision, Gatekeeper};
pub use grant::{AccessGrant, TokenIssuer};
pub use oracle::SubscriptionOracle;
