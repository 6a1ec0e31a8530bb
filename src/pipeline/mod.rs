//! Forwarding pipeline.
//!
//! Every unread message flows through:
//! 1. `MailService::parse_subject()` → `RoutingInstruction` (`routing`)
//! 2. `KeywordFilter::allows()`: exact allow-list match (`rules`)
//! 3. `TargetResolver::resolve()`: fresh lookup per message
//! 4. `MailService::send_forward()` then `MailService::mark_read()`
//!
//! A message is marked read only after its forward succeeded.

pub mod forwarder;
pub mod routing;
pub mod rules;

pub use forwarder::{CycleSummary, ForwardPipeline, MessageOutcome};
pub use routing::RoutingInstruction;
pub use rules::KeywordFilter;
