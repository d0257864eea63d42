//! eventwatch-notify — alert delivery.
//!
//! A [`Notifier`] takes one [`AlertEvent`](eventwatch_core::AlertEvent) and
//! reports whether it was delivered. Delivery failures are logged and turned
//! into `false`; they never propagate into the reconciliation pass.
//!
//! # Transports
//!
//! | Selector | Notifier | Payload |
//! |---|---|---|
//! | 0 | [`NullNotifier`] | none, logged only |
//! | 1 | [`SlackNotifier`] | incoming-webhook attachment |
//! | 2 | [`TeamsNotifier`] | connector MessageCard |

pub mod notifier;
pub mod slack;
pub mod teams;
mod webhook;

pub use notifier::{NotifyError, Notifier, NullNotifier, build_notifier};
pub use slack::SlackNotifier;
pub use teams::TeamsNotifier;
