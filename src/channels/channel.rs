//! Outbound transport and inbound mailbox traits.

use async_trait::async_trait;

use crate::channels::email_types::{InboundEmail, OutboundEmail};
use crate::error::ChannelError;

/// Delivers one message. Used for both outreach and report emails.
///
/// An `Err` is a delivery failure; the outreach stage treats it as retryable.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Short name for logs ("smtp", "test", ...).
    fn name(&self) -> &str;

    async fn send(&self, email: &OutboundEmail) -> Result<(), ChannelError>;
}

/// Source of inbound task emails.
#[async_trait]
pub trait InboundChannel: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch unread messages whose subject contains `subject_filter`.
    ///
    /// Every returned message has already been marked read, so a message is
    /// handed out at most once.
    async fn fetch_unread_matching(
        &self,
        subject_filter: &str,
    ) -> Result<Vec<InboundEmail>, ChannelError>;
}
