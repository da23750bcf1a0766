pub mod channel;
pub mod dispatcher;
pub mod email;
pub mod webhook;

pub use channel::{ChannelAdapter, ChannelOutcome, DeliveryFailure, NotificationPayload};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use email::EmailAdapter;
pub use webhook::WebhookAdapter;
