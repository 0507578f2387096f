//! Webhook routing and trigger matching.
//!
//! | Module | Role |
//! |--------|------|
//! | `events` | typed payloads handed over by the transport |
//! | `registry` | webhook id / trigger id index over all jobs |
//! | `naming` | `GEN|...` webhook names, the fallback route to a trigger |
//! | `classify` | event x trigger -> run, unexpected, ignored |
//! | `sync` | keeps remote webhooks in line with trigger definitions |
//! | `handler` | ties the above together for one delivery |

mod classify;
mod events;
mod handler;
mod naming;
mod registry;
mod sync;

pub use classify::{TriggerOutcome, classify};
pub(crate) use classify::merge_request_info;
pub use events::{WebhookDelivery, WebhookEvent};
pub use handler::{RouteError, WebhookHandler, WebhookResponse};
pub use naming::{GeneratedName, parse_webhook_name, webhook_name};
pub use registry::{RegisteredTrigger, TriggerRegistry};
pub use sync::{PAYLOAD_FIELDS, SyncError, WebhookSynchronizer, desired_webhook};
