//! SpaceCode collaborator: effects, interpreter seam, errors and retry.
//!
//! | Item | Role |
//! |------|------|
//! | `SpaceEffect` / `SpaceResponse` | remote calls as data |
//! | `SpaceInterpreter` | executes effects against a connection |
//! | `SpaceApiError` | transient vs permanent failures |
//! | `with_retries` | backoff for transient failures, honouring rate limits |

mod effects;
mod error;
mod retry;

use std::future::Future;

pub use effects::{
    CheckStatusReport, ExternalStatus, RemoteSubscription, RemoteWebhook, SpaceEffect,
    SpaceResponse, Subscription, WebhookSpec,
};
pub use error::{SpaceApiError, SpaceErrorKind};
pub use retry::{RetryConfig, with_retries};

use crate::types::Connection;

/// Executes SpaceCode effects.
///
/// Test code uses an in-memory fake; production wires an HTTP client.
pub trait SpaceInterpreter: Send + Sync {
    fn interpret(
        &self,
        connection: &Connection,
        effect: SpaceEffect,
    ) -> impl Future<Output = Result<SpaceResponse, SpaceApiError>> + Send;
}

/// Interprets `effect`, retrying transient failures.
pub async fn execute<I: SpaceInterpreter>(
    interpreter: &I,
    connection: &Connection,
    retry: RetryConfig,
    effect: SpaceEffect,
) -> Result<SpaceResponse, SpaceApiError> {
    with_retries(retry, effect.name(), || interpreter.interpret(connection, effect.clone())).await
}
