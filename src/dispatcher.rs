#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![forbid(unsafe_code)]

//! Routes a method call to its action and turns the outcome into a
//! [`Response`].
//!
//! Actions run inside the call's own tracing subscriber, so every event
//! they emit lands in the response log. A panicking action becomes a
//! `CpiError` response; the log collected up to the panic is kept.

use crate::context::CpiContext;
use crate::error::ErrorKind;
use crate::protocol_envelope::Response;
use crate::{CpiError, Result};
use futures_util::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use tracing::instrument::WithSubscriber;
use tracing::{error, info};

pub type ActionFuture<'a> = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;
pub type ActionFn = for<'a> fn(&'a CpiContext, &'a [Value]) -> ActionFuture<'a>;
pub type ActionTable = BTreeMap<&'static str, ActionFn>;

const MAX_SUGGESTION_DISTANCE: usize = 3;

/// Wraps an `async fn(&CpiContext, &[Value]) -> Result<Value>` as an [`ActionFn`].
macro_rules! action {
    ($handler:path) => {{
        fn boxed<'a>(
            ctx: &'a $crate::context::CpiContext,
            args: &'a [::serde_json::Value],
        ) -> $crate::dispatcher::ActionFuture<'a> {
            Box::pin($handler(ctx, args))
        }
        boxed as $crate::dispatcher::ActionFn
    }};
}
pub(crate) use action;

pub async fn dispatch(
    ctx: &CpiContext,
    actions: &ActionTable,
    method: &str,
    args: &[Value],
) -> Response {
    let method = method.to_lowercase();
    let outcome = run_action(ctx, actions, &method, args)
        .with_subscriber(ctx.log.dispatch())
        .await;
    let log = ctx.log.take();

    match outcome {
        Ok(result) => Response::success(result, log),
        Err(err) => Response::from_error(&err, log),
    }
}

async fn run_action(
    ctx: &CpiContext,
    actions: &ActionTable,
    method: &str,
    args: &[Value],
) -> Result<Value> {
    let Some(action) = actions.get(method) else {
        let err = not_supported(actions, method);
        error!("{err}");
        return Err(err);
    };

    info!("Begin action {method}");
    let raw = Value::Array(args.to_vec());
    info!("Raw action arguments: {raw}");

    let outcome = AssertUnwindSafe(action(ctx, args))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| {
            Err(CpiError::Internal(format!(
                "Action {method} panicked: {}",
                panic_message(payload.as_ref())
            )))
        });

    match &outcome {
        Ok(result) => {
            info!("Action response: {result}");
            info!("End action {method}");
        }
        Err(err) => error!("Error encountered during action {method}: {err}"),
    }
    outcome
}

fn not_supported(actions: &ActionTable, method: &str) -> CpiError {
    let suggestion = actions
        .keys()
        .map(|name| (strsim::levenshtein(name, method), *name))
        .filter(|(distance, _)| *distance <= MAX_SUGGESTION_DISTANCE)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, name)| format!(" Did you mean '{name}'?"))
        .unwrap_or_default();

    CpiError::bosh(
        ErrorKind::NotSupportedError,
        false,
        format!("Method {method} not supported in photon CPI.{suggestion}"),
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}
