//! Transport contexts: the extension point used by protocol binders.
//!
//! A binder (HTTP client, message producer, ...) builds a [`Context`] whose
//! carrier is the protocol object and whose propagation function knows how
//! to write to or read from it. Handlers then propagate data without knowing
//! the carrier type:
//!
//! ```
//! use sightline::transport::{sender_context, Kind};
//!
//! let mut ctx = sender_context(Kind::Client, Vec::<(String, String)>::new(), |req, key, value| {
//!     req.push((key.to_string(), value.to_string()));
//! });
//! assert!(ctx.inject("traceparent", "00-abc-def-01"));
//! assert_eq!(ctx.carrier::<Vec<(String, String)>>().unwrap().len(), 1);
//! ```

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::context::Context;

/// Role of the instrumented side of a remote call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Client,
    Server,
    Producer,
    Consumer,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Client => "client",
            Kind::Server => "server",
            Kind::Producer => "producer",
            Kind::Consumer => "consumer",
        };
        f.write_str(s)
    }
}

type ErasedSetter = dyn Fn(&mut (dyn Any + Send + Sync), &str, &str) + Send + Sync;
type ErasedGetter = dyn Fn(&(dyn Any + Send + Sync), &str) -> Option<String> + Send + Sync;

/// Type-erased access to a context's carrier.
#[derive(Clone)]
pub(crate) enum Propagation {
    Sender(Arc<ErasedSetter>),
    Receiver(Arc<ErasedGetter>),
}

/// Build a context for the sending side of a remote call.
///
/// `setter` injects one key/value pair into the outgoing carrier.
pub fn sender_context<C, F>(kind: Kind, carrier: C, setter: F) -> Context
where
    C: Any + Send + Sync,
    F: Fn(&mut C, &str, &str) + Send + Sync + 'static,
{
    let erased: Arc<ErasedSetter> = Arc::new(
        move |carrier: &mut (dyn Any + Send + Sync), key: &str, value: &str| {
            if let Some(carrier) = carrier.downcast_mut::<C>() {
                setter(carrier, key, value);
            }
        },
    );

    let mut ctx = Context::new();
    ctx.set_carrier(carrier);
    ctx.set_propagation(kind, Propagation::Sender(erased));
    ctx
}

/// Build a context for the receiving side of a remote call.
///
/// `getter` reads one propagated value from the incoming carrier.
pub fn receiver_context<C, F>(kind: Kind, carrier: C, getter: F) -> Context
where
    C: Any + Send + Sync,
    F: Fn(&C, &str) -> Option<String> + Send + Sync + 'static,
{
    let erased: Arc<ErasedGetter> = Arc::new(
        move |carrier: &(dyn Any + Send + Sync), key: &str| -> Option<String> {
            carrier
                .downcast_ref::<C>()
                .and_then(|carrier| getter(carrier, key))
        },
    );

    let mut ctx = Context::new();
    ctx.set_carrier(carrier);
    ctx.set_propagation(kind, Propagation::Receiver(erased));
    ctx
}
