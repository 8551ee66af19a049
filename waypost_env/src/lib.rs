//! Waypost Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" seam that lets the Waypost engines run
//! against a real clock (tokio) or a virtual one (the simulation harness).
//!
//! # What is intercepted
//!
//! - Time (`now()`, `sleep()`)
//! - Background work (`spawn()`), always paired with a [`CancellationToken`]
//! - Ordered event delivery from external providers ([`EventStream`])
//!
//! # Example
//!
//! ```ignore
//! use waypost_env::{WaypostContext, EventStream};
//!
//! async fn consume<Ctx: WaypostContext, S: EventStream<Event>>(ctx: &Ctx, events: &S) {
//!     while let Some(event) = events.recv().await {
//!         handle(ctx.now(), event);
//!     }
//! }
//! ```

mod cancel;
mod context;
mod error;
mod stream;
mod tokio_impl;
mod types;

pub use cancel::{CancellationSource, CancellationToken};
pub use context::WaypostContext;
pub use error::EnvError;
pub use stream::{event_channel, ChannelStream, EventSink, EventStream};
pub use tokio_impl::TokioContext;
pub use types::AnchorId;
