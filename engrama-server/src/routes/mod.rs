//! HTTP routers
//!
//! Handlers validate inputs, resolve the request scope once, call the
//! engine or the channel manager, and shape responses. Business rules
//! live below; admission rules live in the middleware.

pub mod channels;
pub mod memories;
