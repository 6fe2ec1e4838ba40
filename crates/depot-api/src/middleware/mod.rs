//! Tower layers wrapped around the object routes.

pub mod tracing_layer;
