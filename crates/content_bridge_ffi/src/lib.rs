//! Flutter-facing bindings for the content bridge core.

pub mod api;
