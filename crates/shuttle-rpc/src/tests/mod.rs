//! Crate-level tests driving the client over in-memory pipes.

mod support;
