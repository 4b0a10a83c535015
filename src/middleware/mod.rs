//! Request-scoped extractors and middleware.

pub mod client_addr;
