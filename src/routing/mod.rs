//! Daily routing: the resolver and its REST surface.

pub mod resolver;
pub mod routes;

pub use resolver::{Identity, Resolver, RouteDecision, RouteReason};
