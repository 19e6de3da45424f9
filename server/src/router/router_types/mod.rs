//! Types used by the route search engine.

pub mod edge;
pub mod location;
pub mod node;
pub mod route;
pub mod router;
