pub mod handlers;
pub mod indexers;
pub mod middleware;
pub mod pipeline;
pub mod routes;
pub mod tasks;

pub use routes::create_router;
