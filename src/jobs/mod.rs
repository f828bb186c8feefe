pub mod backoff;
pub mod handler;
pub mod handlers;
pub mod registry;
pub mod repository;
pub mod sink;
pub mod worker;

pub use backoff::*;
pub use handler::*;
pub use handlers::*;
pub use registry::*;
pub use repository::*;
pub use sink::*;
pub use worker::*;
