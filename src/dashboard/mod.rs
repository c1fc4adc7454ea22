//! REST surface for the board.
//!
//! JSON endpoints under `/api`, served by axum alongside the reconciliation
//! scheduler when running `serve`.

mod routes;
mod server;

pub use routes::build_router;
pub use server::{BoundServer, DashboardHandle, DashboardServer, start_server, start_server_with_retry};
