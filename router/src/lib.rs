pub mod algo;
pub mod batch;
pub mod cost;
pub mod error;
pub mod grid;
pub mod negotiation;
pub mod net;
pub mod router;
pub mod utils;

pub use error::{Result, RouteError};
pub use router::{Router, RoutingReport, RoutingStats};

use pcb_common::db::board::Board;
use pcb_common::util::config::Config;

/// Builds a router for `board` and routes all of its nets.
pub fn route(board: &Board, config: &Config) -> Result<(Router, RoutingReport)> {
    let mut router = Router::from_board(board, config)?;
    let requests = board.requests();
    let report = router.route_batch(&requests, &config.rules, config.input.negotiated)?;
    Ok((router, report))
}
