use cils_core::catalog::{listing, CatalogListing};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct CatalogReport {
    command: &'static str,
    status: &'static str,
    catalog: CatalogListing,
}

pub fn run() -> CommandResult {
    CommandResult::report(&CatalogReport { command: "catalog", status: "ok", catalog: listing() })
}
