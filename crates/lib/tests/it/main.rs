/*! Integration tests for Folio.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * The module structure mirrors the main library structure:
 * - patch: diff/apply behaviour on realistic document trees
 * - history: coalescing, spacing, snapshot sizing and replay
 * - revision: the version-checked write path, locking and restore
 * - scheduler: edit sessions driven on paused tokio time
 * - backend: the storage contract and in-memory persistence
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("folio=info".parse().unwrap()))
        .with_test_writer()
        .try_init();
}

mod backend;
mod helpers;
mod history;
mod patch;
mod revision;
mod scheduler;
