/*! Integration tests for Archetype.
 *
 * This test suite is organized as a single integration test binary
 * following the pattern described by matklad in
 * https://matklad.github.io/2021/02/27/delete-cargo-integration-tests.html
 *
 * Modules:
 * - overrides: Base/New flags on members, propagation of base edits, resets
 * - collections: item identifiers, tombstones and collisions in sequences and dictionaries
 * - references: reference policies and reference targets across derivation
 * - reconcile: re-aligning derived assets with bases that changed independently
 * - serialization: the text encoding of graphs, round trips and decoding errors
 * - hierarchy: composite part trees and per-part instancing
 */

use tracing_subscriber::EnvFilter;

#[ctor::ctor]
fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("archetype=info".parse().unwrap()),
        )
        .with_test_writer()
        .try_init();
}

mod collections;
mod helpers;
mod hierarchy;
mod overrides;
mod reconcile;
mod references;
mod serialization;
