// This file is part of Bundleguard.
//
// Bundleguard is free software: you can redistribute it and/or modify it under the
// terms of the GNU Lesser General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version.
//
// Bundleguard is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.
// See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with Bundleguard.
// If not, see https://www.gnu.org/licenses/.

#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]
//! ERC-7562 validation of ERC-4337 user operations and bundles.
//!
//! Includes:
//!
//! - Tracking of storage slots associated with a sender
//! - The ERC-7562 rule table and the interceptor applying it to execution events
//! - Validation simulation against an external EVM
//! - Storage conflict detection and validation of whole bundles
//!
//! ## Feature Flags
//!
//! - `test-utils`: Export mocks and utilities for testing.

mod associated;
pub use associated::{AssociatedStorageCalculator, KeccakPreimage};

mod bundle;
pub use bundle::BundleValidator;

mod conflict;
pub use conflict::BundleStorageConflictDetector;

mod context;
pub use context::ValidationContext;

mod executor;
#[cfg(feature = "test-utils")]
pub use executor::{MockEvmExecutor, MockNodeDataService};
pub use executor::{
    BlockContext, CallKind, EvmExecutor, ExecutionOutcome, ExecutionRequest, InnerCall,
    NodeDataService, TraceStep,
};

pub mod rules;
pub use rules::RuleEnforcer;

mod simulator;
#[cfg(feature = "test-utils")]
pub use simulator::MockSimulator;
pub use simulator::{
    Settings, SimulationOutput, Simulator, SimulatorImpl, VALIDATE_PAYMASTER_USER_OP_SELECTOR,
    VALIDATE_USER_OP_SELECTOR,
};

mod tracer;
pub use tracer::TracingInterceptor;
