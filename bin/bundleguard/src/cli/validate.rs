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

use std::{sync::Arc, time::Duration};

use bundleguard_sim::{BundleValidator, Settings, SimulatorImpl};
use bundleguard_types::BundleValidationOptions;
use clap::Args;
use tracing::info;

use super::{
    json::get_local_json_config,
    replay::{ReplayFile, ReplayNode},
    CommonArgs,
};

/// CLI options for the validate command
#[derive(Args, Debug)]
#[command(next_help_heading = "VALIDATE")]
pub struct ValidateCliArgs {
    /// Path to the JSON replay file
    #[arg(long = "replay", name = "replay", env = "REPLAY_FILE")]
    replay: String,

    /// Do not reject the bundle because of write/write conflicts
    #[arg(long = "allow-write-write", name = "allow-write-write")]
    allow_write_write: bool,

    /// Keep the bundle valid when some of its operations violate the rules.
    /// Violating operations are still listed as rejected.
    #[arg(long = "keep-violating-ops", name = "keep-violating-ops")]
    keep_violating_ops: bool,

    /// Skip storage conflict detection between operations
    #[arg(long = "skip-conflict-check", name = "skip-conflict-check")]
    skip_conflict_check: bool,

    /// Deadline for all the simulations of the bundle, in milliseconds
    #[arg(long = "timeout-millis", name = "timeout-millis", env = "VALIDATION_TIMEOUT_MILLIS")]
    timeout_millis: Option<u64>,
}

impl ValidateCliArgs {
    pub fn options(&self) -> BundleValidationOptions {
        BundleValidationOptions {
            reject_on_any_violation: !self.keep_violating_ops,
            reject_on_storage_conflict: !self.skip_conflict_check,
            allow_write_write_conflicts: self.allow_write_write,
            timeout: self.timeout_millis.map(Duration::from_millis),
        }
    }
}

pub async fn run(args: ValidateCliArgs, common: CommonArgs) -> anyhow::Result<()> {
    let settings = Settings::from(&common);
    let replay: ReplayFile = get_local_json_config(&args.replay)?;
    info!(
        "Loaded replay of {} ops at block {}",
        replay.ops.len(),
        replay.block.number
    );

    let requirements = settings.stake_requirements();
    let ops = replay
        .ops
        .into_iter()
        .map(|op| op.into_bundle_op(&requirements))
        .collect();

    let node = Arc::new(ReplayNode::new(
        replay.accounts,
        replay.block_hashes,
        replay.executions,
    ));
    let simulator = SimulatorImpl::new(Arc::clone(&node), node, settings);
    let validator = BundleValidator::new(Arc::new(simulator), replay.entry_point, replay.block);

    let result = validator.validate_bundle(ops, args.options()).await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
