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

use bundleguard_sim::Settings;
use clap::{Args, Parser, Subcommand};
use ethers::types::U256;

mod json;
mod replay;
mod tracing;
mod validate;

use validate::ValidateCliArgs;

/// Main entry point for the CLI
///
/// Parses the CLI arguments and runs the appropriate subcommand.
pub async fn run() -> anyhow::Result<()> {
    let opt = Cli::parse();
    let _guard = tracing::configure_logging(&opt.logs)?;
    tracing::info!("Parsed CLI options: {:#?}", opt);

    match opt.command {
        Command::Validate(args) => validate::run(args, opt.common).await?,
    }

    Ok(())
}

/// CLI commands
#[derive(Debug, Subcommand)]
enum Command {
    /// Validate a recorded bundle
    ///
    /// Replays the recorded validation traces of every operation of a bundle
    /// through the ERC-7562 rules, checks the storage dependencies between the
    /// operations and prints the result as JSON.
    #[command(name = "validate")]
    Validate(ValidateCliArgs),
}

/// CLI common options
#[derive(Debug, Args)]
#[command(next_help_heading = "Common")]
pub struct CommonArgs {
    #[arg(
        long = "min_stake_value",
        name = "min_stake_value",
        env = "MIN_STAKE_VALUE",
        default_value = "1000000000000000000",
        global = true
    )]
    min_stake_value: u128,

    #[arg(
        long = "min_unstake_delay",
        name = "min_unstake_delay",
        env = "MIN_UNSTAKE_DELAY",
        default_value = "86400",
        global = true
    )]
    min_unstake_delay: u64,

    /// Gas limit of each simulated validation call
    #[arg(
        long = "validation_gas_limit",
        name = "validation_gas_limit",
        env = "VALIDATION_GAS_LIMIT",
        default_value = "10000000",
        global = true
    )]
    validation_gas_limit: u64,

    /// Number of mapping base slots in which the sender's entry is associated
    /// with the sender
    #[arg(
        long = "associated_base_slots",
        name = "associated_base_slots",
        env = "ASSOCIATED_BASE_SLOTS",
        default_value = "10",
        global = true
    )]
    associated_base_slots: u64,

    /// Allow calls to the RIP-7212 secp256r1 precompile
    #[arg(
        long = "allow_rip7212",
        name = "allow_rip7212",
        env = "ALLOW_RIP7212",
        global = true
    )]
    allow_rip7212: bool,
}

impl From<&CommonArgs> for Settings {
    fn from(value: &CommonArgs) -> Self {
        Settings::new(
            value.associated_base_slots,
            value.allow_rip7212,
            value.validation_gas_limit,
            U256::from(value.min_stake_value),
            value.min_unstake_delay,
        )
    }
}

/// CLI options for logging
#[derive(Debug, Args)]
#[command(next_help_heading = "Logging")]
pub struct LogsArgs {
    /// Log file
    ///
    /// If not provided, logs will be written to stderr
    #[arg(
        long = "log.file",
        name = "log.file",
        env = "LOG_FILE",
        default_value = None,
        global = true
    )]
    file: Option<String>,

    /// Log JSON
    ///
    /// If set, logs will be written in JSON format
    #[arg(
        long = "log.json",
        name = "log.json",
        env = "LOG_JSON",
        required = false,
        num_args = 0,
        global = true
    )]
    json: bool,
}

/// CLI options
#[derive(Debug, Parser)]
#[command(name = "bundleguard", version, about)]
pub struct Cli {
    #[clap(subcommand)]
    command: Command,

    #[clap(flatten)]
    common: CommonArgs,

    #[clap(flatten)]
    logs: LogsArgs,
}
