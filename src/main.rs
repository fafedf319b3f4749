// src/main.rs

use anyhow::Result;
use clap::{CommandFactory, Parser};

mod cli;
mod commands;

use cli::{Cli, Commands, HostToolsCommands, SeedCommands, SysrootCommands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Plan { config, output }) => {
            commands::cmd_plan(config.as_deref(), output.as_deref())
        }
        Some(Commands::Evaluate {
            config,
            graph,
            target,
            json,
        }) => commands::cmd_evaluate(config.as_deref(), graph.as_deref(), &target, json),
        Some(Commands::Verify { config }) => commands::cmd_verify(config.as_deref()),
        Some(Commands::Status { config }) => commands::cmd_status(config.as_deref()),

        Some(Commands::Seed(cmd)) => match cmd {
            SeedCommands::Show { archive } => commands::cmd_seed_show(&archive),
            SeedCommands::Unpack {
                archive,
                output,
                no_verify,
            } => commands::cmd_seed_unpack(&archive, &output, no_verify),
            SeedCommands::Pack {
                dir,
                output,
                config,
                host_tools,
            } => commands::cmd_seed_pack(&dir, &output, config.as_deref(), host_tools.as_deref()),
            SeedCommands::Verify { archive } => commands::cmd_seed_verify(&archive),
        },

        Some(Commands::HostTools(HostToolsCommands::Merge {
            prefixes,
            output,
            strict,
            config,
        })) => commands::cmd_host_tools_merge(&prefixes, &output, strict, config.as_deref()),

        Some(Commands::Sysroot(SysrootCommands::Merge {
            base,
            overlays,
            output,
        })) => commands::cmd_sysroot_merge(&base, &overlays, &output),

        Some(Commands::Audit {
            path,
            config,
            target,
            glibc,
            allow,
            compare,
        }) => commands::cmd_audit(
            path.as_deref(),
            config.as_deref(),
            target.as_deref(),
            glibc.as_deref(),
            &allow,
            compare.as_deref(),
        ),

        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}
