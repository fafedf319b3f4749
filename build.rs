// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: bootstrap configuration file
fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("PATH")
        .help("Bootstrap configuration file")
}

fn output_arg() -> Arg {
    Arg::new("output")
        .short('o')
        .long("output")
        .value_name("PATH")
        .help("Output path")
}

fn build_cli() -> Command {
    Command::new("kindling")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Staged toolchain bootstrap with configuration transitions")
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .subcommand(
            Command::new("plan")
                .about("Generate the bootstrap graph and print it as TOML")
                .arg(config_arg())
                .arg(output_arg()),
        )
        .subcommand(
            Command::new("evaluate")
                .about("Evaluate a graph in the default context")
                .arg(config_arg())
                .arg(Arg::new("graph").short('g').long("graph").help("Graph file"))
                .arg(
                    Arg::new("target")
                        .short('t')
                        .long("target")
                        .default_value("//:stage3")
                        .help("Target to evaluate"),
                )
                .arg(Arg::new("json").long("json").action(ArgAction::SetTrue)),
        )
        .subcommand(
            Command::new("verify")
                .about("Check isolation, deduplication, hermeticity and provenance")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("status")
                .about("Show which bootstrap stages have complete outputs")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("seed")
                .about("Seed archive handling")
                .subcommand(Command::new("show").arg(Arg::new("archive").required(true)))
                .subcommand(
                    Command::new("unpack")
                        .arg(Arg::new("archive").required(true))
                        .arg(output_arg().required(true))
                        .arg(Arg::new("no-verify").long("no-verify").action(ArgAction::SetTrue)),
                )
                .subcommand(
                    Command::new("pack")
                        .arg(Arg::new("dir").required(true))
                        .arg(output_arg().required(true))
                        .arg(config_arg())
                        .arg(Arg::new("host-tools").long("host-tools")),
                )
                .subcommand(Command::new("verify").arg(Arg::new("archive").required(true))),
        )
        .subcommand(
            Command::new("host-tools").about("Host tools aggregation").subcommand(
                Command::new("merge")
                    .arg(Arg::new("prefixes").num_args(1..).required(true))
                    .arg(output_arg().required(true))
                    .arg(Arg::new("strict").long("strict").action(ArgAction::SetTrue))
                    .arg(config_arg()),
            ),
        )
        .subcommand(
            Command::new("sysroot").about("Sysroot layering").subcommand(
                Command::new("merge")
                    .arg(Arg::new("base").required(true))
                    .arg(Arg::new("overlays").num_args(0..))
                    .arg(output_arg().required(true)),
            ),
        )
        .subcommand(
            Command::new("audit")
                .about("Audit ELF binaries for architecture, glibc, RPATH and NEEDED leaks")
                .arg(Arg::new("path"))
                .arg(config_arg())
                .arg(Arg::new("target").short('t').long("target"))
                .arg(Arg::new("glibc").long("glibc"))
                .arg(Arg::new("allow").long("allow").action(ArgAction::Append))
                .arg(Arg::new("compare").long("compare").num_args(2)),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("kindling.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
