// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

fn build_cli() -> Command {
    Command::new("sysman")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Sysman Contributors")
        .about("Pipeline-driven system updates with log-based rollback")
        .subcommand_required(false)
        .arg(
            Arg::new("config_dir")
                .long("config-dir")
                .value_name("DIR")
                .global(true)
                .help("Configuration directory (default: ~/.config/sysman)"),
        )
        .subcommand(
            Command::new("update")
                .about("Run, roll back or configure system updates")
                .subcommand_required(true)
                .subcommand(Command::new("generate").about("Write a stub update pipeline"))
                .subcommand(Command::new("edit").about("Open the update pipeline in $EDITOR"))
                .subcommand(Command::new("run").about("Mark a checkpoint and run the update pipeline"))
                .subcommand(
                    Command::new("rollback")
                        .about("Undo every package change since the last checkpoint")
                        .arg(
                            Arg::new("yes")
                                .short('y')
                                .long("yes")
                                .action(ArgAction::SetTrue)
                                .help("Do not ask for confirmation"),
                        ),
                )
                .subcommand(Command::new("plan").about("Show what a rollback would do without running it")),
        )
        .subcommand(
            Command::new("package")
                .about("Keep the declared package list and the system in sync")
                .subcommand_required(true)
                .subcommand(Command::new("sync").about("Reconcile the package list with installed packages"))
                .subcommand(Command::new("edit").about("Open the package list in $EDITOR")),
        )
        .subcommand(
            Command::new("service")
                .about("Keep systemd services in line with the declared service list")
                .subcommand_required(true)
                .subcommand(Command::new("generate").about("Write a stub service list"))
                .subcommand(Command::new("sync").about("Enable declared services and retire dropped ones"))
                .subcommand(Command::new("edit").about("Open the service list in $EDITOR"))
                .subcommand(
                    Command::new("reinstall")
                        .about("Reinstall and re-enable one service")
                        .arg(
                            Arg::new("name")
                                .required(true)
                                .help("Service name as written in the service list"),
                        ),
                ),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap());
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("Failed to create man directory");

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    man.render(&mut buffer).expect("Failed to render man page");

    let man_path = man_dir.join("sysman.1");
    fs::write(&man_path, buffer).expect("Failed to write man page");

    println!("cargo:warning=Man page generated at {}", man_path.display());
}
