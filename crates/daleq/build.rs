use std::fs;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_complete::Shell;

// The CLI definitions only need clap and clap_complete, both of which are
// build-dependencies, so the module can be compiled here on its own.
#[path = "src/cli.rs"]
mod cli;

const SHELLS: [Shell; 4] = [Shell::Bash, Shell::Zsh, Shell::Fish, Shell::PowerShell];

fn main() {
    println!("cargo::rerun-if-changed=src/cli.rs");

    let out_dir: PathBuf = std::env::var_os("OUT_DIR")
        .expect("OUT_DIR is set by cargo")
        .into();

    let mut cmd = cli::Cli::command();

    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir).expect("create man directory");
    write_manpages(&cmd, "", &man_dir);

    let completion_dir = out_dir.join("completions");
    fs::create_dir_all(&completion_dir).expect("create completions directory");
    for shell in SHELLS {
        clap_complete::generate_to(shell, &mut cmd, "daleq", &completion_dir)
            .unwrap_or_else(|e| panic!("{shell} completions: {e}"));
    }
}

/// One page per command, `daleq-config-init.1` style for nested ones.
fn write_manpages(cmd: &clap::Command, prefix: &str, dir: &Path) {
    let name = if prefix.is_empty() {
        cmd.get_name().to_owned()
    } else {
        format!("{prefix}-{}", cmd.get_name())
    };

    let mut page = Vec::new();
    clap_mangen::Man::new(cmd.clone().name(name.clone()))
        .render(&mut page)
        .unwrap_or_else(|e| panic!("render {name}.1: {e}"));
    let path = dir.join(format!("{name}.1"));
    fs::write(&path, page).unwrap_or_else(|e| panic!("write {}: {e}", path.display()));

    for sub in cmd.get_subcommands().filter(|sub| !sub.is_hide_set()) {
        write_manpages(sub, &name, dir);
    }
}
