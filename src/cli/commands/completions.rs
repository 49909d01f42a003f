//! Shell completion generation.

use clap::CommandFactory;
use clap_complete::Shell as ClapShell;

use crate::cli::args::{Cli, CompletionsArgs, Shell};

/// Generate and print a shell completion script to stdout.
pub fn run(args: &CompletionsArgs) {
    let mut cmd = Cli::command();
    clap_complete::generate(to_clap(args.shell), &mut cmd, "specimen", &mut std::io::stdout());
}

const fn to_clap(shell: Shell) -> ClapShell {
    match shell {
        Shell::Bash => ClapShell::Bash,
        Shell::Zsh => ClapShell::Zsh,
        Shell::Fish => ClapShell::Fish,
        Shell::PowerShell => ClapShell::PowerShell,
        Shell::Elvish => ClapShell::Elvish,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bash_script_names_subcommands() {
        let mut buf = Vec::new();
        clap_complete::generate(to_clap(Shell::Bash), &mut Cli::command(), "specimen", &mut buf);
        let script = String::from_utf8(buf).unwrap();
        assert!(script.contains("specimen"));
        assert!(script.contains("timeline"));
    }
}
