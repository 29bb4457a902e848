use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for prism")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run all checks: fmt, clippy, tests, shader compile, deny, doc
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates
    Clippy,
    /// Run all tests
    Test,
    /// Compose every built-in shader through the CLI
    Shaders,
    /// Run the geometry batch benchmark
    Bench,
    /// Run cargo deny check
    Deny,
    /// Build rustdoc for the workspace
    Doc,
    /// Build the entire workspace
    Build,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Fmt,
    Clippy,
    Test,
    Shaders,
    Bench,
    Deny,
    Doc,
    Build,
}

impl Step {
    const CHECK: [Step; 6] = [Step::Fmt, Step::Clippy, Step::Test, Step::Shaders, Step::Deny, Step::Doc];

    fn name(self) -> &'static str {
        match self {
            Step::Fmt => "cargo fmt --check",
            Step::Clippy => "cargo clippy",
            Step::Test => "cargo test",
            Step::Shaders => "shader composition",
            Step::Bench => "batch benchmark",
            Step::Deny => "cargo deny check (licenses bans sources)",
            Step::Doc => "cargo doc",
            Step::Build => "cargo build",
        }
    }

    fn args(self) -> &'static [&'static str] {
        match self {
            Step::Fmt => &["fmt", "--all", "--", "--check"],
            Step::Clippy => &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"],
            Step::Test => &["test", "--workspace"],
            Step::Shaders => &["run", "-q", "-p", "prism-cli", "--", "shaders"],
            Step::Bench => &["bench", "-p", "prism-assets"],
            Step::Deny => &["deny", "check", "licenses", "bans", "sources"],
            Step::Doc => &["doc", "--workspace", "--no-deps"],
            Step::Build => &["build", "--workspace"],
        }
    }

    fn run(self) -> Result<()> {
        println!("==> Running {}", self.name());
        let status = Command::new("cargo").args(self.args()).status()?;
        if !status.success() {
            anyhow::bail!("{} failed", self.name());
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            for step in Step::CHECK {
                step.run()?;
            }
        }
        Commands::Fmt => Step::Fmt.run()?,
        Commands::Clippy => Step::Clippy.run()?,
        Commands::Test => Step::Test.run()?,
        Commands::Shaders => Step::Shaders.run()?,
        Commands::Bench => Step::Bench.run()?,
        Commands::Deny => Step::Deny.run()?,
        Commands::Doc => Step::Doc.run()?,
        Commands::Build => Step::Build.run()?,
    }

    Ok(())
}
