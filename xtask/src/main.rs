use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::Command;

#[derive(Parser)]
#[command(name = "xtask", about = "Workspace automation for scenecull")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run fmt, clippy, tests and doc
    Check,
    /// Run cargo fmt --check on all crates
    Fmt,
    /// Run clippy on all crates with warnings denied
    Clippy,
    /// Run all tests
    Test,
    /// Run the BVH benchmark
    Bench,
    /// Build rustdoc for the workspace
    Doc,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Check => {
            cargo("fmt", &["fmt", "--all", "--", "--check"])?;
            cargo("clippy", &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])?;
            cargo("test", &["test", "--workspace"])?;
            cargo("doc", &["doc", "--workspace", "--no-deps"])?;
        }
        Commands::Fmt => cargo("fmt", &["fmt", "--all", "--", "--check"])?,
        Commands::Clippy => cargo("clippy", &["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"])?,
        Commands::Test => cargo("test", &["test", "--workspace"])?,
        Commands::Bench => cargo("bench", &["bench", "-p", "scenecull-bvh"])?,
        Commands::Doc => cargo("doc", &["doc", "--workspace", "--no-deps"])?,
    }

    Ok(())
}

fn cargo(step: &str, args: &[&str]) -> Result<()> {
    println!("==> Running cargo {}", args.join(" "));
    let status = Command::new("cargo").args(args).status()?;
    if !status.success() {
        anyhow::bail!("cargo {step} failed");
    }
    Ok(())
}
