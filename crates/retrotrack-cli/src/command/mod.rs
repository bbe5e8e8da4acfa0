use clap::{Parser, Subcommand};

use self::{
    merge::MergeArg, record::RecordArg, report::ReportArg, simulate::SimulateArg,
    status::StatusArg,
};

mod merge;
mod record;
mod report;
mod simulate;
mod status;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Show what the ledger says about earlier sessions
    Status(#[clap(flatten)] StatusArg),
    /// Merge sample tables into one time-ordered series
    Merge(#[clap(flatten)] MergeArg),
    /// Summarize score series as JSON
    Report(#[clap(flatten)] ReportArg),
    /// Record one session from step metadata read as JSON lines on stdin
    Record(#[clap(flatten)] RecordArg),
    /// Run a synthetic trainer with parallel workers through a full session
    Simulate(#[clap(flatten)] SimulateArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::Status(arg) => status::run(&arg)?,
        Mode::Merge(arg) => merge::run(&arg)?,
        Mode::Report(arg) => report::run(&arg)?,
        Mode::Record(arg) => record::run(&arg)?,
        Mode::Simulate(arg) => simulate::run(&arg)?,
    }
    Ok(())
}
