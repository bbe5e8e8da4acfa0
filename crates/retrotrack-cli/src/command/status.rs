use std::path::PathBuf;

use retrotrack_telemetry::{SessionLedger, ledger::TIMESTAMP_FORMAT, reconcile};

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct StatusArg {
    /// Ledger file
    #[arg(long, default_value = "trainLog.txt")]
    ledger: PathBuf,
}

pub(crate) fn run(arg: &StatusArg) -> anyhow::Result<()> {
    let ledger = SessionLedger::new(&arg.ledger);
    match reconcile(&ledger) {
        Some(prior) => {
            println!("Campaign start:  {}", prior.prior_start.format(TIMESTAMP_FORMAT));
            println!("Last session end: {}", prior.prior_end.format(TIMESTAMP_FORMAT));
            println!("Sessions:        {}", prior.sessions);
            println!("Training time:   {:.2} minutes", prior.prior_cumulative_minutes);
        }
        None => println!("No prior history in {}", arg.ledger.display()),
    }
    Ok(())
}
