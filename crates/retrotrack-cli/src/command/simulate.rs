//! Synthetic stand-in for an external trainer.
//!
//! Each worker plays an endless sequence of games whose score follows a noisy random walk and
//! whose player slowly gets better at staying alive. The point is the telemetry path, not the
//! game: every step goes through a [`SessionRecorder`] exactly as a real trainer's callback
//! would.

use std::thread;

use anyhow::Context;
use rand::{Rng, SeedableRng as _};
use rand_distr::{Distribution as _, Normal};
use rand_pcg::Pcg64Mcg;
use retrotrack_telemetry::{
    Campaign, CsvSampleSink, RecorderConfig, SessionLedger, SessionRecorder, StepHook, StepInfo,
    merge, offset_series, sink::write_series_csv,
};

use crate::{
    command::record::previous_max,
    config::CampaignArgs,
    util::{print_campaign_start, print_campaign_summary},
};

const STARTING_LIVES: u32 = 3;
const REWARD_PROBABILITY: f64 = 0.05;
const INITIAL_DEATH_PROBABILITY: f64 = 0.002;
const MIN_DEATH_PROBABILITY: f64 = 0.0002;

#[derive(Default, Debug, Clone, clap::Args)]
pub(crate) struct SimulateArg {
    #[clap(flatten)]
    campaign: CampaignArgs,
    /// Number of parallel workers (default: from the campaign config)
    #[arg(long)]
    workers: Option<usize>,
    /// Steps per worker
    #[arg(long, default_value_t = 20_000)]
    steps: u64,
    /// Random seed (default: random)
    #[arg(long)]
    seed: Option<u64>,
}

/// A game whose score grows in random increments until the player runs out of lives.
#[derive(Debug)]
struct SyntheticTrainer<R> {
    rng: R,
    reward: Normal<f64>,
    death_probability: f64,
    score: f64,
    lives: u32,
}

impl<R> SyntheticTrainer<R>
where
    R: Rng,
{
    fn new(rng: R) -> anyhow::Result<Self> {
        Ok(Self {
            rng,
            reward: Normal::new(100.0, 30.0).context("Invalid reward distribution")?,
            death_probability: INITIAL_DEATH_PROBABILITY,
            score: 0.0,
            lives: STARTING_LIVES,
        })
    }

    fn step(&mut self) -> StepInfo {
        if self.rng.random_bool(REWARD_PROBABILITY) {
            self.score += self.reward.sample(&mut self.rng).max(0.0).round();
        }
        let mut done = false;
        if self.rng.random_bool(self.death_probability) {
            self.lives -= 1;
            if self.lives == 0 {
                done = true;
            }
        }
        let info = StepInfo {
            score: Some(self.score),
            lives: Some(self.lives),
            done: Some(done),
        };
        if done {
            self.score = 0.0;
            self.lives = STARTING_LIVES;
        }
        self.death_probability = (self.death_probability * 0.9999).max(MIN_DEATH_PROBABILITY);
        info
    }

    /// Runs up to `steps` steps, stopping early if the hook asks to. Returns the steps taken.
    fn train<H>(&mut self, steps: u64, hook: &mut H) -> u64
    where
        H: StepHook,
    {
        for step in 1..=steps {
            let info = self.step();
            if !hook.on_step(&info) {
                return step;
            }
        }
        steps
    }
}

#[derive(Debug)]
struct WorkerOutcome {
    worker: usize,
    steps: u64,
    max_score: Option<f64>,
    dropped_samples: u64,
    sink: CsvSampleSink,
}

pub(crate) fn run(arg: &SimulateArg) -> anyhow::Result<()> {
    let config = arg.campaign.resolve()?;
    let workers = arg.workers.unwrap_or(config.workers).max(1);
    let seed = arg.seed.unwrap_or_else(|| rand::rng().random());

    let campaign = Campaign::begin(SessionLedger::new(&config.ledger));
    print_campaign_start(&campaign);
    eprintln!("  Workers: {workers}, steps per worker: {}, seed: {seed}", arg.steps);

    let session = config.session_for(&campaign, &(0..workers).collect::<Vec<_>>());
    let historical = previous_max(&config, campaign.session_index())?;
    let started = campaign.timer().started();

    let outcomes = thread::scope(|s| {
        let handles = (0..workers)
            .map(|worker| {
                let sink = CsvSampleSink::new(config.sink_path(session, worker));
                let recorder_config = RecorderConfig {
                    log_interval: config.log_interval,
                    worker,
                };
                s.spawn(move || -> anyhow::Result<WorkerOutcome> {
                    let rng = Pcg64Mcg::seed_from_u64(seed.wrapping_add(worker as u64));
                    let mut trainer = SyntheticTrainer::new(rng)?;
                    let mut recorder = SessionRecorder::new(sink, recorder_config)
                        .started_at(started)
                        .with_historical_max(historical);
                    let steps = trainer.train(arg.steps, &mut recorder);
                    Ok(WorkerOutcome {
                        worker,
                        steps,
                        max_score: recorder.max_score(),
                        dropped_samples: recorder.dropped_samples(),
                        sink: recorder.into_sink(),
                    })
                })
            })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| anyhow::anyhow!("worker thread panicked"))?
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })?;

    eprintln!();
    eprintln!("Workers:");
    for outcome in &outcomes {
        eprintln!(
            "  {:2}: {} steps, max score {}, dropped {} => {}",
            outcome.worker,
            outcome.steps,
            outcome
                .max_score
                .map_or_else(|| "-".to_owned(), |m| m.to_string()),
            outcome.dropped_samples,
            outcome.sink.path().display()
        );
    }

    let sinks = outcomes.iter().map(|o| &o.sink);
    let series = merge(sinks).context("Failed to merge worker sample tables")?;
    let series = offset_series(&series, campaign.campaign_offset_minutes());
    let merged_path = config.merged_path(session);
    write_series_csv(&merged_path, &series)
        .with_context(|| format!("Failed to write series: {}", merged_path.display()))?;
    eprintln!(
        "Merged {} samples on the campaign timeline into {}",
        series.len(),
        merged_path.display()
    );

    let ledger_path = campaign.ledger().path().to_owned();
    let summary = campaign
        .finish()
        .with_context(|| format!("Failed to update ledger: {}", ledger_path.display()))?;
    print_campaign_summary(&summary, &ledger_path);

    Ok(())
}
