mod config;
mod digest;
mod email;
mod error;
mod limiter;
mod pipeline;
mod prompt;
mod scheduler;

use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{DigestConfig, MailboxProvider};
use digest::mailer::DigestMailer;
use digest::report::Period;
use email::gmail::GmailTransport;
use email::imap::ImapTransport;
use email::source::{MessageSource, Transport};
use limiter::PromptLimiter;
use pipeline::DigestPipeline;
use prompt::summarizer::Summarizer;
use scheduler::{RunScheduler, RunTrigger};

#[derive(Parser)]
#[command(name = "maildigest", about = "Scheduled AI email digest")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a single digest run for the given period and exit.
    Run {
        #[arg(long, value_enum)]
        period: PeriodArg,
    },
    /// Wait for the morning/evening triggers and run indefinitely (default).
    Schedule,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PeriodArg {
    Morning,
    Evening,
}

impl From<PeriodArg> for Period {
    fn from(arg: PeriodArg) -> Self {
        match arg {
            PeriodArg::Morning => Period::Morning,
            PeriodArg::Evening => Period::Evening,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::Layer::default())
        .init();

    // Anything wrong here is fatal: exit non-zero before any run starts.
    let cfg = DigestConfig::load()?;
    let pipeline = build_pipeline(&cfg)?;

    match cli.command.unwrap_or(Command::Schedule) {
        Command::Run { period } => {
            let period = Period::from(period);
            let cutoff_hours = match period {
                Period::Morning => cfg.schedule.morning_cutoff_hours,
                Period::Evening => cfg.schedule.evening_cutoff_hours,
            };
            // A reported run failure still exits 0: the run completed
            // and the failure was surfaced in the logs.
            match pipeline.run(period, cutoff_hours).await {
                Ok(outcome) => {
                    tracing::info!(%period, ?outcome, "One-shot run finished");
                }
                Err(e) => {
                    tracing::error!(%period, stage = e.stage(), "One-shot run failed: {e}");
                }
            }
        }
        Command::Schedule => {
            let tz = cfg.schedule.timezone()?;
            let triggers = vec![
                RunTrigger {
                    period: Period::Morning,
                    fire_at: cfg.schedule.morning_fire_at()?,
                    cutoff_hours: cfg.schedule.morning_cutoff_hours,
                },
                RunTrigger {
                    period: Period::Evening,
                    fire_at: cfg.schedule.evening_fire_at()?,
                    cutoff_hours: cfg.schedule.evening_cutoff_hours,
                },
            ];
            let scheduler = RunScheduler::new(triggers, tz);
            tracing::info!(timezone = %tz, "Starting digest scheduler");
            scheduler.run_forever(&pipeline).await;
        }
    }

    Ok(())
}

fn build_pipeline(cfg: &DigestConfig) -> anyhow::Result<DigestPipeline> {
    let http_client = reqwest::ClientBuilder::new()
        .use_rustls_tls()
        .timeout(Duration::from_secs(cfg.limits.request_timeout_secs))
        .build()
        .context("Could not build HTTP client")?;

    let transport = match cfg.mailbox.provider {
        MailboxProvider::Gmail => {
            let token = cfg
                .mailbox
                .gmail_access_token
                .clone()
                .context("gmail_access_token missing")?;
            Transport::Gmail(GmailTransport::new(http_client.clone(), token))
        }
        MailboxProvider::Imap => Transport::Imap(ImapTransport::new(
            cfg.mailbox.imap_host.clone().context("imap_host missing")?,
            cfg.mailbox.imap_port,
            cfg.mailbox.imap_user.clone().context("imap_user missing")?,
            cfg.mailbox
                .imap_password
                .clone()
                .context("imap_password missing")?,
        )),
    };
    let source = MessageSource::new(
        transport,
        cfg.limits.max_emails_per_digest,
        cfg.limits.fetch_attempts,
    );

    let summarizer = Summarizer::new(
        http_client,
        &cfg.api,
        &cfg.limits,
        PromptLimiter::new(cfg.limits.prompts_per_sec),
    );

    let mailer = DigestMailer::new(
        &cfg.smtp,
        &cfg.delivery.recipient_list(),
        cfg.delivery.send_empty_digest,
        cfg.schedule.timezone()?,
    )?;

    Ok(DigestPipeline::new(
        source,
        summarizer,
        mailer,
        Duration::from_secs(cfg.limits.run_timeout_secs),
    ))
}
