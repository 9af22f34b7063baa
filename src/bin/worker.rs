//! Background worker process (spec §5/§6). Runs the campaign scheduler,
//! warmup engine, and health monitor on their configured cadences, and
//! drains the job queue concurrently on a tight poll loop. A single
//! process handles all three job types; spec §5 allows many worker
//! processes sharing one `jobs` table via `SELECT ... FOR UPDATE SKIP
//! LOCKED`, so this binary can be scaled horizontally without change.

use dotenvy::dotenv;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use outreachiq::config::Config;
use outreachiq::db;
use outreachiq::services::ab_shift;
use outreachiq::services::bounce_processor::process_bounce;
use outreachiq::services::campaign_scheduler::CampaignScheduler;
use outreachiq::services::email_sender::send_email;
use outreachiq::services::health_monitor;
use outreachiq::services::job_queue::{Job, JobQueue, JobType};
use outreachiq::services::warmup_service::WarmupService;

const JOB_POLL_INTERVAL: Duration = Duration::from_secs(5);
const JOB_BATCH_SIZE: i64 = 20;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Arc::new(Config::from_env());
    let pool = Arc::new(db::connect_and_migrate(&config.database_url).await?);
    let queue = Arc::new(JobQueue::new(pool.clone()));

    info!("outreachiq worker starting");

    let scheduler = Arc::new(CampaignScheduler::new(pool.clone(), queue.clone(), config.clone()));
    let warmup = Arc::new(WarmupService::new(pool.clone(), queue.clone()));

    tokio::spawn({
        let scheduler = scheduler.clone();
        let period = config.scheduler_tick_secs;
        async move { tick_forever("campaign scheduler", period, || scheduler.tick()).await }
    });

    tokio::spawn({
        let warmup = warmup.clone();
        let period = config.warmup_tick_secs;
        async move { tick_forever("warmup engine", period, || warmup.tick()).await }
    });

    tokio::spawn({
        let warmup = warmup.clone();
        let period = config.daily_reset_tick_secs;
        async move { tick_forever("warmup daily reset", period, || warmup.daily_reset()).await }
    });

    tokio::spawn({
        let pool = pool.clone();
        let config = config.clone();
        let period = config.health_check_tick_secs;
        async move { tick_forever("health monitor", period, || health_monitor::tick(&pool, &config)).await }
    });

    tokio::spawn({
        let pool = pool.clone();
        let period = config.ab_shift_tick_secs;
        async move { tick_forever("ab traffic shift", period, || ab_shift::tick(&pool)).await }
    });

    run_job_loop(pool, queue, config, warmup).await;
    Ok(())
}

/// Runs `work` on a fixed cadence forever, logging (never panicking on)
/// errors — the same per-tick error isolation the scheduler and warmup
/// engine apply internally, one level up.
async fn tick_forever<F, Fut>(name: &'static str, period_secs: u64, work: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<(), outreachiq::error::CoreError>>,
{
    let mut ticker = interval(Duration::from_secs(period_secs.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = work().await {
            error!(component = name, error = %e, "tick failed");
        } else {
            info!(component = name, "tick complete");
        }
    }
}

/// Drains the job queue: claim a batch, dispatch each by `JobType`, mark
/// completed/failed. Runs on the main task for the lifetime of the
/// process.
async fn run_job_loop(pool: Arc<sqlx::PgPool>, queue: Arc<JobQueue>, config: Arc<Config>, warmup: Arc<WarmupService>) {
    let mut ticker = interval(JOB_POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match queue.claim_due_jobs(JOB_BATCH_SIZE).await {
            Ok(jobs) if !jobs.is_empty() => {
                info!(count = jobs.len(), "claimed jobs");
                for job in jobs {
                    dispatch(&pool, &queue, &config, &warmup, job).await;
                }
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "failed to claim jobs"),
        }
    }
}

async fn dispatch(pool: &sqlx::PgPool, queue: &JobQueue, config: &Config, warmup: &WarmupService, job: Job) {
    let result = process_one(pool, queue, config, warmup, &job).await;
    match result {
        Ok(()) => {
            if let Err(e) = queue.mark_completed(job.id).await {
                error!(job_id = %job.id, error = %e, "failed to mark job completed");
            }
        }
        Err(e) => {
            error!(job_id = %job.id, job_type = job.job_type.as_str(), error = %e, "job failed");
            if let Err(mark_err) = queue.mark_failed(&job, &e.to_string()).await {
                error!(job_id = %job.id, error = %mark_err, "failed to mark job failed");
            }
        }
    }
}

async fn process_one(
    pool: &sqlx::PgPool,
    queue: &JobQueue,
    config: &Config,
    warmup: &WarmupService,
    job: &Job,
) -> Result<(), outreachiq::error::CoreError> {
    match job.job_type {
        JobType::EmailSend => {
            let payload = serde_json::from_value(job.payload.clone())?;
            send_email(pool, config, payload).await
        }
        JobType::BounceProcess => {
            let payload = serde_json::from_value(job.payload.clone())?;
            process_bounce(pool, queue, config, payload).await
        }
        JobType::WarmupSend => {
            let payload = serde_json::from_value(job.payload.clone())?;
            warmup.execute_send(payload).await
        }
    }
}
