//! Cron-based job scheduler.
//!
//! Evaluates cron expressions for registered jobs and runs due jobs one at a time.
//! Deferred runs can be requested at any moment through a `JobTrigger`.

use crate::jobs::traits::{JobOutcome, SyncJob};
use crate::models::SyncKind;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use cron::Schedule;
use futures_core::Stream;
use futures_util::StreamExt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Tick interval for the scheduler loop.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(30);
const TRIGGER_QUEUE: usize = 16;

/// Parse a cron expression.
///
/// Classic five-field expressions (`min hour dom month dow`, Sunday = 0 or 7) get a leading
/// seconds field, and their numeric weekdays are shifted to the `cron` crate numbering
/// (Sunday = 1 to Saturday = 7).
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    let invalid =
        |detail: String| Error::InvalidInput(format!("invalid cron expression '{expr}': {detail}"));
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let normalized = if let [minute, hour, dom, month, dow] = fields.as_slice() {
        let dow = classic_day_of_week(dow).map_err(invalid)?;
        format!("0 {minute} {hour} {dom} {month} {dow}")
    } else {
        fields.join(" ")
    };
    Schedule::from_str(&normalized).map_err(|e| invalid(e.to_string()))
}

/// Rewrite a classic day-of-week field. Names and wildcards are left alone.
fn classic_day_of_week(field: &str) -> std::result::Result<String, String> {
    let mut items = Vec::new();
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (item, None),
        };
        let bounds = match range.split_once('-') {
            Some((start, end)) => (classic_weekday(start)?, classic_weekday(end)?),
            None => {
                let day = classic_weekday(range)?;
                (day, day)
            }
        };
        let mapped = match bounds {
            (None, None) => range.to_string(),
            (Some(start), Some(end)) if start == end => shift_weekday(start).to_string(),
            (Some(start), Some(end)) if start > end => {
                return Err(format!("weekday range '{range}' runs backwards"));
            }
            (Some(start), Some(7)) => {
                // Sunday closes the classic range but opens the crate's week.
                if step.is_some() {
                    return Err(format!("stepped weekday range '{item}' ends on Sunday"));
                }
                items.push(match start {
                    0 => "1-7".to_string(),
                    start => format!("{}-7,1", start + 1),
                });
                continue;
            }
            (Some(start), Some(end)) => format!("{}-{}", start + 1, end + 1),
            _ => return Err(format!("weekday range '{range}' mixes names and numbers")),
        };
        items.push(match step {
            Some(step) => format!("{mapped}/{step}"),
            None => mapped,
        });
    }
    Ok(items.join(","))
}

/// `Some(n)` for a classic numeric weekday, `None` for names and wildcards.
fn classic_weekday(token: &str) -> std::result::Result<Option<u32>, String> {
    if !token.chars().all(|c| c.is_ascii_digit()) || token.is_empty() {
        return Ok(None);
    }
    match token.parse::<u32>() {
        Ok(day) if day <= 7 => Ok(Some(day)),
        _ => Err(format!("weekday '{token}' is out of range 0-7")),
    }
}

fn shift_weekday(day: u32) -> u32 {
    match day {
        0 | 7 => 1,
        n => n + 1,
    }
}

struct ScheduledJob {
    job: Arc<dyn SyncJob>,
    schedule: Schedule,
    next_run: Option<DateTime<Utc>>,
}

/// Requests deferred job runs.
#[derive(Clone)]
pub struct JobTrigger {
    tx: mpsc::Sender<SyncKind>,
}

impl JobTrigger {
    /// Queue a run of every job of `kind`. Fails when the scheduler is gone or the queue
    /// is full.
    pub fn request(&self, kind: SyncKind) -> Result<()> {
        self.tx.try_send(kind).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                Error::BackendMessage(format!("{kind} run already queued too many times"))
            }
            mpsc::error::TrySendError::Closed(_) => {
                Error::BackendMessage("job scheduler is not running".to_string())
            }
        })
    }

    /// Request a run of `kind` for every item `requests` yields, until it ends or the
    /// scheduler stops.
    pub async fn forward<S>(&self, requests: S, kind: SyncKind)
    where
        S: Stream<Item = ()>,
    {
        futures_util::pin_mut!(requests);
        while requests.next().await.is_some() {
            match self.request(kind) {
                Ok(()) => tracing::info!(%kind, "deferred run requested"),
                Err(e) if self.tx.is_closed() => {
                    tracing::debug!(%kind, error = %e, "stopping deferred run forwarding");
                    break;
                }
                Err(e) => tracing::warn!(%kind, error = %e, "deferred run request dropped"),
            }
        }
    }
}

pub struct JobScheduler {
    jobs: Vec<ScheduledJob>,
    tick_interval: Duration,
    trigger_tx: mpsc::Sender<SyncKind>,
    trigger_rx: mpsc::Receiver<SyncKind>,
}

impl JobScheduler {
    pub fn new(tick_interval: Duration) -> Result<Self> {
        if tick_interval.is_zero() {
            return Err(Error::InvalidInput("tick_interval must be > 0".to_string()));
        }
        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE);
        Ok(Self {
            jobs: Vec::new(),
            tick_interval,
            trigger_tx,
            trigger_rx,
        })
    }

    /// Register `job` to run on `cron_expr`, first after `now`.
    pub fn register(
        &mut self,
        job: Arc<dyn SyncJob>,
        cron_expr: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let schedule = parse_cron(cron_expr)?;
        let next_run = schedule.after(&now).next();
        tracing::info!(job = job.name(), cron = cron_expr, next_run = ?next_run, "job registered");
        self.jobs.push(ScheduledJob {
            job,
            schedule,
            next_run,
        });
        Ok(())
    }

    pub fn trigger(&self) -> JobTrigger {
        JobTrigger {
            tx: self.trigger_tx.clone(),
        }
    }

    /// Run every job whose next occurrence is at or before `now`, then reschedule it.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Vec<(SyncKind, JobOutcome)> {
        let mut outcomes = Vec::new();
        for scheduled in self.jobs.iter_mut() {
            let Some(next_run) = scheduled.next_run else {
                continue;
            };
            if next_run > now {
                continue;
            }
            tracing::info!(job = scheduled.job.name(), "job is due");
            let outcome = scheduled.job.execute().await;
            outcomes.push((scheduled.job.kind(), outcome));
            scheduled.next_run = scheduled.schedule.after(&now).next();
        }
        outcomes
    }

    /// Run every registered job of `kind` right away.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn run_now(&self, kind: SyncKind) -> Vec<JobOutcome> {
        let mut outcomes = Vec::new();
        for scheduled in self.jobs.iter().filter(|j| j.job.kind() == kind) {
            tracing::info!(job = scheduled.job.name(), "deferred run");
            outcomes.push(scheduled.job.execute().await);
        }
        if outcomes.is_empty() {
            tracing::warn!(%kind, "deferred run requested for unregistered job");
        }
        outcomes
    }

    /// Run the scheduler loop until `shutdown` resolves. Jobs never overlap.
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tracing::info!(jobs = self.jobs.len(), "job scheduler started");
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.tick_interval);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
                Some(kind) = self.trigger_rx.recv() => {
                    self.run_now(kind).await;
                }
            }
        }
        tracing::info!("job scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Datelike, TimeZone, Weekday};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingJob {
        kind: SyncKind,
        runs: AtomicUsize,
    }

    impl CountingJob {
        fn new(kind: SyncKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                runs: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SyncJob for CountingJob {
        fn kind(&self) -> SyncKind {
            self.kind
        }
        fn name(&self) -> &'static str {
            "counting"
        }
        async fn execute(&self) -> JobOutcome {
            self.runs.fetch_add(1, Ordering::SeqCst);
            JobOutcome::Skipped {
                reason: "test".to_string(),
            }
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, h, m, 0).unwrap()
    }

    fn next_runs(expr: &str, after: DateTime<Utc>, n: usize) -> Vec<DateTime<Utc>> {
        parse_cron(expr).unwrap().after(&after).take(n).collect()
    }

    fn day(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, h, 0, 0).unwrap()
    }

    // 2026-03-01 is a Sunday.
    #[test]
    fn classic_weekdays_keep_their_meaning() {
        assert_eq!(next_runs("0 1 * * 1", day(1, 0), 1), vec![day(2, 1)]);
        assert_eq!(next_runs("0 1 * * 0", day(1, 2), 1), vec![day(8, 1)]);
        assert_eq!(next_runs("0 1 * * 7", day(1, 2), 1), vec![day(8, 1)]);

        let weekdays: Vec<Weekday> =
            next_runs("0 1 * * 1-5", day(1, 0), 5).iter().map(|t| t.weekday()).collect();
        assert_eq!(
            weekdays,
            vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri]
        );

        let weekend: Vec<Weekday> =
            next_runs("0 1 * * 5-7", day(2, 0), 3).iter().map(|t| t.weekday()).collect();
        assert_eq!(weekend, vec![Weekday::Fri, Weekday::Sat, Weekday::Sun]);

        let listed: Vec<Weekday> =
            next_runs("0 1 * * 0,3", day(1, 2), 2).iter().map(|t| t.weekday()).collect();
        assert_eq!(listed, vec![Weekday::Wed, Weekday::Sun]);
    }

    #[test]
    fn weekday_names_and_wildcards_pass_through() {
        assert_eq!(next_runs("0 1 * * Mon", day(1, 0), 1), vec![day(2, 1)]);
        assert_eq!(next_runs("0 1 * * *", day(1, 2), 1), vec![day(2, 1)]);
    }

    #[test]
    fn invalid_classic_weekdays_are_rejected() {
        assert!(matches!(parse_cron("0 1 * * 8"), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_cron("0 1 * * 5-2"), Err(Error::InvalidInput(_))));
        assert!(matches!(parse_cron("0 1 * * Mon-5"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn parses_five_and_six_field_expressions() {
        assert!(parse_cron("0 1 * * *").is_ok());
        assert!(parse_cron("0 30 1 * * *").is_ok());
        assert!(matches!(parse_cron("not a cron"), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn rejects_zero_tick() {
        assert!(JobScheduler::new(Duration::ZERO).is_err());
    }

    #[tokio::test]
    async fn runs_due_jobs_once_per_occurrence() {
        let mut scheduler = JobScheduler::new(DEFAULT_TICK_INTERVAL).unwrap();
        let categories = CountingJob::new(SyncKind::Categories);
        let contents = CountingJob::new(SyncKind::Contents);
        scheduler.register(categories.clone(), "0 1 * * *", at(0, 0)).unwrap();
        scheduler.register(contents.clone(), "30 1 * * *", at(0, 0)).unwrap();

        assert!(scheduler.tick(at(0, 59)).await.is_empty());

        let ran = scheduler.tick(at(1, 0)).await;
        assert_eq!(ran.len(), 1);
        assert_eq!(ran[0].0, SyncKind::Categories);
        assert!(scheduler.tick(at(1, 10)).await.is_empty());

        let ran = scheduler.tick(at(1, 31)).await;
        assert_eq!(ran.len(), 1);
        assert_eq!(ran[0].0, SyncKind::Contents);

        assert_eq!(categories.runs.load(Ordering::SeqCst), 1);
        assert_eq!(contents.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_now_targets_one_kind() {
        let mut scheduler = JobScheduler::new(DEFAULT_TICK_INTERVAL).unwrap();
        let categories = CountingJob::new(SyncKind::Categories);
        scheduler.register(categories.clone(), "0 1 * * *", at(0, 0)).unwrap();

        assert_eq!(scheduler.run_now(SyncKind::Categories).await.len(), 1);
        assert!(scheduler.run_now(SyncKind::Contents).await.is_empty());
        assert_eq!(categories.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn deferred_requests_run_in_the_loop() {
        let mut scheduler = JobScheduler::new(Duration::from_secs(3600)).unwrap();
        let contents = CountingJob::new(SyncKind::Contents);
        scheduler.register(contents.clone(), "0 0 1 1 *", Utc::now()).unwrap();
        let trigger = scheduler.trigger();
        trigger.request(SyncKind::Contents).unwrap();

        let watched = contents.clone();
        let shutdown = async move {
            while watched.runs.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), scheduler.run_until(shutdown))
            .await
            .unwrap();
        assert_eq!(contents.runs.load(Ordering::SeqCst), 1);

        assert!(trigger.request(SyncKind::Contents).is_err());
    }

    #[tokio::test]
    async fn forwarded_requests_run_in_the_loop() {
        let mut scheduler = JobScheduler::new(Duration::from_secs(3600)).unwrap();
        let categories = CountingJob::new(SyncKind::Categories);
        scheduler.register(categories.clone(), "0 0 1 1 *", Utc::now()).unwrap();
        let trigger = scheduler.trigger();
        trigger
            .forward(futures_util::stream::iter([(), ()]), SyncKind::Categories)
            .await;

        let watched = categories.clone();
        let shutdown = async move {
            while watched.runs.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), scheduler.run_until(shutdown))
            .await
            .unwrap();
        assert_eq!(categories.runs.load(Ordering::SeqCst), 2);

        // Forwarding ends quietly once the scheduler is gone.
        tokio::time::timeout(
            Duration::from_secs(1),
            trigger.forward(futures_util::stream::repeat(()), SyncKind::Categories),
        )
        .await
        .unwrap();
    }
}
