//! Trading-day scheduler.
//!
//! Runs a daily job once per trading day. The main schedule fires a few
//! times during the pre-open auction window; the fallback schedule fires
//! after the close and runs the job only if it has not succeeded that day.

use crate::domain::error::StockpickError;
use crate::ports::config_port::ConfigPort;
use chrono::{DateTime, Datelike, Local, NaiveDate, NaiveTime, Timelike, Weekday};
use cron::Schedule;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

pub const DEFAULT_MAIN_CRON: &str = "0 25-28,30 9 * * Mon-Fri";
pub const DEFAULT_FALLBACK_CRON: &str = "0 5 15 * * Mon-Fri";

/// Work run by the scheduler. Returns a short summary on success.
pub trait DailyJob: Send {
    fn run(&mut self) -> Result<String, StockpickError>;
}

impl<F> DailyJob for F
where
    F: FnMut() -> Result<String, StockpickError> + Send,
{
    fn run(&mut self) -> Result<String, StockpickError> {
        self()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub window_start: NaiveTime,
    pub window_end: NaiveTime,
    pub main: String,
    pub fallback: String,
    pub poll_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            window_start: NaiveTime::from_hms_opt(9, 25, 0).unwrap_or_default(),
            window_end: NaiveTime::from_hms_opt(9, 29, 59).unwrap_or_default(),
            main: DEFAULT_MAIN_CRON.to_string(),
            fallback: DEFAULT_FALLBACK_CRON.to_string(),
            poll_secs: 30,
        }
    }
}

impl SchedulerConfig {
    /// Read `[scheduler]`. Call `validate_scheduler_config` first; values
    /// that fail to parse here fall back to defaults.
    pub fn from_config(config: &dyn ConfigPort) -> Self {
        let d = Self::default();
        let time = |key: &str, default: NaiveTime| {
            config
                .get_string("scheduler", key)
                .and_then(|v| NaiveTime::parse_from_str(v.trim(), "%H:%M").ok())
                .unwrap_or(default)
        };
        // HH:MM is inclusive of the whole end minute.
        let window_end = time("window_end", d.window_end)
            .with_second(59)
            .unwrap_or(d.window_end);
        Self {
            window_start: time("window_start", d.window_start),
            window_end,
            main: config.get_string("scheduler", "main").unwrap_or(d.main),
            fallback: config
                .get_string("scheduler", "fallback")
                .unwrap_or(d.fallback),
            poll_secs: config.get_int("scheduler", "poll_secs", 30).max(1) as u64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Firing {
    Main,
    Fallback,
}

impl fmt::Display for Firing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Firing::Main => "main",
            Firing::Fallback => "fallback",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Ran(String),
    Skipped(String),
    Failed(String),
}

/// Once-per-day bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DayGuard {
    last_date: Option<NaiveDate>,
    sent_today: bool,
}

impl DayGuard {
    /// True unless the job already succeeded on `today`. A new date
    /// resets the flag.
    pub fn should_run(&mut self, today: NaiveDate) -> bool {
        if self.last_date != Some(today) {
            self.last_date = Some(today);
            self.sent_today = false;
        }
        !self.sent_today
    }

    pub fn mark_done(&mut self, today: NaiveDate) {
        self.last_date = Some(today);
        self.sent_today = true;
    }

    pub fn sent_today(&self) -> bool {
        self.sent_today
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.last_date
    }
}

pub fn is_trading_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub running: bool,
    pub current_time: String,
    pub is_trading_day: bool,
    pub in_window: bool,
    pub sent_today: bool,
    pub last_date: Option<NaiveDate>,
    pub next_execution: Option<String>,
}

pub struct TradingDayScheduler {
    config: SchedulerConfig,
    main: Schedule,
    fallback: Schedule,
    job: Mutex<Box<dyn DailyJob>>,
    guard: Mutex<DayGuard>,
    running: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn parse_cron(expr: &str, key: &str) -> Result<Schedule, StockpickError> {
    Schedule::from_str(expr).map_err(|e| StockpickError::Scheduler {
        reason: format!("invalid {key} cron expression {expr:?}: {e}"),
    })
}

impl TradingDayScheduler {
    pub fn new(config: SchedulerConfig, job: Box<dyn DailyJob>) -> Result<Self, StockpickError> {
        let main = parse_cron(&config.main, "main")?;
        let fallback = parse_cron(&config.fallback, "fallback")?;
        info!(main = %config.main, fallback = %config.fallback, "scheduler configured");
        Ok(Self {
            config,
            main,
            fallback,
            job: Mutex::new(job),
            guard: Mutex::new(DayGuard::default()),
            running: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn in_window(&self, time: NaiveTime) -> bool {
        self.config.window_start <= time && time <= self.config.window_end
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Handle one schedule firing at `now`.
    pub fn fire(&self, firing: Firing, now: DateTime<Local>) -> RunOutcome {
        let today = now.date_naive();
        if !is_trading_day(today) {
            return RunOutcome::Skipped(format!("{today} is not a trading day"));
        }
        if firing == Firing::Main && !self.in_window(now.time()) {
            warn!(time = %now.time(), "outside the auction window, skipping");
            return RunOutcome::Skipped("outside the auction window".to_string());
        }
        // Held across the run so overlapping firings cannot both proceed.
        let mut guard = lock(&self.guard);
        if !guard.should_run(today) {
            info!(%firing, "already ran today, skipping");
            return RunOutcome::Skipped("already ran today".to_string());
        }
        info!(%firing, %today, "running daily job");
        match lock(&self.job).run() {
            Ok(summary) => {
                guard.mark_done(today);
                info!(%firing, %summary, "daily job succeeded");
                RunOutcome::Ran(summary)
            }
            Err(e) => {
                error!(%firing, error = %e, "daily job failed");
                RunOutcome::Failed(e.to_string())
            }
        }
    }

    /// Fire every schedule with an occurrence in `(since, now]`, at most
    /// once each.
    pub fn tick(&self, since: DateTime<Local>, now: DateTime<Local>) -> Vec<(Firing, RunOutcome)> {
        let mut fired = Vec::new();
        for (firing, schedule) in [(Firing::Main, &self.main), (Firing::Fallback, &self.fallback)] {
            let due = schedule.after(&since).next().is_some_and(|t| t <= now);
            if due {
                fired.push((firing, self.fire(firing, now)));
            }
        }
        fired
    }

    /// Run the job immediately, ignoring the calendar and the window.
    /// Does not count as today's run.
    pub fn run_once(&self) -> Result<String, StockpickError> {
        info!("running daily job in test mode");
        lock(&self.job).run()
    }

    pub fn next_execution(&self, now: DateTime<Local>) -> Option<DateTime<Local>> {
        let main = self.main.after(&now).next();
        let fallback = self.fallback.after(&now).next();
        match (main, fallback) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn status(&self, now: DateTime<Local>) -> SchedulerStatus {
        let guard = lock(&self.guard);
        let today = now.date_naive();
        SchedulerStatus {
            running: self.is_running(),
            current_time: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            is_trading_day: is_trading_day(today),
            in_window: is_trading_day(today) && self.in_window(now.time()),
            sent_today: guard.sent_today() && guard.last_date() == Some(today),
            last_date: guard.last_date(),
            next_execution: self
                .next_execution(now)
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string()),
        }
    }

    /// Start the poll loop on a worker thread. Stops when [`stop`] is
    /// called.
    ///
    /// [`stop`]: TradingDayScheduler::stop
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<()>, StockpickError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(StockpickError::Scheduler {
                reason: "scheduler is already running".to_string(),
            });
        }
        let me = Arc::clone(self);
        std::thread::Builder::new()
            .name("trading-day-scheduler".to_string())
            .spawn(move || me.poll_loop())
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                StockpickError::Scheduler {
                    reason: format!("failed to start scheduler thread: {e}"),
                }
            })
    }

    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("scheduler stop requested");
        }
    }

    fn poll_loop(&self) {
        info!(poll_secs = self.config.poll_secs, "scheduler started");
        let poll = Duration::from_secs(self.config.poll_secs);
        let mut last = Local::now();
        while self.is_running() {
            let started = Instant::now();
            while self.is_running() && started.elapsed() < poll {
                std::thread::sleep(Duration::from_millis(200).min(poll));
            }
            if !self.is_running() {
                break;
            }
            let now = Local::now();
            for (firing, outcome) in self.tick(last, now) {
                info!(%firing, ?outcome, "schedule fired");
            }
            last = now;
        }
        info!("scheduler stopped");
    }
}
