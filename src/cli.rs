//! CLI definition and dispatch.

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{info, warn};

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::provider_file::ProviderFile;
use crate::domain::config_validation::{
    validate_scheduler_config, validate_strategy, validate_strategy_config,
};
use crate::domain::deep_analysis::{DeepAnalysisInput, DeepAnalysisReport, deep_analyze};
use crate::domain::engine::{AnalysisEngine, AnalysisReport};
use crate::domain::error::StockpickError;
use crate::domain::llm::{Caller, LlmClient, NewProvider, ProviderRegistry, ProviderUpdate};
use crate::domain::market::{Market, RiskFilter, exchange_symbol};
use crate::domain::recommend::{
    NoopObserver, PipelineObserver, RecommendationReport, Recommender, opening_gap,
};
use crate::domain::rule::{Fundamentals, Sentiment};
use crate::domain::scheduler::{SchedulerConfig, TradingDayScheduler};
use crate::domain::scoring::{AuctionData, CapitalFlow};
use crate::domain::screener::{
    NewScreenerRecord, ScreenConditions, ScreenSummary, ScreenerRecord, preset, presets, screen,
};
use crate::domain::strategy::{KV_PREFIX, StrategyConfig};
use crate::domain::task::{TaskOutcome, TaskStatus, TaskTracker};
use crate::domain::watchlist::{NewWatchStock, WatchGroup, WatchStock};
use crate::domain::technical::TechnicalSnapshot;
use crate::ports::chat_port::ChatPort;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::store_port::StorePort;

const DEFAULT_CONFIG: &str = "stockpick.ini";
const DEFAULT_DATA_DIR: &str = "data/bars";
const DEFAULT_PROVIDERS: &str = "data/ai_models.json";
const ANALYZE_DAYS: usize = 120;
const PROGRESS_POLL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "stockpick", about = "A-share stock recommendation and screening")]
pub struct Cli {
    /// INI configuration file (default: ./stockpick.ini when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Print JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the weighted rule analysis for one stock
    Analyze {
        code: String,
        #[arg(long)]
        name: Option<String>,
        /// Comma-separated rule ids to run (default: all)
        #[arg(long, value_delimiter = ',')]
        rules: Vec<String>,
        /// Also ask the configured model for a deep analysis
        #[arg(long)]
        deep: bool,
    },
    /// List the registered analysis rules
    Rules,
    /// Run the recommendation pipeline over the candidate pool
    Recommend,
    /// Screen a day's recommendations
    Screen {
        #[arg(long, conflicts_with = "conditions")]
        preset: Option<String>,
        /// Conditions as JSON, e.g. '{"price_max": 20, "boards": ["chinext"]}'
        #[arg(long)]
        conditions: Option<String>,
        /// Trading date (YYYY-MM-DD), default today
        #[arg(long)]
        date: Option<NaiveDate>,
        /// Save the run as a screener record with this name
        #[arg(long)]
        save: Option<String>,
    },
    /// List the screener presets
    Presets,
    /// Manage saved screener records
    Records {
        #[command(subcommand)]
        action: RecordsAction,
    },
    /// Manage watchlist groups and their stocks
    Watchlist {
        #[command(subcommand)]
        action: WatchlistAction,
    },
    /// Validate the strategy and scheduler configuration
    Validate,
    /// Run the trading-day scheduler
    Schedule {
        /// Run the job once now, ignoring the calendar
        #[arg(long)]
        once: bool,
        /// Print scheduler status and exit
        #[arg(long, conflicts_with = "once")]
        status: bool,
    },
    /// Manage LLM providers
    Providers {
        #[command(subcommand)]
        action: ProvidersAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum RecordsAction {
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    Show {
        id: i64,
    },
    Delete {
        id: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum WatchlistAction {
    /// List groups with their stock counts
    Groups,
    AddGroup {
        name: String,
    },
    RenameGroup {
        id: i64,
        name: String,
    },
    DeleteGroup {
        id: i64,
    },
    /// List a group's stocks, newest first
    List {
        group: i64,
    },
    Add {
        group: i64,
        code: String,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        note: String,
    },
    Remove {
        group: i64,
        code: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum ProvidersAction {
    List,
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        base_url: String,
        #[arg(long)]
        model: String,
        #[arg(long, default_value = "")]
        api_key: String,
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        disabled: bool,
    },
    /// Change the given fields of a provider
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        model: Option<String>,
        #[arg(long)]
        api_key: Option<String>,
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
    },
    Remove {
        id: String,
    },
    /// Make a provider the default
    Default {
        id: String,
    },
    /// Route a caller to a provider; omit the id to clear the mapping
    Map {
        caller: String,
        id: Option<String>,
    },
    /// Send a short test request
    Test {
        id: String,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let out = Output { json: cli.json };

    let result = match cli.command {
        Command::Analyze {
            code,
            name,
            rules,
            deep,
        } => run_analyze(&config, out, &code, name.as_deref(), &rules, deep),
        Command::Rules => run_rules(out),
        Command::Recommend => run_recommend(&config, out),
        Command::Screen {
            preset,
            conditions,
            date,
            save,
        } => run_screen(
            &config,
            out,
            preset.as_deref(),
            conditions.as_deref(),
            date,
            save,
        ),
        Command::Presets => run_presets(out),
        Command::Records { action } => run_records(&config, out, action),
        Command::Watchlist { action } => run_watchlist(&config, out, action),
        Command::Validate => run_validate(&config),
        Command::Schedule { once, status } => run_schedule(&config, out, once, status),
        Command::Providers { action } => run_providers(&config, out, action),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Load `path`, or `./stockpick.ini` when it exists, or an empty config.
pub fn load_config(path: Option<&Path>) -> Result<FileConfigAdapter, ExitCode> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG);
            if !default.exists() {
                return Ok(FileConfigAdapter::empty());
            }
            default
        }
    };
    FileConfigAdapter::from_file(&path).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

#[derive(Debug, Clone, Copy)]
struct Output {
    json: bool,
}

impl Output {
    fn emit<T: Serialize>(
        &self,
        value: &T,
        lines: impl FnOnce() -> Vec<String>,
    ) -> Result<(), StockpickError> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(value)?);
        } else {
            for line in lines() {
                println!("{line}");
            }
        }
        Ok(())
    }
}

pub fn data_adapter(config: &dyn ConfigPort) -> CsvAdapter {
    let dir = config
        .get_string("data", "dir")
        .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
    let adapter = CsvAdapter::new(PathBuf::from(dir));
    match config.get_string("data", "pool") {
        Some(pool) => adapter.with_pool(PathBuf::from(pool)),
        None => adapter,
    }
}

pub fn risk_filter(config: &dyn ConfigPort) -> RiskFilter {
    RiskFilter::with_blacklist(config.get_list("data", "blacklist"))
}

pub fn provider_file(config: &dyn ConfigPort) -> ProviderFile {
    ProviderFile::new(
        config
            .get_string("llm", "providers")
            .unwrap_or_else(|| DEFAULT_PROVIDERS.to_string()),
    )
}

type Store = Box<dyn StorePort + Send>;
type Transport = Box<dyn ChatPort + Send + Sync>;

/// Model access for the pipeline's deep-analysis phase.
pub struct DeepAnalysis {
    registry: ProviderRegistry,
    transport: Transport,
}

impl DeepAnalysis {
    pub fn new(registry: ProviderRegistry, transport: Transport) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// `None` when `[llm] pipeline_deep_analysis` is off or no usable
    /// provider serves deep analysis.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Option<Self>, StockpickError> {
        if !config.get_bool("llm", "pipeline_deep_analysis", true) {
            return Ok(None);
        }
        let registry = provider_file(config).load()?;
        let usable = registry
            .resolve(Caller::DeepAnalysis)
            .is_some_and(|p| p.is_complete());
        if !usable {
            return Ok(None);
        }
        Ok(Some(Self::new(registry, chat_transport(config)?)))
    }
}

/// The configured store, or `None` when `[sqlite] path` is unset.
pub fn open_optional_store(config: &dyn ConfigPort) -> Result<Option<Store>, StockpickError> {
    if config.get_string("sqlite", "path").is_none() {
        return Ok(None);
    }

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;

        let store = SqliteAdapter::from_config(config)?;
        store.initialize_schema()?;
        Ok(Some(Box::new(store)))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        warn!("built without sqlite support, results will not be stored");
        Ok(None)
    }
}

fn open_store(config: &dyn ConfigPort) -> Result<Store, StockpickError> {
    open_optional_store(config)?.ok_or_else(|| StockpickError::ConfigMissing {
        section: "sqlite".into(),
        key: "path".into(),
    })
}

/// `[strategy]` settings overlaid with `strategy_*` rows from the store,
/// validated.
pub fn load_strategy(
    config: &dyn ConfigPort,
    store: Option<&dyn StorePort>,
) -> Result<StrategyConfig, StockpickError> {
    let strategy = validate_strategy_config(config)?;
    let Some(store) = store else {
        return Ok(strategy);
    };
    let rows = store.config_values(KV_PREFIX)?;
    if rows.is_empty() {
        return Ok(strategy);
    }
    let strategy = strategy.apply_kv(rows.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    validate_strategy(&strategy)?;
    Ok(strategy)
}

/// One recommendation run: candidate pool, pipeline, and storage of the
/// picks when a store is configured.
pub struct DailyRun {
    data: Box<dyn DataPort + Send>,
    strategy: StrategyConfig,
    risk: RiskFilter,
    store: Option<Store>,
    deep: Option<DeepAnalysis>,
}

impl DailyRun {
    pub fn new(
        data: Box<dyn DataPort + Send>,
        strategy: StrategyConfig,
        risk: RiskFilter,
        store: Option<Store>,
    ) -> Self {
        Self {
            data,
            strategy,
            risk,
            store,
            deep: None,
        }
    }

    pub fn with_deep_analysis(mut self, deep: DeepAnalysis) -> Self {
        self.deep = Some(deep);
        self
    }

    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StockpickError> {
        let store = open_optional_store(config)?;
        let strategy = load_strategy(config, store.as_deref().map(|s| s as &dyn StorePort))?;
        let run = Self::new(
            Box::new(data_adapter(config)),
            strategy,
            risk_filter(config),
            store,
        );
        Ok(match DeepAnalysis::from_config(config)? {
            Some(deep) => {
                info!("deep analysis enabled for the pipeline");
                run.with_deep_analysis(deep)
            }
            None => run,
        })
    }

    pub fn store(&self) -> Option<&dyn StorePort> {
        self.store.as_deref().map(|s| s as &dyn StorePort)
    }

    /// Cancelled runs are returned but not stored.
    pub fn execute(
        &self,
        observer: &dyn PipelineObserver,
    ) -> Result<RecommendationReport, StockpickError> {
        let pool = self.data.candidate_pool()?;
        info!(candidates = pool.len(), "candidate pool loaded");
        let recommender = Recommender::new(self.data.as_ref(), self.strategy.clone())
            .with_risk_filter(self.risk.clone());
        let report = match &self.deep {
            Some(deep) => {
                let client = LlmClient::new(&deep.registry, deep.transport.as_ref());
                recommender.with_deep_analysis(&client).run(&pool, observer)
            }
            None => recommender.run(&pool, observer),
        };
        match &self.store {
            Some(store) if !report.cancelled => {
                store.save_recommendations(&report)?;
            }
            Some(_) => warn!("run was cancelled, not storing picks"),
            None => {}
        }
        Ok(report)
    }
}

fn run_analyze(
    config: &dyn ConfigPort,
    out: Output,
    code: &str,
    name: Option<&str>,
    rules: &[String],
    deep: bool,
) -> Result<(), StockpickError> {
    let data = data_adapter(config);
    let symbol = match Market::detect(code) {
        Market::AShare => exchange_symbol(code),
        _ => code.trim().to_string(),
    };
    let bars = match data.fetch_bars(&symbol, ANALYZE_DAYS) {
        Ok(bars) => bars,
        Err(StockpickError::NoData { .. }) => Vec::new(),
        Err(e) => return Err(e),
    };
    let name = match name {
        Some(n) => n.to_string(),
        None => data
            .candidate_pool()
            .ok()
            .and_then(|pool| pool.into_iter().find(|c| c.symbol == symbol))
            .map(|c| c.name)
            .unwrap_or_default(),
    };

    let mut engine = AnalysisEngine::with_builtin_rules();
    if !rules.is_empty() {
        let known: Vec<String> = engine.rules().into_iter().map(|r| r.id).collect();
        if let Some(unknown) = rules.iter().find(|r| !known.contains(r)) {
            return Err(StockpickError::UnknownRule(unknown.clone()));
        }
        engine.set_active_rules(rules.iter().map(String::as_str));
    }
    let report = engine.analyze_bars(
        code,
        &name,
        &bars,
        Fundamentals::default(),
        Sentiment::default(),
    );

    if !deep {
        return out.emit(&report, || analysis_lines(&report));
    }

    let technical = TechnicalSnapshot::from_bars(&bars);
    let auction = AuctionData {
        ratio: opening_gap(&bars),
        volume_ratio: technical.volume_ratio,
    };
    let registry = provider_file(config).load()?;
    let transport = chat_transport(config)?;
    let client = LlmClient::new(&registry, transport.as_ref());
    let deep_report = deep_analyze(
        DeepAnalysisInput {
            code: report.code.clone(),
            name: report.name.clone(),
            technical,
            fundamentals: Fundamentals::default(),
            flow: CapitalFlow::default(),
            auction,
        },
        &client,
    );

    out.emit(&json!({ "analysis": &report, "deep": &deep_report }), || {
        let mut lines = analysis_lines(&report);
        lines.extend(deep_lines(&deep_report));
        lines
    })
}

#[cfg(feature = "http")]
fn chat_transport(config: &dyn ConfigPort) -> Result<Transport, StockpickError> {
    use crate::adapters::openai_adapter::{DEFAULT_TIMEOUT_SECS, OpenAiAdapter};

    let secs = config.get_int("llm", "timeout_secs", DEFAULT_TIMEOUT_SECS as i64).max(1) as u64;
    Ok(Box::new(OpenAiAdapter::new(Duration::from_secs(secs))?))
}

#[cfg(not(feature = "http"))]
fn chat_transport(_config: &dyn ConfigPort) -> Result<Transport, StockpickError> {
    struct Offline;

    impl ChatPort for Offline {
        fn complete(
            &self,
            _provider: &crate::domain::llm::Provider,
            _request: &crate::domain::llm::ChatRequest,
        ) -> Result<String, StockpickError> {
            Err(StockpickError::Llm {
                reason: "built without http support".into(),
            })
        }
    }

    Ok(Box::new(Offline))
}

fn analysis_lines(report: &AnalysisReport) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {} ({})",
        report.code,
        report.name,
        report.market.label()
    )];
    if let Some(error) = &report.error {
        lines.push(format!("  error: {error}"));
        return lines;
    }
    if let Some(t) = &report.technical {
        lines.push(format!(
            "  price {:.2} ({:+.2}%)  trend {}  RSI {:.1}  MACD {}  volume {}",
            t.current_price, t.price_change, t.ma_trend, t.rsi, t.macd_signal, t.volume_status
        ));
    }
    for r in &report.rule_results {
        let flag = if r.failed { " [failed]" } else { "" };
        lines.push(format!(
            "  {:<16} {:>5.1}  w={:.2}{flag}  {}",
            r.id, r.score, r.weight, r.details
        ));
    }
    let tier = report
        .recommendation
        .map(|r| r.to_string())
        .unwrap_or_default();
    lines.push(format!(
        "  comprehensive score {:.1}  {tier}",
        report.comprehensive_score
    ));
    lines
}

fn deep_lines(report: &DeepAnalysisReport) -> Vec<String> {
    let a = &report.analysis;
    let mut lines = vec![
        String::new(),
        format!(
            "Deep analysis{}",
            if a.fallback { " (no model reply)" } else { "" }
        ),
        format!(
            "  scores: technical {:.3}  fundamental {:.3}  sentiment {:.3}  total {:.3}",
            report.scores.technical,
            report.scores.fundamental,
            report.scores.sentiment,
            report.scores.total
        ),
        format!("  rating {} ({} confidence), {}", a.rating, a.rating.confidence(), a.risk),
        format!(
            "  target {:.2} ({:+.1}%)  stop {:.2}  hold {} days  position {:.1}%",
            a.target_price, a.expected_return_pct, a.stop_loss_price, a.holding_period_days, a.position_pct
        ),
        format!("  buy: {}", a.buy_point),
        format!("  sell: {}", a.sell_point),
    ];
    if !a.fallback {
        lines.push(String::new());
        lines.extend(a.text.lines().map(str::to_string));
    }
    lines
}

fn run_rules(out: Output) -> Result<(), StockpickError> {
    let rules = AnalysisEngine::with_builtin_rules().rules();
    out.emit(&rules, || {
        rules
            .iter()
            .map(|r| format!("{:<16} w={:.2}  {}  {}", r.id, r.weight, r.name, r.description))
            .collect()
    })
}

fn run_recommend(config: &dyn ConfigPort, out: Output) -> Result<(), StockpickError> {
    let daily = DailyRun::from_config(config)?;
    let tracker = TaskTracker::new();
    let (tx, rx) = mpsc::channel();

    let id = tracker.spawn("daily recommendation", move |handle| {
        let report = daily.execute(handle)?;
        let summary = format!(
            "{} picks from {} candidates",
            report.picks.len(),
            report.summary.total_analyzed
        );
        let cancelled = report.cancelled;
        if tx.send(report).is_err() {
            warn!("report receiver dropped");
        }
        Ok(if cancelled {
            TaskOutcome::Cancelled(summary)
        } else {
            TaskOutcome::Completed(summary)
        })
    })?;

    watch_progress(&tracker, &id);
    let snapshot = tracker.wait(&id)?;
    if snapshot.status == TaskStatus::Failed {
        return Err(StockpickError::Task {
            task_id: id,
            reason: snapshot.error.unwrap_or_else(|| "failed".to_string()),
        });
    }
    let report = rx.recv().map_err(|_| StockpickError::Task {
        task_id: id,
        reason: "finished without a report".to_string(),
    })?;

    out.emit(&report, || report_lines(&report))
}

fn watch_progress(tracker: &TaskTracker, id: &str) {
    let mut last = None;
    while let Some(snapshot) = tracker.get(id) {
        if snapshot.status.is_finished() {
            break;
        }
        let position = (snapshot.progress, snapshot.total);
        if last != Some(position) && snapshot.total > 0 {
            eprintln!(
                "[{}/{}] {}",
                snapshot.progress, snapshot.total, snapshot.message
            );
            last = Some(position);
        }
        std::thread::sleep(PROGRESS_POLL);
    }
}

fn report_lines(report: &RecommendationReport) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Recommendations {} {}: {} picks, {} candidates analysed, avg score {:.3}",
            report.date,
            report.time.format("%H:%M:%S"),
            report.picks.len(),
            report.summary.total_analyzed,
            report.summary.avg_score
        ),
        format!(
            "Auction: avg {:+.2}%  gap up {}  flat {}  gap down {}",
            report.auction.avg_auction_ratio,
            report.auction.gap_up_count,
            report.auction.flat_count,
            report.auction.gap_down_count
        ),
    ];
    if report.cancelled {
        lines.push("Run was cancelled; results are partial.".to_string());
    }
    for (rank, p) in report.picks.iter().enumerate() {
        lines.push(format!(
            "{:>3}. {} {}  {:.2}  score {:.3} ({})  entry {:.2}  stop {:.2}  target {:.2}  {}",
            rank + 1,
            p.symbol,
            p.name,
            p.current_price,
            p.total_score,
            p.confidence,
            p.entry_price,
            p.stop_loss,
            p.target_price,
            p.board.label()
        ));
        if let Some(e) = &p.explanation {
            lines.push(format!("     {}: {}", e.signal, e.reason));
        }
    }
    if !report.skipped.is_empty() {
        lines.push(format!("{} candidates skipped", report.skipped.len()));
    }
    lines
}

/// `preset` wins over `conditions`; neither means no filtering.
pub fn resolve_conditions(
    preset_key: Option<&str>,
    conditions: Option<&str>,
) -> Result<ScreenConditions, StockpickError> {
    match (preset_key, conditions) {
        (Some(key), _) => Ok(preset(key)?.conditions),
        (None, Some(text)) => Ok(serde_json::from_str(text)?),
        (None, None) => Ok(ScreenConditions::default()),
    }
}

fn run_screen(
    config: &dyn ConfigPort,
    out: Output,
    preset_key: Option<&str>,
    conditions: Option<&str>,
    date: Option<NaiveDate>,
    save: Option<String>,
) -> Result<(), StockpickError> {
    let conditions = resolve_conditions(preset_key, conditions)?;
    let today = Local::now().date_naive();
    let date = date.unwrap_or(today);
    let daily = DailyRun::from_config(config)?;

    let mut stocks = match daily.store() {
        Some(store) => store.recommendations_for(date)?,
        None => Vec::new(),
    };
    if stocks.is_empty() && date == today {
        info!(%date, "no stored recommendations, running the pipeline");
        stocks = daily.execute(&NoopObserver)?.picks;
    }

    let results = screen(&stocks, &conditions);
    let summary = ScreenSummary::from_results(&results);

    if let Some(name) = save {
        let store = daily.store().ok_or_else(|| StockpickError::ConfigMissing {
            section: "sqlite".into(),
            key: "path".into(),
        })?;
        let id = store.save_screener_record(&NewScreenerRecord {
            name,
            conditions: conditions.clone(),
            preset_key: preset_key.map(str::to_string),
            results: results.clone(),
        })?;
        eprintln!("Saved screener record {id}");
    }

    let value = json!({
        "date": date,
        "conditions": &conditions,
        "summary": &summary,
        "results": &results,
    });
    out.emit(&value, || {
        let mut lines = vec![format!(
            "{} of {} stocks matched, avg score {:.3}, price {:.2}-{:.2}",
            summary.count,
            stocks.len(),
            summary.avg_score,
            summary.price_range.0,
            summary.price_range.1
        )];
        lines.extend(results.iter().map(|p| {
            format!(
                "  {} {}  {:.2}  score {:.3} ({})  auction {:+.2}%",
                p.symbol, p.name, p.current_price, p.total_score, p.confidence, p.auction_ratio
            )
        }));
        lines
    })
}

fn run_presets(out: Output) -> Result<(), StockpickError> {
    let presets = presets();
    out.emit(&presets, || {
        presets
            .iter()
            .flat_map(|p| {
                [
                    format!("{:<20} {}", p.key, p.name),
                    format!("{:<20} {}", "", p.description),
                ]
            })
            .collect()
    })
}

fn record_line(r: &ScreenerRecord) -> String {
    format!(
        "{:>4}  {}  {:<24} {:>3} results  {}",
        r.id,
        r.created_at.format("%Y-%m-%d %H:%M"),
        r.name,
        r.result_count,
        r.preset_key.as_deref().unwrap_or("custom")
    )
}

fn run_records(
    config: &dyn ConfigPort,
    out: Output,
    action: RecordsAction,
) -> Result<(), StockpickError> {
    let store = open_store(config)?;
    match action {
        RecordsAction::List { limit } => {
            let records = store.list_screener_records(limit)?;
            out.emit(&records, || records.iter().map(record_line).collect())
        }
        RecordsAction::Show { id } => {
            let record =
                store
                    .get_screener_record(id)?
                    .ok_or_else(|| StockpickError::DatabaseQuery {
                        reason: format!("no screener record with id {id}"),
                    })?;
            out.emit(&record, || {
                let mut lines = vec![record_line(&record)];
                lines.extend(record.results.iter().map(|p| {
                    format!(
                        "  {} {}  {:.2}  score {:.3}",
                        p.symbol, p.name, p.current_price, p.total_score
                    )
                }));
                lines
            })
        }
        RecordsAction::Delete { id } => {
            if !store.delete_screener_record(id)? {
                return Err(StockpickError::DatabaseQuery {
                    reason: format!("no screener record with id {id}"),
                });
            }
            eprintln!("Deleted screener record {id}");
            Ok(())
        }
    }
}

fn group_line(g: &WatchGroup) -> String {
    format!("{:>4}  {:<16} {:>3} stocks", g.id, g.name, g.stock_count)
}

fn watch_stock_line(s: &WatchStock) -> String {
    format!(
        "  {:<10} {:<12} {:<8} {}  {}",
        s.symbol,
        s.stock_name,
        s.market.label(),
        s.added_at.format("%Y-%m-%d %H:%M"),
        s.note
    )
}

fn run_watchlist(
    config: &dyn ConfigPort,
    out: Output,
    action: WatchlistAction,
) -> Result<(), StockpickError> {
    let store = open_store(config)?;
    let no_group = |id: i64| StockpickError::Watchlist {
        reason: format!("no watchlist group with id {id}"),
    };
    match action {
        WatchlistAction::Groups => {
            let groups = store.list_watch_groups()?;
            out.emit(&groups, || groups.iter().map(group_line).collect())
        }
        WatchlistAction::AddGroup { name } => {
            let group = store.add_watch_group(&name)?;
            out.emit(&group, || vec![group_line(&group)])
        }
        WatchlistAction::RenameGroup { id, name } => {
            if !store.rename_watch_group(id, &name)? {
                return Err(no_group(id));
            }
            eprintln!("Renamed group {id}");
            Ok(())
        }
        WatchlistAction::DeleteGroup { id } => {
            if !store.delete_watch_group(id)? {
                return Err(no_group(id));
            }
            eprintln!("Deleted group {id}");
            Ok(())
        }
        WatchlistAction::List { group } => {
            let stocks = store.list_watch_stocks(group)?;
            out.emit(&stocks, || stocks.iter().map(watch_stock_line).collect())
        }
        WatchlistAction::Add {
            group,
            code,
            name,
            note,
        } => {
            let stock = store.add_watch_stock(&NewWatchStock::new(group, &code, &name, &note))?;
            out.emit(&stock, || vec![watch_stock_line(&stock)])
        }
        WatchlistAction::Remove { group, code } => {
            let symbol = NewWatchStock::new(group, &code, "", "").symbol;
            if !store.remove_watch_stock(group, &symbol)? {
                return Err(StockpickError::Watchlist {
                    reason: format!("{symbol} is not in group {group}"),
                });
            }
            eprintln!("Removed {symbol} from group {group}");
            Ok(())
        }
    }
}

fn run_validate(config: &dyn ConfigPort) -> Result<(), StockpickError> {
    let strategy = validate_strategy_config(config)?;
    validate_scheduler_config(config)?;
    eprintln!(
        "Strategy: tech {:.2} / auction {:.2}, threshold {:.2}, max {} picks, price {:.2}-{:.2}",
        strategy.tech_weight,
        strategy.auction_weight,
        strategy.score_threshold,
        strategy.max_recommendations,
        strategy.min_price,
        strategy.max_price
    );
    eprintln!("Configuration is valid.");
    Ok(())
}

fn run_schedule(
    config: &dyn ConfigPort,
    out: Output,
    once: bool,
    status: bool,
) -> Result<(), StockpickError> {
    validate_scheduler_config(config)?;
    let daily = DailyRun::from_config(config)?;
    let job = move || -> Result<String, StockpickError> {
        let report = daily.execute(&NoopObserver)?;
        Ok(format!(
            "{} picks from {} candidates",
            report.picks.len(),
            report.summary.total_analyzed
        ))
    };
    let scheduler = Arc::new(TradingDayScheduler::new(
        SchedulerConfig::from_config(config),
        Box::new(job),
    )?);

    if status {
        let status = scheduler.status(Local::now());
        return out.emit(&status, || {
            vec![
                format!("time:           {}", status.current_time),
                format!("trading day:    {}", status.is_trading_day),
                format!("in window:      {}", status.in_window),
                format!("sent today:     {}", status.sent_today),
                format!(
                    "next execution: {}",
                    status.next_execution.as_deref().unwrap_or("none")
                ),
            ]
        });
    }

    if once {
        let summary = scheduler.run_once()?;
        return out.emit(&json!({ "summary": &summary }), || vec![summary.clone()]);
    }

    let worker = scheduler.start()?;
    if let Some(next) = scheduler.next_execution(Local::now()) {
        eprintln!("Scheduler running, next execution {}", next.format("%Y-%m-%d %H:%M:%S"));
    }
    worker.join().map_err(|_| StockpickError::Scheduler {
        reason: "scheduler thread panicked".to_string(),
    })
}

/// Registry as shown to the user, keys masked.
fn masked(registry: &ProviderRegistry) -> ProviderRegistry {
    let mut shown = registry.clone();
    for p in &mut shown.providers {
        p.api_key = p.masked_key();
    }
    shown
}

fn parse_caller(caller: &str) -> Result<Caller, StockpickError> {
    Caller::parse(caller).ok_or_else(|| StockpickError::ConfigInvalid {
        section: "llm".into(),
        key: "caller".into(),
        reason: format!(
            "unknown caller {caller}, expected one of {}",
            Caller::ALL.map(|c| c.id()).join(", ")
        ),
    })
}

fn run_providers(
    config: &dyn ConfigPort,
    out: Output,
    action: ProvidersAction,
) -> Result<(), StockpickError> {
    let file = provider_file(config);
    let mut registry = file.load()?;

    match action {
        ProvidersAction::List => {
            let shown = masked(&registry);
            out.emit(&shown, || {
                let mut lines: Vec<String> = shown
                    .providers
                    .iter()
                    .map(|p| {
                        let default = if p.id == shown.default_provider_id { "*" } else { " " };
                        let state = if p.enabled { "" } else { " (disabled)" };
                        format!(
                            "{default} {:<20} {:<16} {} {}  key {}{state}",
                            p.id, p.name, p.base_url, p.model_id, p.api_key
                        )
                    })
                    .collect();
                if lines.is_empty() {
                    lines.push(format!("No providers in {}", file.path().display()));
                }
                for (caller, id) in shown.callers() {
                    lines.push(format!(
                        "  {:<18} -> {}",
                        caller.id(),
                        id.unwrap_or("(default)")
                    ));
                }
                lines
            })
        }
        ProvidersAction::Add {
            name,
            base_url,
            model,
            api_key,
            id,
            disabled,
        } => {
            let added = registry
                .add(NewProvider {
                    id,
                    name,
                    base_url,
                    model_id: model,
                    api_key,
                    enabled: !disabled,
                })?
                .id
                .clone();
            file.save(&registry)?;
            eprintln!("Added provider {added}");
            Ok(())
        }
        ProvidersAction::Update {
            id,
            name,
            base_url,
            model,
            api_key,
            enable,
            disable,
        } => {
            let enabled = match (enable, disable) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let update = ProviderUpdate {
                name,
                base_url,
                model_id: model,
                api_key,
                enabled,
            };
            if registry.update(&id, update).is_none() {
                return Err(StockpickError::UnknownProvider(id));
            }
            file.save(&registry)?;
            eprintln!("Updated provider {id}");
            Ok(())
        }
        ProvidersAction::Remove { id } => {
            if !registry.remove(&id) {
                return Err(StockpickError::UnknownProvider(id));
            }
            file.save(&registry)?;
            eprintln!("Removed provider {id}");
            Ok(())
        }
        ProvidersAction::Default { id } => {
            registry.set_default(&id)?;
            file.save(&registry)?;
            eprintln!("Default provider is now {id}");
            Ok(())
        }
        ProvidersAction::Map { caller, id } => {
            let caller = parse_caller(&caller)?;
            match id {
                Some(id) => {
                    registry.set_caller(caller, &id)?;
                    eprintln!("{caller} now uses {id}");
                }
                None => {
                    registry.remove_caller(caller);
                    eprintln!("{caller} now uses the default provider");
                }
            }
            file.save(&registry)
        }
        ProvidersAction::Test { id } => {
            let transport = chat_transport(config)?;
            let reply = LlmClient::new(&registry, transport.as_ref()).test_provider(&id)?;
            out.emit(&json!({ "id": &id, "reply": &reply }), || {
                vec![format!("{id}: {reply}")]
            })
        }
    }
}
