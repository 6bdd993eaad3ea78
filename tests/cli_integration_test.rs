//! CLI integration tests.
//!
//! Tests cover:
//! - Config loading and condition resolution helpers
//! - The daily run over CSV data with and without a SQLite store
//! - Command dispatch and exit codes with real INI files on disk

mod common;

use clap::Parser;
use common::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use stockpick::adapters::file_config_adapter::FileConfigAdapter;
use stockpick::adapters::provider_file::ProviderFile;
use stockpick::cli::{self, Cli};
use stockpick::domain::error::StockpickError;
use stockpick::domain::market::RiskFilter;
use stockpick::domain::pick::Confidence;
use stockpick::domain::recommend::NoopObserver;
use stockpick::domain::strategy::StrategyConfig;
use stockpick::ports::store_port::StorePort;
use tempfile::TempDir;

fn run(args: &[&str]) -> ExitCode {
    let mut argv = vec!["stockpick"];
    argv.extend_from_slice(args);
    cli::run(Cli::parse_from(argv))
}

/// Bars for three stocks, a pool CSV, and an INI wiring them together.
struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(with_sqlite: bool) -> Self {
        let dir = TempDir::new().unwrap();
        let bars_dir = dir.path().join("bars");
        fs::create_dir_all(&bars_dir).unwrap();

        for (symbol, bars) in [
            ("sh.600036", rising("sh.600036", 30.0)),
            ("sz.002475", rising("sz.002475", 8.0)),
            ("sz.000001", falling("sz.000001", 12.0)),
        ] {
            fs::write(bars_dir.join(format!("{symbol}.csv")), bars_csv(&bars)).unwrap();
        }
        fs::write(
            dir.path().join("pool.csv"),
            "symbol,name,auction_ratio,auction_volume_ratio,market_cap_billion,concept\n\
             600036,招商银行,2.5,2.0,900,bank\n\
             002475,立讯精密,,,280,\n\
             000001,平安银行,,,210,\n\
             300999,Missing,,,,\n",
        )
        .unwrap();

        let ws = Self { dir };
        ws.write_config(with_sqlite, "");
        ws
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn config_path(&self) -> PathBuf {
        self.path("stockpick.ini")
    }

    fn config_arg(&self) -> String {
        self.config_path().display().to_string()
    }

    fn write_config(&self, with_sqlite: bool, strategy_extra: &str) {
        let mut ini = format!(
            "[strategy]\n\
             tech_weight = 0.65\n\
             auction_weight = 0.35\n\
             score_threshold = 0.65\n\
             max_recommendations = 10\n\
             {strategy_extra}\n\
             [data]\n\
             dir = {}\n\
             pool = {}\n\
             \n\
             [llm]\n\
             providers = {}\n",
            self.path("bars").display(),
            self.path("pool.csv").display(),
            self.path("ai_models.json").display(),
        );
        if with_sqlite {
            ini.push_str(&format!(
                "\n[sqlite]\npath = {}\n",
                self.path("stockpick.db").display()
            ));
        }
        fs::write(self.config_path(), ini).unwrap();
    }

    fn config(&self) -> FileConfigAdapter {
        FileConfigAdapter::from_file(self.config_path()).unwrap()
    }
}

mod helpers {
    use super::*;

    #[test]
    fn load_config_missing_file_is_config_exit_code() {
        let result = cli::load_config(Some(Path::new("/nonexistent/stockpick.ini")));
        assert_eq!(result.err(), Some(ExitCode::from(2)));
    }

    #[test]
    fn resolve_conditions_variants() {
        let preset = cli::resolve_conditions(Some("low_price_breakout"), None).unwrap();
        assert!(preset.price_max.is_some());

        let custom =
            cli::resolve_conditions(None, Some(r#"{"price_max": 20, "rsi_min": 30}"#)).unwrap();
        assert_eq!(custom.price_max, Some(20.0));
        assert_eq!(custom.rsi_min, Some(30.0));
        assert_eq!(custom.total_score_min, None);

        let none = cli::resolve_conditions(None, None).unwrap();
        assert_eq!(none, Default::default());

        assert!(matches!(
            cli::resolve_conditions(Some("moonshot"), None),
            Err(StockpickError::UnknownPreset(_))
        ));
        assert!(matches!(
            cli::resolve_conditions(None, Some("{price_max")),
            Err(StockpickError::Json(_))
        ));
    }

    #[test]
    fn data_adapter_uses_pool_file() {
        let ws = Workspace::new(false);
        let config = ws.config();
        use stockpick::ports::data_port::DataPort;

        let pool = cli::data_adapter(&config).candidate_pool().unwrap();
        let symbols: Vec<&str> = pool.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(
            symbols,
            vec!["sh.600036", "sz.002475", "sz.000001", "sz.300999"]
        );
    }

    #[test]
    fn risk_filter_defaults_without_blacklist() {
        let config = FileConfigAdapter::empty();
        assert_eq!(cli::risk_filter(&config).blacklist_len(), 7);

        let config = FileConfigAdapter::from_string("[data]\nblacklist = 600036, 000001\n").unwrap();
        assert_eq!(cli::risk_filter(&config).blacklist_len(), 2);
    }
}

mod daily_run {
    use super::*;

    #[test]
    fn execute_without_store() {
        let ws = Workspace::new(false);
        let config = ws.config();
        let daily = cli::DailyRun::from_config(&config).unwrap();
        assert!(daily.store().is_none());

        let report = daily.execute(&NoopObserver).unwrap();
        let symbols: Vec<&str> = report.picks.iter().map(|p| p.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["sh.600036", "sz.002475"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].symbol, "sz.300999");
        // Pool auction columns override the bar-derived gap.
        assert_eq!(report.picks[0].auction_ratio, 2.5);
        assert_eq!(report.picks[1].auction_ratio, 0.0);
    }

    #[test]
    fn deep_analysis_needs_a_usable_provider() {
        let ws = Workspace::new(false);
        assert!(cli::DeepAnalysis::from_config(&ws.config()).unwrap().is_none());

        ProviderFile::new(ws.path("ai_models.json"))
            .save(&registry_with_provider())
            .unwrap();
        assert!(cli::DeepAnalysis::from_config(&ws.config()).unwrap().is_some());

        let mut ini = fs::read_to_string(ws.config_path()).unwrap();
        ini.push_str("pipeline_deep_analysis = false\n");
        fs::write(ws.config_path(), ini).unwrap();
        assert!(cli::DeepAnalysis::from_config(&ws.config()).unwrap().is_none());
    }

    #[test]
    fn deep_analysis_phase_adds_model_picks() {
        let data = MockDataPort::new().with_stock("sh.600036", "招商银行", rising("sh.600036", 30.0));
        let strategy = StrategyConfig {
            score_threshold: 0.5,
            ..StrategyConfig::default()
        };
        let deep = cli::DeepAnalysis::new(
            registry_with_provider(),
            Box::new(MockChat::replying("Rating: Buy\nRisk: low risk")),
        );
        let daily = cli::DailyRun::new(Box::new(data), strategy, RiskFilter::default(), None)
            .with_deep_analysis(deep);

        let report = daily.execute(&NoopObserver).unwrap();
        assert_eq!(report.picks.len(), 1);
        assert!(report.picks[0].strategy.starts_with("Rating: Buy"));
        assert_eq!(report.picks[0].confidence, Confidence::High);
    }

    #[test]
    fn invalid_strategy_is_rejected() {
        let ws = Workspace::new(false);
        fs::write(
            ws.config_path(),
            "[strategy]\ntech_weight = 0.95\nauction_weight = 0.05\n",
        )
        .unwrap();
        let result = cli::DailyRun::from_config(&ws.config());
        assert!(matches!(result, Err(StockpickError::ConfigInvalid { .. })));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn execute_stores_picks() {
        let ws = Workspace::new(true);
        let config = ws.config();
        let daily = cli::DailyRun::from_config(&config).unwrap();
        let report = daily.execute(&NoopObserver).unwrap();

        let stored = daily
            .store()
            .unwrap()
            .recommendations_for(report.date)
            .unwrap();
        assert_eq!(stored.len(), report.picks.len());
        assert_eq!(stored[0].symbol, report.picks[0].symbol);

        // A second run the same day replaces rather than duplicates.
        daily.execute(&NoopObserver).unwrap();
        let stored = daily
            .store()
            .unwrap()
            .recommendations_for(report.date)
            .unwrap();
        assert_eq!(stored.len(), report.picks.len());
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn stored_strategy_overrides_ini() {
        let ws = Workspace::new(true);
        let config = ws.config();
        let store = cli::open_optional_store(&config).unwrap().unwrap();
        store.set_config_value("strategy_score_threshold", "0.9").unwrap();

        let strategy = cli::load_strategy(&config, Some(store.as_ref() as &dyn StorePort)).unwrap();
        assert_eq!(strategy.score_threshold, 0.9);
        assert_eq!(strategy.max_recommendations, 10);

        // Only the strongest auction clears 0.9.
        let report = cli::DailyRun::from_config(&config)
            .unwrap()
            .execute(&NoopObserver)
            .unwrap();
        assert_eq!(report.picks.len(), 1);
        assert_eq!(report.picks[0].symbol, "sh.600036");

        store.set_config_value("strategy_tech_weight", "0.95").unwrap();
        assert!(matches!(
            cli::load_strategy(&config, Some(store.as_ref() as &dyn StorePort)),
            Err(StockpickError::ConfigInvalid { .. })
        ));
    }
}

mod commands {
    use super::*;

    #[test]
    fn validate_exit_codes() {
        let ws = Workspace::new(false);
        assert_eq!(run(&["--config", &ws.config_arg(), "validate"]), ExitCode::SUCCESS);

        ws.write_config(false, "min_price = 50\nmax_price = 10\n");
        assert_eq!(run(&["--config", &ws.config_arg(), "validate"]), ExitCode::from(2));
    }

    #[test]
    fn listing_commands_succeed() {
        let ws = Workspace::new(false);
        let config = ws.config_arg();
        assert_eq!(run(&["--config", &config, "rules"]), ExitCode::SUCCESS);
        assert_eq!(run(&["--config", &config, "--json", "presets"]), ExitCode::SUCCESS);
    }

    #[test]
    fn analyze_reports_unknown_rule() {
        let ws = Workspace::new(false);
        let config = ws.config_arg();
        assert_eq!(
            run(&["--config", &config, "analyze", "600036", "--rules", "technical"]),
            ExitCode::SUCCESS
        );
        assert_eq!(
            run(&["--config", &config, "analyze", "600036", "--rules", "astrology"]),
            ExitCode::from(4)
        );
    }

    #[test]
    fn records_need_a_store() {
        let ws = Workspace::new(false);
        assert_eq!(
            run(&["--config", &ws.config_arg(), "records", "list"]),
            ExitCode::from(2)
        );
    }

    #[test]
    fn screen_with_unknown_preset() {
        let ws = Workspace::new(false);
        assert_eq!(
            run(&["--config", &ws.config_arg(), "screen", "--preset", "moonshot"]),
            ExitCode::from(4)
        );
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn recommend_screen_and_records() {
        let ws = Workspace::new(true);
        let config = ws.config_arg();

        assert_eq!(run(&["--config", &config, "--json", "recommend"]), ExitCode::SUCCESS);
        assert_eq!(
            run(&[
                "--config",
                &config,
                "screen",
                "--conditions",
                r#"{"price_max": 20}"#,
                "--save",
                "cheap picks",
            ]),
            ExitCode::SUCCESS
        );

        let store = cli::open_optional_store(&ws.config()).unwrap().unwrap();
        let records = store.list_screener_records(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "cheap picks");
        assert_eq!(records[0].result_symbols, vec!["sz.002475"]);
        let id = records[0].id.to_string();

        assert_eq!(run(&["--config", &config, "records", "show", &id]), ExitCode::SUCCESS);
        assert_eq!(run(&["--config", &config, "records", "delete", &id]), ExitCode::SUCCESS);
        assert_eq!(
            run(&["--config", &config, "records", "delete", &id]),
            ExitCode::from(3)
        );
    }

    #[test]
    fn provider_management() {
        let ws = Workspace::new(false);
        let config = ws.config_arg();
        let add = |id: &str| {
            run(&[
                "--config",
                &config,
                "providers",
                "add",
                "--name",
                "DeepSeek",
                "--base-url",
                "https://api.deepseek.com/v1",
                "--model",
                "deepseek-chat",
                "--api-key",
                "sk-123456",
                "--id",
                id,
            ])
        };
        assert_eq!(add("first"), ExitCode::SUCCESS);
        assert_eq!(add("second"), ExitCode::SUCCESS);
        assert_eq!(add("second"), ExitCode::from(2));

        assert_eq!(
            run(&["--config", &config, "providers", "map", "deep_analysis", "second"]),
            ExitCode::SUCCESS
        );
        assert_eq!(
            run(&["--config", &config, "providers", "map", "horoscope", "second"]),
            ExitCode::from(2)
        );
        assert_eq!(
            run(&["--config", &config, "providers", "default", "missing"]),
            ExitCode::from(6)
        );
        assert_eq!(run(&["--config", &config, "providers", "list"]), ExitCode::SUCCESS);

        let registry = ProviderFile::new(ws.path("ai_models.json")).load().unwrap();
        assert_eq!(registry.providers.len(), 2);
        assert_eq!(registry.default_provider_id, "first");
        assert_eq!(
            registry.caller_mapping.get("deep_analysis").map(String::as_str),
            Some("second")
        );

        assert_eq!(
            run(&[
                "--config",
                &config,
                "providers",
                "update",
                "second",
                "--model",
                "deepseek-reasoner",
                "--disable",
            ]),
            ExitCode::SUCCESS
        );
        assert_eq!(
            run(&["--config", &config, "providers", "update", "missing", "--enable"]),
            ExitCode::from(6)
        );
        let registry = ProviderFile::new(ws.path("ai_models.json")).load().unwrap();
        let second = registry.get("second").unwrap();
        assert_eq!(second.model_id, "deepseek-reasoner");
        assert!(!second.enabled);
        assert_eq!(second.name, "DeepSeek");

        assert_eq!(
            run(&["--config", &config, "providers", "remove", "first"]),
            ExitCode::SUCCESS
        );
        let registry = ProviderFile::new(ws.path("ai_models.json")).load().unwrap();
        assert_eq!(registry.default_provider_id, "second");
        assert_eq!(
            run(&["--config", &config, "providers", "remove", "first"]),
            ExitCode::from(6)
        );
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn watchlist_management() {
        let ws = Workspace::new(true);
        let config = ws.config_arg();
        let watch = |args: &[&str]| {
            let mut argv = vec!["--config", config.as_str(), "watchlist"];
            argv.extend_from_slice(args);
            run(&argv)
        };

        assert_eq!(watch(&["groups"]), ExitCode::SUCCESS);
        assert_eq!(watch(&["add-group", "科技"]), ExitCode::SUCCESS);

        let store = cli::open_optional_store(&ws.config()).unwrap().unwrap();
        let groups = store.list_watch_groups().unwrap();
        assert_eq!(groups.len(), 3);
        let holdings = groups.iter().find(|g| g.is_holdings()).unwrap().id.to_string();
        let tech = groups.iter().find(|g| g.name == "科技").unwrap().id;
        let tech_arg = tech.to_string();

        assert_eq!(
            watch(&["add", &tech_arg, "002475", "--name", "立讯精密"]),
            ExitCode::SUCCESS
        );
        assert_eq!(watch(&["add", &tech_arg, "sz.002475"]), ExitCode::from(3));
        assert_eq!(watch(&["list", &tech_arg]), ExitCode::SUCCESS);
        assert_eq!(store.list_watch_stocks(tech).unwrap()[0].stock_name, "立讯精密");

        assert_eq!(watch(&["delete-group", &holdings]), ExitCode::from(3));
        assert_eq!(watch(&["remove", &tech_arg, "002475"]), ExitCode::SUCCESS);
        assert_eq!(watch(&["remove", &tech_arg, "002475"]), ExitCode::from(3));
        assert_eq!(watch(&["rename-group", &tech_arg, "半导体"]), ExitCode::SUCCESS);
        assert_eq!(watch(&["delete-group", &tech_arg]), ExitCode::SUCCESS);
        assert_eq!(watch(&["delete-group", &tech_arg]), ExitCode::from(3));
    }

    #[test]
    fn watchlist_needs_a_store() {
        let ws = Workspace::new(false);
        assert_eq!(
            run(&["--config", &ws.config_arg(), "watchlist", "groups"]),
            ExitCode::from(2)
        );
    }
}
