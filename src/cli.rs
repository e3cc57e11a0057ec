//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::memory_cache::MemoryCache;
use crate::adapters::shared_secret_auth::SharedSecretAuth;
#[cfg(feature = "sqlite")]
use crate::adapters::sqlite_adapter::SqliteAdapter;
use crate::domain::config_validation::{cache_ttl, walk_forward_config};
use crate::domain::error::PicklabError;
use crate::domain::walk_forward::{ValidationStatus, WalkForwardConfig};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::MarketDataPort;
use crate::ports::result_store_port::StoredSummary;
use crate::service::{ApiResponse, Comparison, ValidateRequest, ValidationReport, ValidationService};

#[derive(Parser, Debug)]
#[command(name = "picklab", about = "Walk-forward validation for stock-pick algorithms")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Walk-forward validate one algorithm
    Validate {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        source: String,
        #[arg(long)]
        algorithm: String,
        #[arg(long)]
        train_days: Option<u32>,
        #[arg(long)]
        test_days: Option<u32>,
        /// Store folds and summary (requires --token)
        #[arg(long)]
        persist: bool,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Validate every algorithm of a source and rank them
    ValidateAll {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        source: String,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Compare a naive full-history optimum with the stored walk-forward result
    Compare {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        source: String,
        #[arg(long)]
        algorithm: String,
        #[arg(long)]
        json: bool,
    },
    /// List stored walk-forward summaries
    Results {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Validate a configuration file
    CheckConfig {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Validate {
            config,
            source,
            algorithm,
            train_days,
            test_days,
            persist,
            token,
            json,
        } => {
            let request = ValidateRequest {
                source,
                algorithm,
                train_days,
                test_days,
                persist,
            };
            with_service(&config, json, print_report, |service| {
                eprintln!("Validating {}/{}", request.source, request.algorithm);
                service.validate(&request, token.as_deref())
            })
        }
        Command::ValidateAll {
            config,
            source,
            token,
            json,
        } => with_service(&config, json, print_ranking, |service| {
            eprintln!("Validating every algorithm of {source}");
            service.validate_all(&source, token.as_deref())
        }),
        Command::Compare {
            config,
            source,
            algorithm,
            json,
        } => with_service(&config, json, print_comparison, |service| {
            eprintln!("Comparing {source}/{algorithm}");
            service.compare(&source, &algorithm)
        }),
        Command::Results { config, json } => {
            with_service(&config, json, print_summaries, |service| service.results())
        }
        Command::CheckConfig { config } => run_check_config(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|err| {
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

/// Adapters selected by the config file. `[csv] dir` wins over `[sqlite]`
/// for market data; results are only stored in sqlite.
pub struct Ports {
    csv: Option<CsvAdapter>,
    #[cfg(feature = "sqlite")]
    sqlite: Option<SqliteAdapter>,
    auth: SharedSecretAuth,
    cache: MemoryCache,
    settings: WalkForwardConfig,
    cache_ttl: Duration,
}

impl Ports {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, PicklabError> {
        let settings = walk_forward_config(config)?;

        let csv = match config.get_string("csv", "dir") {
            Some(_) => Some(CsvAdapter::from_config(config)?),
            None => None,
        };

        #[cfg(feature = "sqlite")]
        let sqlite = match config.get_string("sqlite", "path") {
            Some(_) => {
                let adapter = SqliteAdapter::from_config(config)?;
                adapter.initialize_schema()?;
                Some(adapter)
            }
            None => None,
        };

        Ok(Ports {
            csv,
            #[cfg(feature = "sqlite")]
            sqlite,
            auth: SharedSecretAuth::from_config(config),
            cache: MemoryCache::new(),
            settings,
            cache_ttl: cache_ttl(config),
        })
    }

    fn data(&self) -> Result<&dyn MarketDataPort, PicklabError> {
        if let Some(csv) = &self.csv {
            return Ok(csv);
        }
        #[cfg(feature = "sqlite")]
        if let Some(sqlite) = &self.sqlite {
            return Ok(sqlite);
        }
        Err(PicklabError::ConfigMissing {
            section: "csv".into(),
            key: "dir".into(),
        })
    }

    pub fn service(&self) -> Result<ValidationService<'_>, PicklabError> {
        let service = ValidationService::new(self.data()?, &self.auth, &self.cache, self.settings.clone())
            .with_cache_ttl(self.cache_ttl);
        #[cfg(feature = "sqlite")]
        if let Some(sqlite) = &self.sqlite {
            return Ok(service.with_store(sqlite));
        }
        Ok(service)
    }
}

fn with_service<T, F, P>(config_path: &Path, json: bool, print: P, action: F) -> ExitCode
where
    T: Serialize,
    F: FnOnce(&ValidationService<'_>) -> Result<T, PicklabError>,
    P: FnOnce(&T),
{
    eprintln!("Loading config from {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let result = Ports::from_config(&config).and_then(|ports| {
        let service = ports.service()?;
        action(&service)
    });
    emit(result, json, print)
}

fn emit<T: Serialize>(result: Result<T, PicklabError>, json: bool, print: impl FnOnce(&T)) -> ExitCode {
    let code = match &result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => e.into(),
    };

    if json {
        match serde_json::to_string_pretty(&ApiResponse::from(result)) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                let err = PicklabError::from(e);
                eprintln!("error: {err}");
                return (&err).into();
            }
        }
    } else {
        match &result {
            Ok(data) => print(data),
            Err(e) => eprintln!("error: {e}"),
        }
    }
    code
}

fn print_report(report: &ValidationReport) {
    let summary = &report.result.summary;
    println!(
        "{}/{}  train={}d test={}d",
        report.source, report.algorithm, report.result.train_days, report.result.test_days
    );

    if let ValidationStatus::InsufficientData {
        available_days,
        required_days,
    } = summary.status
    {
        println!("  insufficient data: {available_days} days of picks, need {required_days}");
        return;
    }

    for fold in &report.result.folds {
        let (params, is_return) = match &fold.in_sample {
            Some(opt) => (opt.params.to_string(), format!("{:.2}%", opt.metrics.avg_return)),
            None => ("no eligible cell".to_string(), "-".to_string()),
        };
        let oos_return = fold
            .out_of_sample
            .as_ref()
            .map_or("-".to_string(), |m| format!("{:.2}%", m.avg_return));
        println!(
            "  fold {:>2}  {}..{}  {}..{}  {:<28} IS {:>8} OOS {:>8} ({} trades) eff {:.2}",
            fold.index,
            fold.train.start,
            fold.train.end,
            fold.test.start,
            fold.test.end,
            params,
            is_return,
            oos_return,
            fold.oos_trades(),
            fold.efficiency
        );
    }

    println!(
        "  folds: {} ({} valid)  OOS trades: {}",
        summary.total_folds, summary.valid_folds, summary.total_oos_trades
    );
    println!(
        "  avg return IS {:.2}% / OOS {:.2}%  win rate IS {:.1}% / OOS {:.1}%",
        summary.avg_is_return,
        summary.avg_oos_return,
        summary.avg_is_win_rate,
        summary.avg_oos_win_rate
    );
    println!(
        "  efficiency {:.2}{}",
        summary.avg_efficiency,
        if summary.overfitting { "  OVERFITTING" } else { "" }
    );
    match &summary.robust_params {
        Some(p) => println!("  robust params: {p}"),
        None => println!("  robust params: none"),
    }
    if report.persisted {
        eprintln!("Results stored");
    }
}

fn print_ranking(reports: &Vec<ValidationReport>) {
    for (rank, report) in reports.iter().enumerate() {
        let s = &report.result.summary;
        println!(
            "{:>2}. {:<20} efficiency {:>6.2}  valid folds {:>2}  OOS avg {:>6.2}%{}",
            rank + 1,
            report.algorithm,
            s.avg_efficiency,
            s.valid_folds,
            s.avg_oos_return,
            if s.overfitting { "  OVERFITTING" } else { "" }
        );
    }
    eprintln!("{} algorithms validated", reports.len());
}

fn print_comparison(cmp: &Comparison) {
    println!("{}/{}", cmp.source, cmp.algorithm);
    match &cmp.naive {
        Some(n) => println!(
            "  naive optimum: {}  avg {:.2}% over {} trades",
            n.params, n.metrics.avg_return, n.metrics.total_trades
        ),
        None => println!("  naive optimum: none"),
    }
    println!(
        "  walk-forward:  OOS avg {:.2}%  efficiency {:.2}",
        cmp.walk_forward.summary.avg_oos_return, cmp.walk_forward.summary.avg_efficiency
    );
    println!("  gap: {:.2} points", cmp.return_gap);
    println!("\n{}", cmp.recommendation);
}

fn print_summaries(summaries: &Vec<StoredSummary>) {
    if summaries.is_empty() {
        eprintln!("No stored results");
        return;
    }
    for s in summaries {
        println!(
            "{}/{}  train={}d test={}d  folds {} ({} valid)  efficiency {:.2}{}",
            s.source,
            s.algorithm,
            s.train_days,
            s.test_days,
            s.summary.total_folds,
            s.summary.valid_folds,
            s.summary.avg_efficiency,
            if s.summary.overfitting { "  OVERFITTING" } else { "" }
        );
    }
}

fn run_check_config(config_path: &Path) -> ExitCode {
    eprintln!("Checking config: {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let settings = match walk_forward_config(&config) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    eprintln!("\nValidation windows:");
    eprintln!("  train_days: {}", settings.train_days);
    eprintln!("  test_days:  {}", settings.test_days);
    eprintln!("  initial_capital: {}", settings.initial_capital);

    eprintln!("\nCosts:");
    eprintln!("  slippage_pct: {}", settings.base_params.slippage_pct);
    eprintln!("  commission: {}", settings.base_params.commission);
    eprintln!("  position_size_pct: {}", settings.base_params.position_size_pct);

    eprintln!("\nGrid ({} cells):", settings.grid.size());
    eprintln!("  take_profit: {:?}", settings.grid.take_profit);
    eprintln!("  stop_loss: {:?}", settings.grid.stop_loss);
    eprintln!("  max_hold_days: {:?}", settings.grid.max_hold_days);

    if config.get_string("csv", "dir").is_none() && config.get_string("sqlite", "path").is_none() {
        eprintln!("\nwarning: no [csv] dir or [sqlite] path configured");
    }

    eprintln!("\nConfiguration is valid");
    ExitCode::SUCCESS
}
