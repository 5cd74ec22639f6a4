use clap::Parser;
use snapshot_migrate::config::{LogFormat, DATABASE_URL_ENV};
use snapshot_migrate::utils::error::ErrorSeverity;
use snapshot_migrate::utils::{logger, validation::Validate};
use snapshot_migrate::{CliConfig, Loader, LoaderConfig, MigrateError, MigrationPlan, Overrides};

/// 啟動階段的錯誤：尚未處理任何資料表就結束
fn exit_with(e: MigrateError) -> ! {
    tracing::error!(
        "❌ Startup failed: {} (Category: {:?}, Severity: {:?})",
        e,
        e.category(),
        e.severity()
    );
    eprintln!("❌ {}", e.user_friendly_message());
    eprintln!("💡 {}", e.recovery_suggestion());

    let exit_code = match e.severity() {
        ErrorSeverity::Critical => 1,
        ErrorSeverity::High => 3,
        ErrorSeverity::Low | ErrorSeverity::Medium => 2,
    };
    std::process::exit(exit_code);
}

#[tokio::main]
async fn main() {
    let cli = CliConfig::parse();

    match cli.log_format {
        LogFormat::Text => logger::init_cli_logger(cli.verbose),
        LogFormat::Json => logger::init_json_logger(cli.verbose),
    }

    tracing::info!("Starting snapshot-migrate");
    tracing::debug!(
        "CLI options: snapshot_dir={:?} schema={:?} plan={:?} batch_size={:?}",
        cli.snapshot_dir,
        cli.schema,
        cli.plan,
        cli.batch_size
    );

    // 載入計畫
    let plan = match &cli.plan {
        Some(path) => {
            tracing::info!("📁 Loading plan from: {}", path);
            MigrationPlan::from_file(path).unwrap_or_else(|e| exit_with(e))
        }
        None => MigrationPlan::builtin(),
    };
    if let Err(e) = plan.validate() {
        exit_with(e);
    }

    // 連線字串缺少時，在碰任何資料表之前結束
    let config = match LoaderConfig::resolve(&Overrides::from(&cli), &plan) {
        Ok(config) => config,
        Err(e @ MigrateError::MissingConfigError { .. }) => {
            eprintln!(
                "❌ Target database is not configured: set {} or pass --database-url",
                DATABASE_URL_ENV
            );
            exit_with(e);
        }
        Err(e) => exit_with(e),
    };
    if let Err(e) = config.validate() {
        exit_with(e);
    }

    if !std::path::Path::new(&config.snapshot_dir).is_dir() {
        tracing::warn!(
            "Snapshot directory {} does not exist; every table will be skipped",
            config.snapshot_dir
        );
    }

    let target = config.target().unwrap_or_else(|e| exit_with(e));
    let loader = Loader::new(
        config.snapshot_reader(),
        target,
        plan.dependency_order(),
        plan.cleaning_plan(),
    );

    let report = loader.run().await;

    println!("{}", report.render());
    if cli.log_format == LogFormat::Json {
        tracing::info!(summary = %report.summary_json(), "Import finished");
    }
}
