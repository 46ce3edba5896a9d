use anyhow::Context;
use clap::Parser;
use fips_etl::core::ConfigProvider;
use fips_etl::utils::error::ErrorSeverity;
use fips_etl::utils::{logger, validation::Validate};
use fips_etl::{EtlEngine, FipsPipeline, LocalStorage, TomlConfig};
use std::sync::atomic::Ordering;

#[derive(Parser)]
#[command(name = "toml-etl")]
#[command(about = "FIPS resolution driven by a TOML configuration file")]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "fips-config.toml")]
    config: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON log lines for log collectors
    #[arg(long)]
    json_logs: bool,

    /// Override monitoring setting from config
    #[arg(long)]
    monitor: Option<bool>,

    /// Override fuzzy threshold from config
    #[arg(long)]
    fuzzy_threshold: Option<f64>,

    /// Skip both oracles even if configured
    #[arg(long)]
    offline: bool,

    /// Dry run - show what would be processed without executing
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日誌
    if args.json_logs {
        logger::init_json_logger(args.verbose);
    } else {
        logger::init_cli_logger(args.verbose);
    }

    tracing::info!("🚀 Starting TOML-based FIPS resolution");
    tracing::info!("📁 Loading configuration from: {}", args.config);

    let mut config = match TomlConfig::from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", args.config, e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(1);
        }
    };

    // 應用命令列覆蓋設定
    if let Some(threshold) = args.fuzzy_threshold {
        config.matching.fuzzy_threshold = threshold;
        tracing::info!("🔧 Fuzzy threshold overridden to: {}", threshold);
    }
    if args.offline {
        config.augmentation.cleanup = None;
        config.augmentation.places = None;
        tracing::info!("🔧 Offline mode: oracles disabled");
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    tracing::info!("✅ Configuration loaded and validated successfully");

    display_config_summary(&config, &args);

    if args.dry_run {
        tracing::info!("🔍 DRY RUN MODE - No actual processing will occur");
        perform_dry_run(&config);
        return Ok(());
    }

    let monitor_enabled = args.monitor.unwrap_or_else(|| config.monitoring_enabled());
    if monitor_enabled {
        tracing::info!("🔍 System monitoring enabled");
    }

    let pipeline = FipsPipeline::new(LocalStorage::current_dir(), config)
        .context("failed to set up the FIPS pipeline")?;
    let stop = pipeline.stop_flag();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("⚠️ Interrupt received, finishing in-flight oracle calls");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let engine = EtlEngine::new_with_monitoring(pipeline, monitor_enabled);

    match engine.run().await {
        Ok(output_path) => {
            tracing::info!("✅ FIPS resolution completed successfully!");
            tracing::info!("📁 Output saved to: {}", output_path);
            println!("✅ FIPS resolution completed successfully!");
            println!("📁 Output saved to: {}", output_path);
        }
        Err(e) => {
            tracing::error!(
                "❌ FIPS resolution failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

fn display_config_summary(config: &TomlConfig, args: &Args) {
    println!("📋 Configuration Summary:");
    println!("  Run: {}", config.run.name);
    if let Some(description) = &config.run.description {
        println!("  Description: {}", description);
    }
    println!("  Input: {}", config.input_path());
    println!("  Output: {}", config.output_path());
    println!("  Formats: {}", config.load.output_formats.join(", "));
    println!("  Fuzzy Threshold: {}", config.matching.fuzzy_threshold);
    println!("  Oracles Enabled: {}", config.augmentation.is_enabled());

    if args.dry_run {
        println!("  🔍 DRY RUN MODE ENABLED");
    }

    println!();
}

fn perform_dry_run(config: &TomlConfig) {
    println!("🔍 Dry Run Analysis:");
    println!();

    let columns = config.columns();
    println!("📥 Input:");
    println!("  Path: {}", config.input_path());
    println!("  Delimiter: {:?}", config.input_delimiter() as char);
    println!(
        "  Columns: city={} county={} state={} zip={}",
        columns.city,
        columns.county.as_deref().unwrap_or("(none)"),
        columns.state,
        columns.zip
    );

    let tables = config.reference_tables();
    println!();
    println!("📚 Reference Tables:");
    println!("  Counties: {}", tables.county_table);
    println!("  Places: {}", tables.place_table);
    println!("  ZIP crosswalk: {}", tables.zip_table);

    println!();
    println!("⚙️ Matching:");
    println!("  Fuzzy threshold: {}", config.matching.fuzzy_threshold);
    println!("  Typo rules: {}", config.matching.typo_rules.len());

    let augmentation = &config.augmentation;
    println!();
    println!("🌐 Oracles:");
    match &augmentation.cleanup {
        Some(cleanup) => println!("  Cleanup: {}", cleanup.endpoint),
        None => println!("  Cleanup: disabled"),
    }
    match &augmentation.places {
        Some(places) => println!("  Places: {}", places.endpoint),
        None => println!("  Places: disabled"),
    }
    if augmentation.is_enabled() {
        println!(
            "  Cache: {}",
            augmentation.cache_path.as_deref().unwrap_or("(in-memory)")
        );
        println!("  Rate: {} req/s", augmentation.requests_per_second);
    }

    println!();
    println!("💾 Output Configuration:");
    println!("  Path: {}", config.output_path());
    println!("  Formats: {}", config.load.output_formats.join(", "));
    if config.compress_output() {
        println!("  Compression: fips_output.zip (ZIP)");
    }

    println!();
    println!("✅ Dry run analysis complete. Use --verbose for more details during actual run.");
}
