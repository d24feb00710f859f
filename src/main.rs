use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use issuance_limits::bucket::bucket;
use issuance_limits::cancel::Cancel;
use issuance_limits::config::Config;
use issuance_limits::db::{begin, create_pool, init_db, queries, DbPool};
use issuance_limits::error::LimitError;
use issuance_limits::models::TimeWindow;
use issuance_limits::suffix::{SuffixRegistry, SuffixRules};

#[derive(Parser, Debug)]
#[command(name = "issuance-limits")]
#[command(about = "Inspect and maintain certificate issuance rate-limit counters")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply pending schema migrations
    Migrate,

    /// Print the rate-limit bucket of a name
    Bucket { name: String },

    /// Record one issued certificate covering NAMES
    RecordIssuance {
        #[arg(long, value_parser = parse_time)]
        at: DateTime<Utc>,
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Record one new order for ACCOUNT
    RecordOrder {
        #[arg(long, value_parser = parse_time)]
        at: DateTime<Utc>,
        account: i64,
    },

    /// Count issuances for the bucket of NAME in [from, to)
    CountIssuances {
        #[arg(long, value_parser = parse_time)]
        from: DateTime<Utc>,
        #[arg(long, value_parser = parse_time)]
        to: DateTime<Utc>,
        name: String,
    },

    /// Count new orders for ACCOUNT in [from, to)
    CountOrders {
        #[arg(long, value_parser = parse_time)]
        from: DateTime<Utc>,
        #[arg(long, value_parser = parse_time)]
        to: DateTime<Utc>,
        account: i64,
    },

    /// List the issuance entries for the bucket of NAME in [from, to)
    Entries {
        #[arg(long, value_parser = parse_time)]
        from: DateTime<Utc>,
        #[arg(long, value_parser = parse_time)]
        to: DateTime<Utc>,
        name: String,
    },
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {}", e))
}

fn load_suffixes(config: &Config) -> Result<SuffixRegistry, Box<dyn std::error::Error>> {
    let path = config
        .public_suffix_list
        .as_deref()
        .ok_or("PUBLIC_SUFFIX_LIST must point to a public suffix list file")?;
    let rules = SuffixRules::from_file(path)?;
    tracing::info!("Loaded {} public suffix rules from {}", rules.len(), path);
    Ok(SuffixRegistry::new(rules))
}

fn cancel_for(config: &Config) -> Cancel {
    match config.query_timeout {
        Some(timeout) => Cancel::none().with_timeout(timeout),
        None => Cancel::none(),
    }
}

fn run(command: Command, config: &Config, pool: &DbPool) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let cancel = cancel_for(config);

    let output = match command {
        Command::Migrate => {
            let conn = pool.get()?;
            init_db(&conn)?;
            json!({ "migrated": true })
        }
        Command::Bucket { name } => {
            let suffixes = load_suffixes(config)?.current();
            json!({ "name": name, "bucket": bucket(&suffixes, &name)? })
        }
        Command::RecordIssuance { at, names } => {
            let suffixes = load_suffixes(config)?.current();
            let mut conn = pool.get()?;
            let tx = begin(&mut conn, config.isolation)?;
            let buckets = queries::record_issuance(&tx, &suffixes, &names[..], at, &cancel)?;
            tx.commit()?;
            json!({ "buckets": buckets, "at": at })
        }
        Command::RecordOrder { at, account } => {
            let mut conn = pool.get()?;
            let tx = begin(&mut conn, config.isolation)?;
            queries::record_order(&tx, account, at, &cancel)?;
            tx.commit()?;
            json!({ "account": account, "at": at })
        }
        Command::CountIssuances { from, to, name } => {
            let suffixes = load_suffixes(config)?.current();
            let window = TimeWindow::new(from, to)?;
            let conn = pool.get()?;
            let count = queries::count_issuances(&conn, &suffixes, &name, &window, &cancel)?;
            json!({ "bucket": bucket(&suffixes, &name)?, "window": window, "count": count })
        }
        Command::CountOrders { from, to, account } => {
            let window = TimeWindow::new(from, to)?;
            let conn = pool.get()?;
            let count = queries::count_orders(&conn, account, &window, &cancel)?;
            json!({ "account": account, "window": window, "count": count })
        }
        Command::Entries { from, to, name } => {
            let suffixes = load_suffixes(config)?.current();
            let window = TimeWindow::new(from, to)?;
            let conn = pool.get()?;
            let entries = queries::list_issuance_entries(&conn, &suffixes, &name, &window, &cancel)?;
            json!({ "entries": entries })
        }
    };

    Ok(output)
}

/// sysexits `EX_TEMPFAIL`: the same command may succeed if run again.
const EXIT_TEMPFAIL: i32 = 75;

fn exit_code(err: &(dyn std::error::Error + 'static)) -> i32 {
    match err.downcast_ref::<LimitError>() {
        Some(e) if e.is_transient() => EXIT_TEMPFAIL,
        _ => 1,
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "issuance_limits=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();
    tracing::debug!(isolation = config.isolation.as_ref(), "Loaded configuration");

    let pool = match create_pool(&config.database_path, config.pool_size) {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("ERROR: failed to open {}: {}", config.database_path, e);
            std::process::exit(1);
        }
    };

    // Every command except `migrate` expects an up-to-date schema
    if !matches!(cli.command, Command::Migrate) {
        let migrated = pool
            .get()
            .map_err(|e| e.to_string())
            .and_then(|conn| init_db(&conn).map_err(|e| e.to_string()));
        if let Err(e) = migrated {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    }

    match run(cli.command, &config, &pool) {
        Ok(output) => println!("{}", output),
        Err(e) => {
            let code = exit_code(&*e);
            if code == EXIT_TEMPFAIL {
                eprintln!("ERROR: {} (transient, retry later)", e);
            } else {
                eprintln!("ERROR: {}", e);
            }
            std::process::exit(code);
        }
    }
}
