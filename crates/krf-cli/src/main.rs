use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use krf_audit::{AuditSink, JsonlAuditSink, TinybirdClient, VerifyResult};
use krf_config::secrets::{resolve_secrets, ResolvedSecrets};
use krf_config::{AuditSinkKind, RefillSettings, UnusedKeyPolicy};
use krf_refill::pg::{PgAuditSink, PgKeyStore};
use krf_refill::{plan_refill, AuditEmitter, RefillRun};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "krf")]
#[command(about = "Daily key quota refill", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Print how a date classifies for refill purposes
    Calendar {
        /// RFC 3339 timestamp or YYYY-MM-DD (midnight UTC). Defaults to now.
        #[arg(long)]
        at: Option<String>,

        /// IANA zone used to derive the civil date
        #[arg(long, default_value = "UTC")]
        tz: String,
    },

    /// Refill commands
    Refill {
        #[command(subcommand)]
        cmd: RefillCmd,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply embedded SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum RefillCmd {
    /// List keys that a run at `--at` would refill. Mutates nothing.
    Plan {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Reference timestamp (RFC 3339 or YYYY-MM-DD). Defaults to now.
        #[arg(long)]
        at: Option<String>,
    },

    /// Execute the refill run and print its report as JSON.
    Run {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Reference timestamp (RFC 3339 or YYYY-MM-DD). Defaults to now.
        #[arg(long)]
        at: Option<String>,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of a JSONL audit log.
    Verify {
        #[arg(long)]
        path: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = krf_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = krf_db::status(&pool).await?;
                    println!("db_ok={} has_keys_table={}", s.ok, s.has_keys_table);
                }
                DbCmd::Migrate => {
                    krf_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = krf_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Calendar { at, tz } => {
            let reference = parse_reference(at.as_deref())?;
            let tz: Tz = tz
                .parse()
                .map_err(|e| anyhow!("invalid --tz '{}': {}", tz, e))?;
            let (local_date, class) = krf_refill::classify_at(reference, tz);
            println!("reference_ts={}", reference.to_rfc3339());
            println!("local_date={}", local_date);
            println!("today={}", class.today);
            println!("last_day_of_month={}", class.last_day_of_month);
            println!("end_of_month={}", class.is_end_of_month);
            println!("day_condition={}", serde_json::to_string(&class.day_condition())?);
        }

        Commands::Refill { cmd } => match cmd {
            RefillCmd::Plan { config_paths, at } => {
                let settings = load_settings(&config_paths)?;
                let reference = parse_reference(at.as_deref())?;
                let pool = krf_db::connect_from_env().await?;
                let store = PgKeyStore::new(pool);

                let plan = plan_refill(&store, settings.timezone, reference).await?;

                println!("reference_ts={}", plan.reference_ts.to_rfc3339());
                println!("local_date={}", plan.local_date);
                println!("end_of_month={}", plan.class.is_end_of_month);
                println!("due_count={}", plan.due.len());
                for k in &plan.due {
                    println!(
                        "due key_id={} workspace_id={} remaining={} refill_amount={}",
                        k.id,
                        k.workspace_id,
                        k.remaining,
                        k.refill_amount.unwrap_or_default()
                    );
                }
            }

            RefillCmd::Run { config_paths, at } => {
                let settings = load_settings(&config_paths)?;
                let secrets = resolve_secrets(&settings)?;
                let reference = parse_reference(at.as_deref())?;
                let pool = krf_db::connect_from_env().await?;
                let store = PgKeyStore::new(pool.clone());
                let sink = build_sink(&settings, secrets, pool)?;

                info!(sink = sink.sink_name(), timezone = %settings.timezone, "starting refill run");
                let report = RefillRun::new(&store, sink.as_ref())
                    .with_emitter(AuditEmitter::new(&settings.actor_id, &settings.location))
                    .with_timezone(settings.timezone)
                    .execute(reference)
                    .await?;

                println!("{}", serde_json::to_string_pretty(&report)?);

                if !report.is_clean() {
                    bail!(
                        "REFILL_RUN_INCOMPLETE: {} per-key failure(s) across {} candidate(s) (refilled={})",
                        report.failures.len(),
                        report.candidates,
                        report.refilled_key_ids.len()
                    );
                }
            }
        },

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => match krf_audit::verify_hash_chain(&path)? {
                VerifyResult::Valid { lines } => {
                    println!("audit_chain_valid=true lines={} path={}", lines, path);
                }
                VerifyResult::Broken { line, reason } => {
                    println!("audit_chain_valid=false line={} path={}", line, path);
                    bail!("AUDIT_CHAIN_BROKEN at line {}: {}", line, reason);
                }
            },
        },
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Load layered config, warn on unused keys, and build typed settings.
fn load_settings(config_paths: &[String]) -> Result<RefillSettings> {
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = krf_config::load_layered_yaml(&path_refs)?;

    let unused = krf_config::report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for p in &unused.unused_leaf_pointers {
        warn!(pointer = %p, "config key is not consumed by the refill job");
    }

    let settings = RefillSettings::from_config_json(&loaded.config_json)?;
    info!(config_hash = %loaded.config_hash, sink = settings.audit_sink.as_str(), "config loaded");
    Ok(settings)
}

fn build_sink(
    settings: &RefillSettings,
    secrets: ResolvedSecrets,
    pool: sqlx::PgPool,
) -> Result<Box<dyn AuditSink>> {
    let sink: Box<dyn AuditSink> = match settings.audit_sink {
        AuditSinkKind::Tinybird => {
            let token = secrets
                .tinybird_token
                .context("tinybird token missing after secret resolution")?;
            Box::new(TinybirdClient::new_with_base_url(
                token,
                settings.tinybird.base_url.clone(),
                settings.tinybird.datasource.clone(),
            )?)
        }
        AuditSinkKind::Jsonl => Box::new(JsonlAuditSink::open(
            &settings.jsonl.path,
            settings.jsonl.hash_chain,
        )?),
        AuditSinkKind::Postgres => Box::new(PgAuditSink::new(pool)),
    };
    Ok(sink)
}

/// RFC 3339 timestamp, or a bare date taken as midnight UTC. `None` is now.
fn parse_reference(at: Option<&str>) -> Result<DateTime<Utc>> {
    let Some(raw) = at.map(str::trim) else {
        return Ok(Utc::now());
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("--at must be RFC 3339 or YYYY-MM-DD, got '{}'", raw))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}
