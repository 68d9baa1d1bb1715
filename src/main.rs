use clap::{Parser, ValueEnum};
use primary_keeper::{
    ConsulConfig, ConsulCoordinator, FailoverEngineConfig, LeaderInfo, RedisDataStore, SidecarOptions,
};
use slog::Drain;
use std::process;
use std::sync::Arc;

const EXIT_STARTUP_FAILURE: i32 = 2;

#[derive(Parser)]
#[command(name = "primary-keeper")]
#[command(about = "Keeps the local Redis pointed at the primary elected through Consul", long_about = None)]
struct Args {
    /// Address of the local data store (host:port).
    #[arg(long, env = "REDIS_ADDR", default_value = "127.0.0.1:6379")]
    redis_addr: String,

    /// Address peers use to replicate from this node (host:port). Defaults to --redis-addr.
    #[arg(long, env = "ANNOUNCE_ADDR")]
    announce_addr: Option<String>,

    /// Per-command timeout against the data store.
    #[arg(long, env = "REDIS_COMMAND_TIMEOUT", default_value = "2s")]
    redis_command_timeout: humantime::Duration,

    /// Consul agent HTTP address.
    #[arg(long, env = "CONSUL_HTTP_ADDR", default_value = "http://127.0.0.1:8500")]
    consul_http_addr: String,

    #[arg(long, env = "CONSUL_HTTP_TOKEN", hide_env_values = true)]
    consul_token: Option<String>,

    /// Name the data store is registered under.
    #[arg(long, env = "CONSUL_SERVICE_NAME", default_value = "redis")]
    consul_service_name: String,

    /// KV key of the primary lock. Defaults to `<service name>/leader`.
    #[arg(long, env = "CONSUL_LOCK_KEY")]
    consul_lock_key: Option<String>,

    #[arg(long, env = "CONSUL_LOCK_SESSION_TTL", default_value = "15s")]
    consul_session_ttl: humantime::Duration,

    /// How long one leader watch may block on the agent.
    #[arg(long, env = "CONSUL_WATCH_WAIT", default_value = "10s")]
    consul_watch_wait: humantime::Duration,

    #[arg(long, env = "CONSUL_HTTP_TIMEOUT", default_value = "15s")]
    consul_http_timeout: humantime::Duration,

    /// Period of the uptime and replication checks.
    #[arg(long, env = "HEALTHCHECK_INTERVAL", default_value = "5s")]
    healthcheck_interval: humantime::Duration,

    /// Period of the startup check waiting for the data store to finish loading.
    #[arg(long, env = "READINESS_INTERVAL", default_value = "1s")]
    readiness_interval: humantime::Duration,

    /// Delay between attempts at taking the primary lock.
    #[arg(long, env = "LEADERSHIP_RETRY_INTERVAL", default_value = "5s")]
    leadership_retry_interval: humantime::Duration,

    /// Consecutive connection errors tolerated before the sidecar exits.
    #[arg(long, env = "ALLOWED_CONNECTION_ERRORS", default_value_t = 3)]
    allowed_connection_errors: u32,

    #[arg(long, env = "LOG_LEVEL", value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogLevel {
    Critical,
    Error,
    Warning,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for slog::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Critical => slog::Level::Critical,
            LogLevel::Error => slog::Level::Error,
            LogLevel::Warning => slog::Level::Warning,
            LogLevel::Info => slog::Level::Info,
            LogLevel::Debug => slog::Level::Debug,
            LogLevel::Trace => slog::Level::Trace,
        }
    }
}

#[tokio::main]
async fn main() {
    let exit_code = run(Args::parse()).await;
    process::exit(exit_code);
}

async fn run(args: Args) -> i32 {
    let announce = match args
        .announce_addr
        .as_deref()
        .unwrap_or(&args.redis_addr)
        .parse::<LeaderInfo>()
    {
        Ok(announce) => announce,
        Err(e) => {
            eprintln!("Invalid announce address: {}", e);
            return EXIT_STARTUP_FAILURE;
        }
    };

    // Flushes buffered log records when dropped, so it must outlive everything that logs.
    let (logger, _log_guard) = create_root_logger(args.log_level.into(), &announce);
    slog::info!(logger, "Starting");

    let data_store = Arc::new(RedisDataStore::new(
        logger.clone(),
        args.redis_addr.clone(),
        args.redis_command_timeout.into(),
    ));

    let mut consul_config = ConsulConfig::new(
        consul_url(&args.consul_http_addr),
        args.consul_service_name.clone(),
        announce.clone(),
    );
    consul_config.token = args.consul_token.clone();
    if let Some(lock_key) = &args.consul_lock_key {
        consul_config.lock_key = lock_key.clone();
    }
    consul_config.session_ttl = args.consul_session_ttl.into();
    consul_config.watch_wait = args.consul_watch_wait.into();
    consul_config.request_timeout = args.consul_http_timeout.into();
    consul_config.set_check_ttl_for_interval(args.healthcheck_interval.into());

    let coordinator = match ConsulCoordinator::new(logger.clone(), consul_config) {
        Ok(coordinator) => Arc::new(coordinator),
        Err(e) => {
            slog::crit!(logger, "Failed to set up coordination client: {}", e);
            return EXIT_STARTUP_FAILURE;
        }
    };

    let config = FailoverEngineConfig {
        data_store,
        coordinator,
        announce,
        logger: logger.clone(),
        options: SidecarOptions {
            health_check_interval: Some(args.healthcheck_interval.into()),
            readiness_poll_interval: Some(args.readiness_interval.into()),
            allowed_connection_errors: Some(args.allowed_connection_errors),
            leadership_retry_interval: Some(args.leadership_retry_interval.into()),
        },
    };

    match primary_keeper::run_failover_engine(config).await {
        Ok(kind) => {
            slog::info!(logger, "Exiting: {:?}", kind);
            kind.exit_code()
        }
        Err(e) => {
            slog::crit!(logger, "Failed to start: {}", e);
            EXIT_STARTUP_FAILURE
        }
    }
}

/// Consul tooling accepts a bare `host:port` in `CONSUL_HTTP_ADDR`.
fn consul_url(addr: &str) -> String {
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    }
}

fn create_root_logger(level: slog::Level, announce: &LeaderInfo) -> (slog::Logger, slog_async::AsyncGuard) {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let (drain, guard) = slog_async::Async::new(drain).build_with_guard();
    let drain = slog::LevelFilter::new(drain.fuse(), level).fuse();

    (slog::Logger::root(drain, slog::o!("Node" => announce.to_string())), guard)
}
