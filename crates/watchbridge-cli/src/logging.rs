use anyhow::Result;
use std::io::{self, IsTerminal};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, time::ChronoUtc, MakeWriter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// 0 = info, 1 = debug with the HTTP stack kept at warn, 2+ = trace.
fn filter(verbose_level: u8, quiet: bool) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }
    let default = match verbose_level {
        0 => "info",
        1 => "debug,hyper=warn,reqwest=warn,rustls=warn,tokio_cron_scheduler=warn",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn json_requested() -> bool {
    std::env::var("RUST_LOG_JSON")
        .map(|v| v == "true")
        .unwrap_or_else(|_| !io::stdout().is_terminal())
}

fn install<W>(filter: EnvFilter, json: bool, ansi: bool, writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let registry = Registry::default().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_timer(ChronoUtc::rfc_3339()).with_writer(writer))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_ansi(ansi)
                    .with_writer(writer),
            )
            .init();
    }
}

pub fn init_logging(verbose_level: u8, quiet: bool) {
    install(filter(verbose_level, quiet), json_requested(), true, io::stderr);
}

/// Log to a daily-rotated file next to `log_file` (`watchbridge.log.2026-01-17`, ...).
///
/// The returned guard flushes the writer on drop; keep it alive for the
/// lifetime of the process.
pub fn init_file_logging(verbose_level: u8, quiet: bool, log_file: &Path) -> Result<WorkerGuard> {
    let dir = log_file
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Log file path has no parent directory"))?;
    std::fs::create_dir_all(dir)?;
    let file_name = log_file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow::anyhow!("Invalid log filename"))?;

    let appender = RollingFileAppender::new(Rotation::DAILY, dir, file_name);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    install(filter(verbose_level, quiet), json_requested(), false, writer);
    Ok(guard)
}
