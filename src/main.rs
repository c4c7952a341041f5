use std::sync::Arc;

use chrono::{Local, NaiveDate};
use clap::{CommandFactory, Parser};
use log::{error, info};
use tokio_util::sync::CancellationToken;

use pagewatch::config::{
    self, marked_url_args, parse_cutoff_date, separate_args, CrawlConfig, Opt,
};
use pagewatch::export::save_db_content_to_disk;
use pagewatch::logging::init_logger;
use pagewatch::run::run_crawl;
use pagewatch::server;
use pagewatch::storage::Store;
use pagewatch::urlutil::parse_base_url;
use pagewatch::validation::Validator;

#[tokio::main]
async fn main() {
    let opt = Opt::parse();

    if opt.version {
        println!("Version {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    if let Err(e) = init_logger(opt.verbose) {
        eprintln!("failed to initialize logger: {e}");
    }

    let code = run(opt).await;
    std::process::exit(code);
}

async fn run(opt: Opt) -> i32 {
    let mut v = Validator::new();
    config::validate_dsn(&mut v, &opt.db_dsn);

    if opt.server {
        if !v.is_valid() {
            print_flag_errors(&v);
            return 1;
        }
        return run_server(&opt).await;
    }

    // every other mode needs a base URL
    let raw_base = opt.baseurl.clone().unwrap_or_default();
    if raw_base.trim().is_empty() {
        v.add_error("baseurl", "must be provided");
        print_flag_errors(&v);
        return 1;
    }
    let (base_url, base) = match parse_base_url(&raw_base) {
        Ok(parsed) => parsed,
        Err(e) => {
            v.add_error("baseurl", &format!("could not parse base URL: {e}"));
            print_flag_errors(&v);
            return 1;
        }
    };

    if opt.db2disk {
        validate_export_flags(&mut v, &opt);
        if !v.is_valid() {
            print_flag_errors(&v);
            return 1;
        }
        return run_export(&opt, &base).await;
    }

    let cfg = CrawlConfig {
        base_url,
        base,
        workers: opt.n,
        idle_timeout: opt.idle_time,
        request_delay: opt.req_delay,
        retry_times: opt.retry,
        update_days: opt.days,
        user_agent: opt.ua.clone(),
        marked_urls: marked_url_args(&opt.murls),
        ignore_patterns: separate_args(&opt.ignore),
        update_hrefs: opt.update_hrefs,
    };
    cfg.validate(&mut v);
    if !v.is_valid() {
        print_flag_errors(&v);
        return 1;
    }

    run_crawl_mode(&opt, cfg).await
}

async fn run_server(opt: &Opt) -> i32 {
    let store = match Store::connect(&opt.db_dsn, config::SQLITE_DB_FILE).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("{e}");
            return 1;
        }
    };
    info!("Store connection OK");

    let shutdown = CancellationToken::new();
    spawn_signal_listener(shutdown.clone());

    let result = server::serve(Arc::clone(&store), shutdown).await;
    store.close().await;
    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("{e}");
            3
        }
    }
}

async fn run_export(opt: &Opt, base: &str) -> i32 {
    let cutoff = match parse_cutoff_date(opt.date.as_deref()) {
        Ok(cutoff) => cutoff,
        Err(e) => {
            error!("{e}");
            return 1;
        }
    };
    let save_path = opt.save_path();
    let marked = marked_url_args(&opt.murls);
    if marked.is_empty() {
        info!("Marked URLs list is empty, this will fetch all monitored URLs");
    }

    let store = match Store::connect(&opt.db_dsn, config::SQLITE_DB_FILE).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("{e}");
            return 1;
        }
    };
    info!("Store connection OK");

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    let result = save_db_content_to_disk(&store, base, &save_path, cutoff, &marked, &cancel).await;
    store.close().await;
    match result {
        Ok(files) => {
            info!("Transfer completed, {files} file(s) written");
            0
        }
        Err(e) => {
            error!("Error while saving to disk: {e}");
            1
        }
    }
}

async fn run_crawl_mode(opt: &Opt, cfg: CrawlConfig) -> i32 {
    log_run_options(&cfg);

    let store = match Store::connect(&opt.db_dsn, config::SQLITE_DB_FILE).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("{e}");
            return 1;
        }
    };
    info!("Store connection OK");

    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    let result = run_crawl(cfg, Arc::clone(&store), cancel, None).await;
    store.close().await;
    match result {
        Ok(report) => {
            info!(
                "Done: loaded {} URLs from store, {} workers, {:.2}s",
                report.loaded_from_store, report.workers, report.elapsed_seconds
            );
            0
        }
        Err(e) => {
            error!("{e}");
            e.exit_code()
        }
    }
}

/// Cancels `cancel` on SIGINT/SIGTERM. Workers drain within the grace
/// period; the queue sweeper inside the crawl stops new work immediately.
fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        let interrupted = wait_for_signal().await;
        if interrupted {
            info!("=============== SHUTDOWN INITIATED ===============");
            info!(
                "Will shutdown within {}s",
                config::SHUTDOWN_GRACE.as_secs()
            );
            cancel.cancel();
        }
    });
}

#[cfg(unix)]
async fn wait_for_signal() -> bool {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            error!("could not register SIGTERM handler: {e}");
            return false;
        }
    };
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.is_ok(),
        _ = term.recv() => true,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> bool {
    tokio::signal::ctrl_c().await.is_ok()
}

fn validate_export_flags(v: &mut Validator, opt: &Opt) {
    if let Some(date) = opt.date.as_deref() {
        match NaiveDate::parse_from_str(date, config::DATE_FORMAT) {
            Ok(parsed) => {
                v.check(
                    parsed <= Local::now().date_naive(),
                    "date",
                    "cannot be after today",
                );
            }
            Err(_) => v.add_error("date", "must be a valid YYYY-MM-DD date"),
        }
    }
    v.check(
        !opt.save_path().as_os_str().is_empty(),
        "path",
        "must be provided with 'db2disk' flag",
    );
}

fn print_flag_errors(v: &Validator) {
    eprintln!("Invalid flag values:");
    for (key, message) in v.errors() {
        eprintln!("{key:<9} : {message}");
    }
    eprintln!();
    let _ = Opt::command().print_help();
}

fn log_run_options(cfg: &CrawlConfig) {
    info!("Running crawler with the following options:");
    info!("{:<16}: {}", "Base URL", cfg.base);
    info!("{:<16}: {}", "User-Agent", cfg.user_agent);
    info!("{:<16}: {}", "Updating HREFs", cfg.update_hrefs);
    info!("{:<16}: {} day(s)", "Update interval", cfg.update_days);
    info!("{:<16}: {}", "Marked URL(s)", cfg.marked_urls.join(" "));
    info!("{:<16}: {}", "Ignored pattern", cfg.ignore_patterns.join(" "));
    info!("{:<16}: {}", "Crawler count", cfg.workers);
    info!("{:<16}: {:?}", "Idle time", cfg.idle_timeout);
    info!("{:<16}: {:?}", "Request delay", cfg.request_delay);
    if cfg.marked_urls.is_empty() {
        info!("Marked URLs list is empty, crawlers will only refresh URLs already set for monitoring");
    }
}
