// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::error;

use vaultkeeper::clock::system_clock;
use vaultkeeper::config::{init_tracing, Config};
use vaultkeeper::discovery::DiscoveryWatcher;
use vaultkeeper::selector::{Selector, SmartWeights};
use vaultkeeper::store::Store;
use vaultkeeper::supervisor::{RunRequest, Supervisor, SupervisorError};
use vaultkeeper::tool::Tool;
use vaultkeeper::usage_fetch::{HttpUsageClient, UsageFetcher};
use vaultkeeper::vault::Vault;

#[tokio::main]
async fn main() {
    // reqwest's `rustls-no-provider` feature leaves TLS provider
    // selection to the binary; install one before any HTTPS usage
    // fetch runs.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e}");
        std::process::exit(2);
    }

    init_tracing(&config);

    let Some(tool) = Tool::parse_tag(&config.tool) else {
        eprintln!("error: unknown tool {:?} (expected codex, claude, or gemini)", config.tool);
        std::process::exit(2);
    };

    let clock = system_clock();
    let vault = Vault::new(config.resolved_vault_root(), clock.clone());
    let activity_log = config.resolved_data_dir().join("activity.jsonl");
    let store = match Store::open(&config.resolved_db_path(), Some(activity_log)).await {
        Ok(s) => s,
        Err(e) => {
            error!("fatal: failed to open state store: {e}");
            std::process::exit(1);
        }
    };
    let selector = Selector::new(SmartWeights::default());
    let usage_fetcher = config.precheck.then(|| UsageFetcher::new(HttpUsageClient::new()));

    let supervisor = Supervisor {
        config: &config,
        store: &store,
        vault: &vault,
        selector: &selector,
        usage_fetcher: usage_fetcher.as_ref(),
        clock,
    };

    let mut request = RunRequest::new(tool);
    request.extra_args = config.args.clone();

    let cancel = CancellationToken::new();
    let cancel_watch = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_watch.cancel();
        }
    });

    let discovery = DiscoveryWatcher::new(tool);
    let outcome = tokio::select! {
        outcome = supervisor.run_wrap_session(&request, &cancel) => outcome,
        _ = discovery.run(&vault, cancel.clone()) => Err(SupervisorError::Cancelled),
    };
    cancel.cancel();

    match outcome {
        Ok(outcome) => std::process::exit(outcome.exit_code),
        Err(e) => {
            error!("fatal: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
