use std::sync::Arc;

use anyhow::{Context, Result};
use quill_fun::{
    ext::{
        load_env_file, AlloyChain, CancelRequest, ChainPort, Config, DisabledNotifier, FunAction,
        LoopController, LoopSession, Notifier, QuillsApi, RunStatus, WalletMonitor, ENV_FILE,
    },
    primitives::utils::format_ether,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let env_loaded = load_env_file(ENV_FILE)?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    if env_loaded {
        tracing::debug!(path = ENV_FILE, "loaded environment file");
    }

    let config = Config::parse()?;
    let address = config.signer.address();

    let alloy_chain = AlloyChain::connect(
        &config.rpc_url,
        config.contract,
        config.signer.clone(),
        Some(config.receipt_timeout),
    )
    .context("failed to connect to RPC endpoint")?;
    match alloy_chain.chain_id().await {
        Ok(chain_id) => tracing::info!(chain_id, network = %config.network_name, "connected"),
        Err(e) => tracing::warn!(error = %e, "could not read chain id"),
    }
    let chain: Arc<dyn ChainPort> = Arc::new(alloy_chain);

    let wallet = Arc::new(WalletMonitor::new(chain.clone(), config.network_name.clone()));
    if let Ok(snapshot) = wallet.reload().await {
        tracing::info!(
            %address,
            balance = %snapshot.balance_ether(),
            network = %snapshot.network,
            "wallet loaded"
        );
    }

    let notifier: Arc<dyn Notifier> = if config.skip_mint {
        tracing::info!("mint notification disabled");
        Arc::new(DisabledNotifier)
    } else {
        let mut api = QuillsApi::new(config.api_url.as_str())?;
        api.login(&config.signer)
            .await
            .context("wallet login failed")?;
        Arc::new(api)
    };

    let action = FunAction::new(chain, notifier, wallet.subscribe(), config.spend_amount)
        .with_max_retries(config.max_retries);
    let session = Arc::new(LoopSession::new());
    let controller = LoopController::new(Arc::new(action), wallet.clone(), session.clone())
        .with_delay(config.delay);

    tokio::spawn(cancel_on_ctrl_c(session));

    tracing::info!(
        %address,
        iterations = config.iterations,
        spend = %format_ether(config.spend_amount),
        contract = %config.contract,
        "starting auto send"
    );
    let report = controller.run(config.iterations).await?;

    match report.status {
        RunStatus::Completed => tracing::info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "all iterations done"
        ),
        RunStatus::Stopped { at_iteration } => tracing::info!(
            at_iteration,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "stopped by user"
        ),
    }
    Ok(())
}

/// First Ctrl-C stops the run cooperatively, a second one exits at once.
async fn cancel_on_ctrl_c(session: Arc<LoopSession>) {
    while tokio::signal::ctrl_c().await.is_ok() {
        match session.request_cancel() {
            CancelRequest::Requested => {
                tracing::info!("Ctrl-C received, press again to exit immediately");
            }
            CancelRequest::AlreadyRequested | CancelRequest::NotRunning => {
                tracing::warn!("exiting");
                std::process::exit(130);
            }
        }
    }
}
