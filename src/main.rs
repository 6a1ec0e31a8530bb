use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use mail_forward::auth::{OAuthCallback, OAuthClient};
use mail_forward::config::AppConfig;
use mail_forward::logging;
use mail_forward::mail::{ImapMailService, MailAuth, MailService};
use mail_forward::scheduler::ForwardScheduler;
use mail_forward::server::{ApiServer, ApiState, api_routes};
use mail_forward::store::{LibSqlTargetStore, TargetResolver};

const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let _log_guard = logging::init(&config.logging);

    eprintln!("📬 Mail Forward v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {} on {}", config.mail.mailbox, config.mail.imap_host);
    eprintln!("   Trigger: {}", config.scheduler.trigger);
    eprintln!("   Keywords: {}", config.scheduler.allowed_keywords.join(", "));
    eprintln!("   API: http://{}/health\n", config.server_addr);

    // Target store
    let store = Arc::new(
        LibSqlTargetStore::new_local(&config.db_path)
            .await
            .context("Failed to open target store")?,
    );
    for (name, email) in &config.seed_targets {
        store
            .upsert_target(name, email)
            .await
            .with_context(|| format!("Failed to seed target {name}"))?;
    }
    let targets = store.list_targets().await.context("Failed to list targets")?;
    tracing::info!(count = targets.len(), "Forward targets loaded");

    // Mailbox auth: OAuth when configured, otherwise password
    let oauth = match &config.oauth {
        Some(oauth_config) => {
            let client = OAuthClient::from_files(
                &oauth_config.credentials_file,
                &oauth_config.token_file,
                &oauth_config.redirect_uri,
            )
            .context("Failed to initialize OAuth client")?;
            Some(Arc::new(client))
        }
        None => None,
    };
    let auth = match (&oauth, &config.mail.password) {
        (Some(client), _) => {
            if !client.has_token().await {
                tracing::warn!(
                    url = %client.authorization_url(),
                    "Mailbox not authorized yet; open the URL to grant access"
                );
            }
            MailAuth::OAuth(Arc::clone(client))
        }
        (None, Some(password)) => MailAuth::Password(password.clone()),
        (None, None) => anyhow::bail!("No mailbox credentials configured"),
    };

    let mail: Arc<dyn MailService> = Arc::new(ImapMailService::new(config.mail.clone(), auth));
    let resolver: Arc<dyn TargetResolver> = store;
    let scheduler = ForwardScheduler::new(config.scheduler.clone(), mail, resolver);
    let filter = scheduler.pipeline().filter();
    if filter.is_empty() {
        tracing::warn!("FORWARD_ALLOWED_KEYWORDS is empty; no message will be forwarded");
    } else {
        tracing::info!(keywords = ?filter.keywords(), "Keyword allow-list loaded");
    }
    scheduler.start().await.context("Failed to start scheduler")?;

    let api_state = ApiState {
        oauth: oauth.map(|client| client as Arc<dyn OAuthCallback>),
    };
    let server = ApiServer::start(&config.server_addr, api_routes(api_state))
        .await
        .context("Failed to start API server")?;

    shutdown_signal().await;
    tracing::info!("Shutdown signal received");

    if let Err(e) = scheduler.stop().await {
        tracing::error!(error = %e, "Scheduler did not stop cleanly");
    }
    if let Err(e) = server.stop(SERVER_SHUTDOWN_TIMEOUT).await {
        tracing::error!(error = %e, "API server did not stop cleanly");
    }

    tracing::info!("Mail Forward stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
