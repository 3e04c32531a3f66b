// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum_server::{tls_rustls::RustlsConfig, Handle};
use tokio_util::sync::CancellationToken;

use realty_server::{
    api::router,
    auth::TokenVerifier,
    config::Config,
    logging::init_tracing,
    mail::Mailer,
    media::MediaClient,
    state::AppState,
    storage::{AuditQueue, Database},
};

/// How long in-flight requests get to finish after a shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install the ring crypto provider for rustls (must be done before any TLS operations)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| "failed to install rustls crypto provider")?;

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!(
        database = %config.database_path.display(),
        environment = ?config.environment,
        provider_auth = config.provider.is_some(),
        local_tokens = config.local_tokens.is_some(),
        "Starting realty server"
    );

    let db = Arc::new(Database::open(&config.database_path)?);
    let shutdown = CancellationToken::new();
    let (audit, audit_writer) =
        AuditQueue::start(Arc::clone(&db), config.audit_queue_capacity, shutdown.clone());

    let verifier = TokenVerifier::from_config(config.provider.as_ref(), config.local_tokens.as_ref())?;

    let mailer = match config.smtp.clone() {
        Some(smtp) => Some(Mailer::new(smtp)?),
        None => {
            tracing::warn!("SMTP is not configured; inquiries will be stored but not emailed");
            None
        }
    };
    let media = match config.media.clone() {
        Some(media) => Some(MediaClient::new(media)?),
        None => {
            tracing::info!("Image host is not configured; hosted images will not be deleted");
            None
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let tls = config.tls.clone();

    let mut state = AppState::new(db, config, verifier, audit);
    if let Some(mailer) = mailer {
        state = state.with_mailer(mailer);
    }
    if let Some(media) = media {
        state = state.with_media(media);
    }
    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();

    let handle = Handle::new();
    let signal_handle = handle.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
    });

    match tls {
        Some(paths) => {
            let tls_config = RustlsConfig::from_pem_file(&paths.cert, &paths.key).await?;
            tracing::info!(%addr, "Listening on https (docs at /docs)");
            axum_server::bind_rustls(addr, tls_config)
                .handle(handle)
                .serve(app)
                .await?;
        }
        None => {
            tracing::info!(%addr, "Listening on http (docs at /docs)");
            axum_server::bind(addr).handle(handle).serve(app).await?;
        }
    }

    shutdown.cancel();
    if let Err(e) = audit_writer.await {
        tracing::warn!(error = %e, "Audit writer task failed");
    }
    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
