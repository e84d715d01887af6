//! Server assembly and serving.

use crate::cli::RunArgs;
use arc_swap::ArcSwap;
use keymeter_core::config::{Config, ConfigWatcher};
use keymeter_core::cost::CostCalculator;
use keymeter_core::keys::ConfigKeyStore;
use keymeter_core::lifecycle::signal::SignalHandler;
use keymeter_core::lifecycle::{self, Lifecycle};
use keymeter_core::metrics::Metrics;
use keymeter_core::usage::UsageLedger;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub struct Application {
    config: Arc<ArcSwap<Config>>,
    app_router: axum::Router,
    config_path: String,
    cost_calculator: Arc<CostCalculator>,
    lifecycle: Arc<dyn Lifecycle>,
    shutdown_timeout: u64,
}

impl Application {
    /// Load config, apply CLI overrides, and assemble the router.
    pub fn build(args: &RunArgs) -> anyhow::Result<Self> {
        let mut config = Config::load(&args.config).unwrap_or_else(|e| {
            tracing::warn!(path = %args.config, "Failed to load config: {e}, using defaults");
            Config::default()
        });

        if let Some(ref host) = args.host {
            config.host = host.clone();
        }
        if let Some(port) = args.port {
            config.port = port;
        }
        if let Some(timeout) = args.shutdown_timeout {
            config.shutdown_timeout = timeout;
        }

        tracing::info!(
            api_keys = config.api_keys.len(),
            admin_tokens = config.admin_tokens.len(),
            timezone = %config.timezone,
            "Configuration loaded"
        );
        if config.admin_tokens.is_empty() {
            tracing::warn!("No admin tokens configured, usage ingestion is disabled");
        }

        let shutdown_timeout = config.shutdown_timeout;
        let ledger = Arc::new(UsageLedger::new(config.usage.capacity));
        let cost_calculator = Arc::new(CostCalculator::new(&config.model_prices));
        let config = Arc::new(ArcSwap::from_pointee(config));

        let state = keymeter_server::AppState {
            keys: Arc::new(ConfigKeyStore::new(config.clone())),
            usage: ledger.clone(),
            ledger,
            cost_calculator: cost_calculator.clone(),
            metrics: Arc::new(Metrics::new()),
            config: config.clone(),
        };
        let app_router = keymeter_server::build_router(state);

        Ok(Self {
            config,
            app_router,
            config_path: args.config.clone(),
            cost_calculator,
            lifecycle: Arc::from(lifecycle::detect_lifecycle()),
            shutdown_timeout,
        })
    }

    /// Serve HTTP or HTTPS until SIGINT/SIGTERM, reloading on file change or SIGHUP.
    pub async fn serve(self) -> anyhow::Result<()> {
        let Self {
            config,
            app_router,
            config_path,
            cost_calculator,
            lifecycle,
            shutdown_timeout,
        } = self;

        let watcher_costs = cost_calculator.clone();
        let _watcher = match ConfigWatcher::start(config_path.clone(), config.clone(), move |new_cfg| {
            on_config_reloaded(new_cfg, &watcher_costs);
        }) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(path = %config_path, "Config file watching disabled: {e}");
                None
            }
        };

        let (signal_handler, shutdown_rx) = SignalHandler::new();

        let reload_config = config.clone();
        let reload_lifecycle = lifecycle.clone();
        let reload_path = config_path.clone();
        let reload_fn = move || {
            reload_lifecycle.on_reloading();
            match Config::load(&reload_path) {
                Ok(new_cfg) => {
                    on_config_reloaded(&new_cfg, &cost_calculator);
                    reload_config.store(Arc::new(new_cfg));
                    reload_lifecycle.on_reloaded();
                }
                Err(e) => tracing::error!(path = %reload_path, "SIGHUP config reload failed: {e}"),
            }
        };
        tokio::spawn(signal_handler.run(reload_fn));

        let cfg = config.load_full();
        let addr = format!("{}:{}", cfg.host, cfg.port);

        if cfg.tls.enable {
            serve_tls(&addr, &cfg, app_router, shutdown_rx, &*lifecycle).await?;
        } else {
            serve_http(&addr, app_router, shutdown_rx, &*lifecycle).await?;
        }

        tokio::time::sleep(Duration::from_secs(shutdown_timeout.min(5))).await;
        tracing::info!("Server shut down.");
        Ok(())
    }
}

fn on_config_reloaded(new_cfg: &Config, cost_calculator: &CostCalculator) {
    cost_calculator.update_prices(&new_cfg.model_prices);
    tracing::info!(
        api_keys = new_cfg.api_keys.len(),
        admin_tokens = new_cfg.admin_tokens.len(),
        "Config reloaded (listen address and usage.capacity apply on restart)"
    );
}

async fn serve_http(
    addr: &str,
    app_router: axum::Router,
    mut shutdown_rx: watch::Receiver<bool>,
    lifecycle: &dyn Lifecycle,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP server listening");
    lifecycle.on_ready();

    let shutdown = async move {
        let _ = shutdown_rx.wait_for(|v| *v).await;
    };
    axum::serve(listener, app_router)
        .with_graceful_shutdown(shutdown)
        .await?;

    lifecycle.on_stopping();
    Ok(())
}

fn tls_acceptor(cfg: &Config) -> anyhow::Result<tokio_rustls::TlsAcceptor> {
    use rustls_pki_types::{CertificateDer, PrivateKeyDer, pem::PemObject};

    let cert_path = cfg
        .tls
        .cert
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("TLS enabled but cert path missing"))?;
    let key_path = cfg
        .tls
        .key
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("TLS enabled but key path missing"))?;

    let certs: Vec<CertificateDer<'static>> =
        CertificateDer::pem_file_iter(cert_path)?.collect::<Result<Vec<_>, _>>()?;
    let key = PrivateKeyDer::from_pem_file(key_path)?;

    let tls_config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    Ok(tokio_rustls::TlsAcceptor::from(Arc::new(tls_config)))
}

async fn serve_tls(
    addr: &str,
    cfg: &Config,
    app_router: axum::Router,
    mut shutdown_rx: watch::Receiver<bool>,
    lifecycle: &dyn Lifecycle,
) -> anyhow::Result<()> {
    let acceptor = tls_acceptor(cfg)?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTPS server listening");
    lifecycle.on_ready();

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = result?;
                tokio::spawn(serve_tls_connection(acceptor.clone(), app_router.clone(), stream, peer_addr));
            }
            _ = shutdown_rx.wait_for(|v| *v) => {
                tracing::info!("Stopping TLS listener");
                break;
            }
        }
    }

    lifecycle.on_stopping();
    Ok(())
}

async fn serve_tls_connection(
    acceptor: tokio_rustls::TlsAcceptor,
    router: axum::Router,
    stream: tokio::net::TcpStream,
    peer_addr: std::net::SocketAddr,
) {
    let tls_stream = match acceptor.accept(stream).await {
        Ok(s) => s,
        Err(e) => {
            tracing::debug!(%peer_addr, "TLS handshake failed: {e}");
            return;
        }
    };

    let io = hyper_util::rt::TokioIo::new(tls_stream);
    // Dropping the connection drops in-flight handler futures, cancelling their work
    let service = hyper::service::service_fn(move |req: hyper::Request<hyper::body::Incoming>| {
        let router = router.clone();
        let req = req.map(axum::body::Body::new);
        tower::ServiceExt::oneshot(router, req)
    });

    if let Err(e) = hyper_util::server::conn::auto::Builder::new(hyper_util::rt::TokioExecutor::new())
        .serve_connection(io, service)
        .await
    {
        tracing::debug!(%peer_addr, "TLS connection closed with error: {e}");
    }
}
