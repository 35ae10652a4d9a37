//! Gateway server: shared state, listeners and the accept loops.

use crate::api::route_request;
use crate::config::Config;
use crate::intercept::{
    create_http_client, create_reusable_listener, create_tls_acceptor, Forwarder, Interceptor,
};
use crate::query::QueryService;
use crate::reset::ResetControl;
use crate::simulation::Simulation;
use crate::store::LogStore;
use anyhow::Context;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Everything a request handler needs. The store is owned here and handed
/// to the interceptor, query service and reset control by `Arc`.
pub struct GatewayState {
    pub config: Config,
    pub store: Arc<LogStore>,
    pub query: QueryService,
    pub reset: ResetControl,
    pub simulation: Simulation,
    pub forwarder: Forwarder,
}

impl GatewayState {
    pub fn new(config: Config) -> Result<Self, anyhow::Error> {
        config.validate()?;

        let store = Arc::new(
            LogStore::new(config.store.max_logs)?
                .with_lock_timeout(Duration::from_millis(config.store.reset_timeout_ms)),
        );
        let interceptor = Interceptor::new(store.clone(), config.store.max_capture_bytes);
        let client = create_http_client(&config.upstream, &config.connection_pool)?;
        let forwarder = Forwarder::new(client, &config.upstream, interceptor.clone())
            .context("Invalid upstream path_rewrite")?;

        Ok(Self {
            query: QueryService::new(store.clone(), config.query.clone()),
            reset: ResetControl::new(store.clone(), &config.seed),
            simulation: Simulation::new(interceptor, &config.simulation),
            forwarder,
            store,
            config,
        })
    }
}

/// HTTP listener plus the optional HTTPS listener, both serving one router.
pub struct GatewayServer {
    state: Arc<GatewayState>,
    http: TcpListener,
    https: Option<(TcpListener, TlsAcceptor)>,
}

impl GatewayServer {
    /// Build the state and bind the listeners.
    ///
    /// A failing HTTPS setup is logged and skipped; the HTTP listener is
    /// required.
    pub async fn bind(config: Config) -> Result<Self, anyhow::Error> {
        let state = Arc::new(GatewayState::new(config)?);
        let listen = &state.config.listen;

        let addr: SocketAddr = format!("{}:{}", listen.host, listen.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", listen.host, listen.port))?;
        let http = create_reusable_listener(addr)
            .with_context(|| format!("Failed to bind HTTP listener on {addr}"))?;

        let https = match &listen.tls {
            Some(tls) => match bind_https(&listen.host, listen.https_port, tls) {
                Ok(https) => Some(https),
                Err(e) => {
                    error!("HTTPS listener disabled: {:#}", e);
                    None
                }
            },
            None => None,
        };

        Ok(Self { state, http, https })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.http.local_addr()
    }

    pub fn https_addr(&self) -> Option<SocketAddr> {
        self.https
            .as_ref()
            .and_then(|(listener, _)| listener.local_addr().ok())
    }

    pub fn state(&self) -> Arc<GatewayState> {
        Arc::clone(&self.state)
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), anyhow::Error> {
        let Self { state, http, https } = self;

        if let Ok(addr) = http.local_addr() {
            info!("Listening on http://{}", addr);
        }
        info!(
            "Proxying {}* to {}",
            state.config.upstream.path_prefix,
            state.forwarder.upstream_base()
        );
        if state.config.simulation.enabled {
            state.simulation.start();
        }

        let mut tasks = tokio::task::JoinSet::new();
        if let Some((listener, acceptor)) = https {
            if let Ok(addr) = listener.local_addr() {
                info!("Listening on https://{}", addr);
            }
            tasks.spawn(accept_loop(
                listener,
                Some(acceptor),
                Arc::clone(&state),
                shutdown.clone(),
            ));
        }
        tasks.spawn(accept_loop(http, None, Arc::clone(&state), shutdown.clone()));

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!("Listener task failed: {}", e);
            }
        }

        state.simulation.stop();
        info!("Gateway stopped");
        Ok(())
    }
}

fn bind_https(
    host: &str,
    port: u16,
    tls: &crate::config::TlsConfig,
) -> Result<(TcpListener, TlsAcceptor), anyhow::Error> {
    let acceptor = create_tls_acceptor(&tls.cert_path, &tls.key_path)?;
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid HTTPS listen address {host}:{port}"))?;
    let listener = create_reusable_listener(addr)
        .with_context(|| format!("Failed to bind HTTPS listener on {addr}"))?;
    Ok((listener, acceptor))
}

async fn accept_loop(
    listener: TcpListener,
    tls_acceptor: Option<TlsAcceptor>,
    state: Arc<GatewayState>,
    shutdown: CancellationToken,
) {
    loop {
        let (stream, remote_addr) = tokio::select! {
            _ = shutdown.cancelled() => return,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            },
        };

        let state = Arc::clone(&state);
        let tls_acceptor = tls_acceptor.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = Arc::clone(&state);
                async move { Ok::<_, Infallible>(route_request(req, &state).await) }
            });

            match tls_acceptor {
                Some(acceptor) => match acceptor.accept(stream).await {
                    Ok(tls_stream) => {
                        let io = TokioIo::new(tls_stream);
                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                        {
                            debug!("Error serving HTTPS connection from {}: {}", remote_addr, err);
                        }
                    }
                    Err(err) => {
                        warn!("TLS handshake failed from {}: {}", remote_addr, err);
                    }
                },
                None => {
                    let io = TokioIo::new(stream);
                    if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("Error serving HTTP connection from {}: {}", remote_addr, err);
                    }
                }
            }
        });
    }
}
