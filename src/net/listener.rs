//! Primary connector setup.
//!
//! # Responsibilities
//! - Bind the configured address before anything is served
//! - Attach exactly one connector: plaintext or TLS
//! - Apply header-buffer and idle-timeout tuning
//! - Start accepting only when the orchestrator asks for it
//!
//! Binding and serving are separate steps so that a bad port fails startup
//! early while requests are still refused until the server is ready.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::time::Duration;

use axum::http::StatusCode;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use thiserror::Error;
use tokio::task::JoinHandle;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::validation::MIN_REQUEST_HEADER_SIZE;
use crate::config::ServerSection;
use crate::net::tls::{TlsError, TlsSetup};

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("cannot resolve listen address {address}")]
    Address { address: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// How accepted connections are handled.
#[derive(Clone)]
pub enum Connector {
    Plain,
    Tls(RustlsConfig),
}

impl Connector {
    pub fn is_tls(&self) -> bool {
        matches!(self, Connector::Tls(_))
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Connector::Plain => "http",
            Connector::Tls(_) => "https",
        }
    }
}

impl std::fmt::Debug for Connector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.scheme())
    }
}

/// A bound socket with its connector, not yet accepting.
#[derive(Debug)]
pub struct PreparedListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    connector: Connector,
    header_buffer: usize,
    idle_timeout: Duration,
}

impl PreparedListener {
    /// Bind `address:port`, or `address:ssl_port` when TLS is enabled.
    pub fn bind(section: &ServerSection, tls: &TlsSetup) -> Result<Self, ListenerError> {
        let port = section.effective_port(tls.is_enabled());
        let address = format!("{}:{}", section.address, port);

        let connector = match tls.material() {
            Some(material) => Connector::Tls(material.rustls_config()?),
            None => Connector::Plain,
        };

        let addr = (section.address.as_str(), port)
            .to_socket_addrs()
            .ok()
            .and_then(|mut addrs| addrs.next())
            .ok_or_else(|| ListenerError::Address {
                address: address.clone(),
            })?;

        let bind_error = |source| ListenerError::Bind {
            address: address.clone(),
            source,
        };
        let listener = TcpListener::bind(addr).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        info!(address = %local_addr, scheme = connector.scheme(), "Listener bound");
        Ok(Self {
            listener,
            local_addr,
            connector,
            header_buffer: section.request_header_size.max(MIN_REQUEST_HEADER_SIZE),
            idle_timeout: section.idle_timeout(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connector(&self) -> &Connector {
        &self.connector
    }

    /// Start accepting. `handle` stops the server and reports readiness.
    pub fn serve(self, router: Router, handle: Handle) -> JoinHandle<io::Result<()>> {
        let app = router
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                self.idle_timeout,
            ))
            .layer(TraceLayer::new_for_http())
            .into_make_service();

        info!(address = %self.local_addr, scheme = self.connector.scheme(), "Listener accepting");
        match self.connector {
            Connector::Plain => {
                let mut server = axum_server::from_tcp(self.listener).handle(handle);
                server.http_builder().http1().max_buf_size(self.header_buffer);
                tokio::spawn(server.serve(app))
            }
            Connector::Tls(config) => {
                let mut server =
                    axum_server::tls_rustls::from_tcp_rustls(self.listener, config).handle(handle);
                server.http_builder().http1().max_buf_size(self.header_buffer);
                tokio::spawn(server.serve(app))
            }
        }
    }
}
