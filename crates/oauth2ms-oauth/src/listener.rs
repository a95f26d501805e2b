//! One-shot local server receiving the authorization redirect.
//!
//! The listener binds the host and port of the redirect URI and serves a
//! single route, the redirect path. The first request on it is recorded
//! (path and query), answered with a short confirmation page, and shuts the
//! server down. [`CallbackListener::receive`] consumes the listener, so the
//! port is released whichever way the wait ends.

use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::Router;
use axum::http::{Uri, header};
use axum::response::Html;
use axum::routing::get;
use axum_server::Handle;
use axum_server::tls_rustls::RustlsConfig;
use rustls::ServerConfig;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::TcpListener;
use tokio::sync::{Notify, oneshot};
use tracing::{debug, info};
use url::Url;

use crate::error::{Error, Result};

/// Location of the server certificate below a data directory.
pub const CERTIFICATE_PATH: &str = "ssl/certs/oauth2_server.pem";

/// Body of the page shown once the redirect arrived.
pub const SUCCESS_BODY: &str = "Authorization complete.";

/// System data directories searched when `XDG_DATA_DIRS` is unset.
const DEFAULT_DATA_DIRS: &str = "/usr/local/share:/usr/share";

/// How long open TLS connections may linger once the redirect was served.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// The redirect request captured by the listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackRequest {
    target: String,
}

impl CallbackRequest {
    /// Wraps a request target such as `/getToken?code=...`.
    #[must_use]
    pub const fn new(target: String) -> Self {
        Self { target }
    }

    /// Request target, path plus query string.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }
}

/// Bound redirect listener waiting for its single request.
pub struct CallbackListener {
    listener: TcpListener,
    path: String,
    tls: Option<RustlsConfig>,
}

impl fmt::Debug for CallbackListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackListener")
            .field("addr", &self.listener.local_addr().ok())
            .field("path", &self.path)
            .field("tls", &self.tls.is_some())
            .finish()
    }
}

impl CallbackListener {
    /// Binds the address of `redirect_uri`.
    ///
    /// For `https` redirect URIs the server certificate is loaded from
    /// [`CERTIFICATE_PATH`] in the first data directory that has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme is unsupported, the certificate cannot
    /// be loaded or the address cannot be bound.
    pub async fn bind(redirect_uri: &Url) -> Result<Self> {
        let tls = match redirect_uri.scheme() {
            "http" => None,
            "https" => Some(tls_config(&locate_certificate()?)?),
            other => {
                return Err(Error::InvalidConfig(format!(
                    "unsupported redirect scheme: {other}"
                )));
            }
        };
        Self::bind_with(redirect_uri, tls).await
    }

    /// Binds the address of `redirect_uri`, serving TLS with `tls` if given.
    ///
    /// # Errors
    ///
    /// Returns an error if the URI has no host, its path cannot be routed or
    /// the address cannot be bound.
    pub async fn bind_with(redirect_uri: &Url, tls: Option<RustlsConfig>) -> Result<Self> {
        let host = redirect_uri
            .host_str()
            .ok_or_else(|| Error::InvalidConfig(format!("redirect URI has no host: {redirect_uri}")))?;
        let port = redirect_uri
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidConfig(format!("redirect URI has no port: {redirect_uri}")))?;
        let path = route_path(redirect_uri)?;

        let addr = format!("{host}:{port}");
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(source) => return Err(Error::Bind { addr, source }),
        };
        info!(tls = tls.is_some(), "Waiting for authorization redirect on {addr}{path}");

        Ok(Self {
            listener,
            path,
            tls,
        })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Waits for the redirect request, answers it and stops listening.
    ///
    /// Without `timeout` this waits until a browser completes the redirect.
    /// Requests on other paths are answered with `404` and do not end the
    /// wait.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if `timeout` elapses first, or an error if
    /// the server fails before a redirect arrived.
    pub async fn receive(self, timeout: Option<Duration>) -> Result<CallbackRequest> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.serve_one())
                .await
                .map_err(|_| Error::Timeout(limit.as_secs()))?,
            None => self.serve_one().await,
        }
    }

    async fn serve_one(self) -> Result<CallbackRequest> {
        let Self {
            listener,
            path,
            tls,
        } = self;
        let (sender, received) = oneshot::channel();

        match tls {
            None => {
                let done = Arc::new(Notify::new());
                let router = callback_router(&path, sender, Shutdown::Notify(Arc::clone(&done)));
                axum::serve(listener, router)
                    .with_graceful_shutdown(async move { done.notified().await })
                    .await?;
            }
            Some(config) => {
                let handle = Handle::new();
                let router = callback_router(&path, sender, Shutdown::Handle(handle.clone()));
                axum_server::from_tcp_rustls(listener.into_std()?, config)
                    .handle(handle)
                    .serve(router.into_make_service())
                    .await?;
            }
        }
        debug!("Redirect listener stopped");

        received
            .await
            .map_err(|_| Error::InvalidRedirect("listener stopped before a redirect arrived".into()))
    }
}

/// Stops the server once the redirect has been answered.
#[derive(Clone)]
enum Shutdown {
    Notify(Arc<Notify>),
    Handle(Handle),
}

impl Shutdown {
    fn trigger(&self) {
        match self {
            Self::Notify(done) => done.notify_one(),
            Self::Handle(handle) => handle.graceful_shutdown(Some(SHUTDOWN_GRACE)),
        }
    }
}

type RedirectSlot = Arc<Mutex<Option<oneshot::Sender<CallbackRequest>>>>;

/// Router answering `GET <path>` and handing the first request to `sender`.
fn callback_router(
    path: &str,
    sender: oneshot::Sender<CallbackRequest>,
    shutdown: Shutdown,
) -> Router {
    let slot: RedirectSlot = Arc::new(Mutex::new(Some(sender)));

    Router::new().route(
        path,
        get(move |uri: Uri| {
            let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
            let shutdown = shutdown.clone();
            async move {
                if let Some(sender) = sender {
                    let target = uri
                        .path_and_query()
                        .map_or_else(|| uri.path().to_string(), ToString::to_string);
                    debug!("Redirect request received");
                    if sender.send(CallbackRequest::new(target)).is_ok() {
                        shutdown.trigger();
                    }
                }
                ([(header::CONNECTION, "close")], Html(SUCCESS_BODY))
            }
        }),
    )
}

/// Route for the redirect URI's path.
///
/// Segments starting with `:` or `*` would be taken as route parameters and
/// are refused.
fn route_path(redirect_uri: &Url) -> Result<String> {
    let path = redirect_uri.path();
    if path
        .split('/')
        .any(|segment| segment.starts_with(':') || segment.starts_with('*'))
    {
        return Err(Error::InvalidConfig(format!(
            "redirect path cannot be served: {path}"
        )));
    }
    Ok(path.to_string())
}

/// Data directories in lookup order: the user's, then the system ones.
fn data_dirs() -> Vec<PathBuf> {
    let system = env::var("XDG_DATA_DIRS")
        .ok()
        .filter(|dirs| !dirs.is_empty())
        .unwrap_or_else(|| DEFAULT_DATA_DIRS.to_string());

    dirs::data_dir()
        .into_iter()
        .chain(env::split_paths(&system))
        .collect()
}

/// Finds [`CERTIFICATE_PATH`] in the first data directory containing it.
///
/// # Errors
///
/// Returns [`Error::CertificateNotFound`] if no data directory has one.
pub fn locate_certificate() -> Result<PathBuf> {
    find_certificate(&data_dirs()).ok_or_else(|| Error::CertificateNotFound(CERTIFICATE_PATH.into()))
}

fn find_certificate(dirs: &[PathBuf]) -> Option<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(CERTIFICATE_PATH))
        .find(|path| path.is_file())
}

/// Builds the server TLS configuration from a PEM file holding the
/// certificate chain and the private key.
///
/// # Errors
///
/// Returns an error if the file has no usable certificate or key.
pub fn tls_config(pem: &Path) -> Result<RustlsConfig> {
    let unreadable =
        |e: rustls::pki_types::pem::Error| Error::InvalidConfig(format!("{}: {e}", pem.display()));

    let certs = CertificateDer::pem_file_iter(pem)
        .map_err(unreadable)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(unreadable)?;
    if certs.is_empty() {
        return Err(Error::InvalidConfig(format!(
            "{}: no certificate found",
            pem.display()
        )));
    }
    let key = PrivateKeyDer::from_pem_file(pem).map_err(unreadable)?;

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    debug!(path = %pem.display(), "Loaded redirect server certificate");

    Ok(RustlsConfig::from_config(Arc::new(config)))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn loopback(port: u16) -> Url {
        Url::parse(&format!("http://127.0.0.1:{port}/getToken")).unwrap()
    }

    async fn send(addr: SocketAddr, request: &[u8]) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        // The server may hang up before reading everything.
        let _ = stream.write_all(request).await;
        let mut response = Vec::new();
        let _ = stream.read_to_end(&mut response).await;
        String::from_utf8_lossy(&response).into_owned()
    }

    fn get(target: &str) -> Vec<u8> {
        format!("GET {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").into_bytes()
    }

    #[tokio::test]
    async fn test_receive_single_request() {
        let listener = CallbackListener::bind(&loopback(0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move { send(addr, &get("/getToken?code=A&state=B")).await });

        let request = listener.receive(None).await.unwrap();
        assert_eq!(request.target(), "/getToken?code=A&state=B");

        let response = client.await.unwrap();
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with(SUCCESS_BODY));

        // Port is free again once the request has been served.
        std::net::TcpListener::bind(addr).expect("port released");
    }

    #[tokio::test]
    async fn test_other_requests_do_not_end_the_wait() {
        let listener = CallbackListener::bind(&loopback(0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let favicon = send(addr, &get("/favicon.ico")).await;
            let garbage = send(addr, b"garbage\r\n\r\n").await;
            let mut oversized = b"GET /getToken?pad=".to_vec();
            oversized.resize(2 * 1024 * 1024, b'a');
            let oversized = send(addr, &oversized).await;
            let redirect = send(addr, &get("/getToken?code=A&state=B")).await;
            (favicon, garbage, oversized, redirect)
        });

        let request = listener.receive(None).await.unwrap();
        assert_eq!(request.target(), "/getToken?code=A&state=B");

        let (favicon, garbage, oversized, redirect) = client.await.unwrap();
        assert!(favicon.starts_with("HTTP/1.1 404"));
        assert!(!garbage.contains("200 OK"));
        assert!(!oversized.contains("200 OK"));
        assert!(redirect.ends_with(SUCCESS_BODY));
    }

    #[tokio::test]
    async fn test_port_in_use() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = CallbackListener::bind(&loopback(port)).await.unwrap_err();
        assert!(matches!(err, Error::Bind { .. }));
    }

    #[tokio::test]
    async fn test_timeout_releases_port() {
        let listener = CallbackListener::bind(&loopback(0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let err = listener
            .receive(Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(0)));
        std::net::TcpListener::bind(addr).expect("port released");
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let url = Url::parse("ftp://localhost:21/").unwrap();
        assert!(matches!(
            CallbackListener::bind(&url).await,
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_parameter_like_path_is_refused() {
        let url = Url::parse("http://127.0.0.1:0/cb/:code").unwrap();
        assert!(matches!(
            CallbackListener::bind(&url).await,
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_find_certificate_order() {
        let user = tempfile::tempdir().unwrap();
        let system = tempfile::tempdir().unwrap();
        for dir in [&user, &system] {
            let path = dir.path().join(CERTIFICATE_PATH);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "").unwrap();
        }
        let empty = tempfile::tempdir().unwrap();

        let dirs = vec![
            empty.path().to_path_buf(),
            user.path().to_path_buf(),
            system.path().to_path_buf(),
        ];
        assert_eq!(
            find_certificate(&dirs).unwrap(),
            user.path().join(CERTIFICATE_PATH)
        );
        assert!(find_certificate(&dirs[..1]).is_none());
    }

    #[test]
    fn test_tls_config_rejects_empty_pem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("oauth2_server.pem");
        std::fs::write(&path, "not a pem\n").unwrap();
        assert!(matches!(tls_config(&path), Err(Error::InvalidConfig(_))));
    }
}
