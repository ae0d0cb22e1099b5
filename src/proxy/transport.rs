//! HTTP(S) fetches through a forward proxy

use crate::error::ProbeError;
use crate::proxy::checker::CheckConfig;
use crate::proxy::models::ProxyRecord;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Proxy as ReqwestProxy};
use std::error::Error as StdError;
use std::time::Duration;

/// Response head plus a body that is read chunk by chunk
pub struct FetchResponse {
    pub status: u16,
    pub body: Box<dyn BodyStream>,
}

/// Incoming response body. `next_chunk` must be cancel safe: the monitor
/// drops it on every wakeup that is not caused by data.
#[async_trait]
pub trait BodyStream: Send {
    /// `Ok(None)` once the body is complete
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ProbeError>;
}

/// Opens a GET request to `url` through `proxy`
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, proxy: &ProxyRecord, url: &str) -> Result<FetchResponse, ProbeError>;
}

/// reqwest-backed transport, one short-lived client per request
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    connect_timeout: Duration,
    accept_invalid_certs: bool,
}

impl ReqwestTransport {
    pub fn from_config(config: &CheckConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            accept_invalid_certs: !config.verify_tls,
        }
    }

    /// Create a reqwest client routed through the proxy
    fn create_client(&self, proxy: &ProxyRecord) -> Result<Client, ProbeError> {
        let mut reqwest_proxy = ReqwestProxy::all(proxy.url())
            .map_err(|e| ProbeError::Connect(error_chain(&e)))?;

        if proxy.has_auth() {
            reqwest_proxy = reqwest_proxy.basic_auth(
                proxy.username.as_deref().unwrap_or_default(),
                proxy.password.as_deref().unwrap_or_default(),
            );
        }

        Client::builder()
            .proxy(reqwest_proxy)
            .connect_timeout(self.connect_timeout)
            .pool_max_idle_per_host(0)
            .danger_accept_invalid_certs(self.accept_invalid_certs)
            .build()
            .map_err(|e| ProbeError::Connect(error_chain(&e)))
    }

    fn map_error(&self, e: reqwest::Error) -> ProbeError {
        let chain = error_chain(&e);
        if is_proxy_auth_rejection(&chain) {
            ProbeError::Auth
        } else if e.is_connect() && e.is_timeout() {
            ProbeError::ConnectTimeout(self.connect_timeout)
        } else {
            ProbeError::Connect(chain)
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn fetch(&self, proxy: &ProxyRecord, url: &str) -> Result<FetchResponse, ProbeError> {
        let client = self.create_client(proxy)?;
        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        Ok(FetchResponse {
            status: response.status().as_u16(),
            body: Box::new(ReqwestBody(response)),
        })
    }
}

struct ReqwestBody(reqwest::Response);

#[async_trait]
impl BodyStream for ReqwestBody {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, ProbeError> {
        self.0
            .chunk()
            .await
            .map_err(|e| ProbeError::Body(error_chain(&e)))
    }
}

/// HTTPS goes through a CONNECT tunnel; a 407 there surfaces as a
/// connect error rather than a response status.
fn is_proxy_auth_rejection(chain: &str) -> bool {
    chain.to_ascii_lowercase().contains("proxy authentication required")
}

/// Error message including all sources, joined with ": "
fn error_chain(e: &dyn StdError) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = inner.source();
    }
    message
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory transport for checker and coordinator tests

    use super::*;
    use std::collections::HashMap;
    use tokio::time::{sleep, sleep_until, Instant};

    #[derive(Clone)]
    pub(crate) enum Route {
        /// Headers after `after`, then each chunk at its offset from the
        /// headers. With `hang` the body never ends.
        Respond {
            status: u16,
            after: Duration,
            chunks: Vec<(Duration, Bytes)>,
            hang: bool,
        },
        Fail {
            after: Duration,
            error: fn() -> ProbeError,
        },
        Hang,
    }

    impl Route {
        pub(crate) fn json(body: &str) -> Self {
            Route::Respond {
                status: 200,
                after: Duration::ZERO,
                chunks: vec![(Duration::ZERO, Bytes::from(body.to_string()))],
                hang: false,
            }
        }

        pub(crate) fn status(status: u16) -> Self {
            Route::Respond {
                status,
                after: Duration::ZERO,
                chunks: Vec::new(),
                hang: false,
            }
        }

        /// `size`-byte chunks at the given offsets
        pub(crate) fn payload(chunks: &[(u64, usize)], hang: bool) -> Self {
            Route::Respond {
                status: 200,
                after: Duration::ZERO,
                chunks: chunks
                    .iter()
                    .map(|&(ms, size)| (Duration::from_millis(ms), Bytes::from(vec![0u8; size])))
                    .collect(),
                hang,
            }
        }

        pub(crate) fn fail(error: fn() -> ProbeError) -> Self {
            Route::Fail {
                after: Duration::ZERO,
                error,
            }
        }
    }

    /// Routes keyed by proxy host and URL
    #[derive(Clone, Default)]
    pub(crate) struct ScriptedTransport {
        routes: HashMap<(String, String), Route>,
    }

    impl ScriptedTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn route(mut self, host: &str, url: &str, route: Route) -> Self {
            self.routes.insert((host.to_string(), url.to_string()), route);
            self
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn fetch(&self, proxy: &ProxyRecord, url: &str) -> Result<FetchResponse, ProbeError> {
            let route = self
                .routes
                .get(&(proxy.host.clone(), url.to_string()))
                .cloned()
                .ok_or_else(|| ProbeError::Connect(format!("no route to {}", url)))?;

            match route {
                Route::Respond {
                    status,
                    after,
                    chunks,
                    hang,
                } => {
                    sleep(after).await;
                    Ok(FetchResponse {
                        status,
                        body: Box::new(ScriptedBody {
                            opened_at: Instant::now(),
                            chunks,
                            next: 0,
                            hang,
                        }),
                    })
                }
                Route::Fail { after, error } => {
                    sleep(after).await;
                    Err(error())
                }
                Route::Hang => std::future::pending().await,
            }
        }
    }

    struct ScriptedBody {
        opened_at: Instant,
        chunks: Vec<(Duration, Bytes)>,
        next: usize,
        hang: bool,
    }

    #[async_trait]
    impl BodyStream for ScriptedBody {
        async fn next_chunk(&mut self) -> Result<Option<Bytes>, ProbeError> {
            if let Some((offset, chunk)) = self.chunks.get(self.next).cloned() {
                sleep_until(self.opened_at + offset).await;
                self.next += 1;
                return Ok(Some(chunk));
            }
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(None)
        }
    }
}
