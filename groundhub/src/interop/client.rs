use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::consts::INTEROP_REQUEST_TIMEOUT;
use crate::mission::{Mission, Obstacles};
use crate::telemetry::Telemetry;

use crate::prelude::*;

/// Operations of the interop (judging) server used by the hub.
#[async_trait]
pub trait InteropApi: Send + Sync + 'static {
    /// Fetches mission definition.
    async fn mission(&self, id: i64) -> Result<Mission>;

    /// Fetches current obstacle set.
    async fn obstacles(&self) -> Result<Obstacles>;

    /// Reports aircraft position.
    async fn post_telemetry(&self, telemetry: &Telemetry) -> Result<()>;

    /// Whether the last interaction with the server succeeded.
    fn is_alive(&self) -> bool;
}

/// Interop server connection settings.
#[derive(Clone, Debug)]
pub struct InteropConf {
    /// Base URL, for example `http://10.10.130.2:8000`.
    pub url: String,
    /// Login.
    pub username: String,
    /// Password.
    pub password: String,
    /// Timeout of a single HTTP request.
    pub timeout: Duration,
}

impl InteropConf {
    /// Creates settings with the default request timeout.
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            password: password.into(),
            timeout: INTEROP_REQUEST_TIMEOUT,
        }
    }
}

/// HTTP client of the interop server.
///
/// Keeps a single cookie session. Any network error or non-success response drops the session,
/// the next request logs in again with a fresh cookie jar.
#[derive(Debug)]
pub struct InteropClient {
    conf: InteropConf,
    session: RwLock<Option<Client>>,
    alive: AtomicBool,
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

impl InteropClient {
    /// Creates a client. No requests are made until the first call.
    pub fn new(conf: InteropConf) -> Self {
        Self {
            conf,
            session: RwLock::new(None),
            alive: AtomicBool::new(false),
        }
    }

    /// Server settings.
    pub fn conf(&self) -> &InteropConf {
        &self.conf
    }

    /// Logs in, replacing the current session.
    pub async fn login(&self) -> Result<()> {
        let mut session = self.session.write().await;
        *session = Some(self.new_session().await?);
        Ok(())
    }

    async fn new_session(&self) -> Result<Client> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(self.conf.timeout)
            .build()?;

        log::debug!("[interop] logging in to {}", self.conf.url);
        let response = client
            .post(format!("{}/api/login", self.conf.url))
            .json(&Credentials {
                username: &self.conf.username,
                password: &self.conf.password,
            })
            .send()
            .await
            .inspect_err(|_| self.alive.store(false, Ordering::Release))?;

        let status = response.status();
        if !status.is_success() {
            self.alive.store(false, Ordering::Release);
            return Err(InteropError::Auth(status.as_u16()).into());
        }

        log::info!("[interop] logged in as `{}`", self.conf.username);
        self.alive.store(true, Ordering::Release);
        Ok(client)
    }

    async fn session(&self) -> Result<Client> {
        if let Some(client) = self.session.read().await.as_ref() {
            return Ok(client.clone());
        }

        let mut session = self.session.write().await;
        if let Some(client) = session.as_ref() {
            return Ok(client.clone());
        }
        let client = self.new_session().await?;
        *session = Some(client.clone());
        Ok(client)
    }

    async fn invalidate(&self) {
        self.alive.store(false, Ordering::Release);
        if self.session.write().await.take().is_some() {
            log::debug!("[interop] session dropped");
        }
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: impl FnOnce(RequestBuilder) -> RequestBuilder,
    ) -> Result<reqwest::Response> {
        let client = self.session().await?;
        let request = body(client.request(method, format!("{}{path}", self.conf.url)));

        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                log::debug!("[interop] {path} failed: {err}");
                self.invalidate().await;
                return Err(err.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            log::debug!("[interop] {path} responded with {status}");
            self.invalidate().await;
            return Err(InteropError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            }
            .into());
        }

        self.alive.store(true, Ordering::Release);
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(Method::GET, path, |request| request).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl InteropApi for InteropClient {
    async fn mission(&self, id: i64) -> Result<Mission> {
        self.get_json(&format!("/api/missions/{id}")).await
    }

    async fn obstacles(&self) -> Result<Obstacles> {
        self.get_json("/api/obstacles").await
    }

    async fn post_telemetry(&self, telemetry: &Telemetry) -> Result<()> {
        self.request(Method::POST, "/api/telemetry", |request| {
            request.json(telemetry)
        })
        .await?;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }
}
