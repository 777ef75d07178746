//! HTTP client for the Envoy gateway local API

use super::types::{batteries_from_inventory, InventoryGroup};
use super::{
    Battery, CommCheckResponse, Connector, EnvoyApi, EnvoyError, EnvoyResult, Inverter,
    ProductionResponse,
};
use crate::config::Config;
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::header::{COOKIE, SET_COOKIE};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_LOGIN_URL: &str = "https://enlighten.enphaseenergy.com/login/login.json";
pub const DEFAULT_TOKEN_URL: &str = "https://entrez.enphaseenergy.com/tokens";
const SESSION_COOKIE: &str = "sessionId";

const PATH_CHECK_JWT: &str = "/auth/check_jwt";
const PATH_PRODUCTION: &str = "/production.json?details=1";
const PATH_INVERTERS: &str = "/api/v1/production/inverters";
const PATH_INVENTORY: &str = "/ivp/ensemble/inventory";
const PATH_COMM_CHECK: &str = "/installer/pcu_comm_check";

/// Connection parameters for one gateway
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub address: String,
    pub serial_number: String,
    pub username: String,
    pub password: String,
    /// Pre-obtained token, used before falling back to credentials
    pub jwt: String,
    pub login_url: String,
    pub token_url: String,
    pub timeout: Duration,
}

impl ClientOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            address: config.address.clone(),
            serial_number: config.serial_number.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            jwt: config.jwt.clone(),
            login_url: DEFAULT_LOGIN_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Gateway base URL; bare hosts are reached over HTTPS
    pub fn base_url(&self) -> String {
        let address = self.address.trim().trim_end_matches('/');
        if address.starts_with("http://") || address.starts_with("https://") {
            address.to_string()
        } else {
            format!("https://{address}")
        }
    }

    fn has_credentials(&self) -> bool {
        !self.username.is_empty() || !self.password.is_empty()
    }
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<String>,
    cookie: Option<String>,
    established: bool,
    /// The configured token was rejected once, prefer credentials from now on
    configured_jwt_rejected: bool,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    session_id: Option<String>,
}

/// Envoy gateway client
#[derive(Debug)]
pub struct EnvoyClient {
    http: Client,
    options: ClientOptions,
    base_url: String,
    state: Mutex<SessionState>,
}

impl EnvoyClient {
    /// Create a client without contacting the gateway
    pub fn new(options: ClientOptions) -> EnvoyResult<Self> {
        // Gateways serve self-signed certificates
        let http = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(options.timeout)
            .build()?;

        Ok(Self {
            http,
            base_url: options.base_url(),
            options,
            state: Mutex::new(SessionState::default()),
        })
    }

    /// Create a client and establish the gateway session
    pub async fn connect(options: ClientOptions) -> EnvoyResult<Self> {
        let client = Self::new(options)?;
        client.ensure_session().await?;
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Return (token, cookie), establishing the session when needed
    async fn ensure_session(&self) -> EnvoyResult<(String, Option<String>)> {
        {
            let state = self.state.lock();
            if let (true, Some(token)) = (state.established, &state.token) {
                return Ok((token.clone(), state.cookie.clone()));
            }
        }

        loop {
            let token = self.token().await?;
            let err = match self.check_jwt(&token).await {
                Ok(cookie) => {
                    let mut state = self.state.lock();
                    state.token = Some(token.clone());
                    state.cookie = cookie.clone();
                    state.established = true;
                    return Ok((token, cookie));
                }
                Err(e) => e,
            };

            let retry = {
                let mut state = self.state.lock();
                state.token = None;
                state.cookie = None;
                state.established = false;

                let configured = token == self.options.jwt;
                let rejected = matches!(err, EnvoyError::Unauthorized(_));
                let retry = configured
                    && rejected
                    && !state.configured_jwt_rejected
                    && self.options.has_credentials();
                if configured && rejected {
                    state.configured_jwt_rejected = true;
                }
                retry
            };

            if !retry {
                return Err(err);
            }
            warn!("Configured token was rejected ({}), requesting a new one", err);
        }
    }

    async fn token(&self) -> EnvoyResult<String> {
        let use_configured = {
            let state = self.state.lock();
            if let Some(token) = &state.token {
                return Ok(token.clone());
            }
            !self.options.jwt.is_empty()
                && !(state.configured_jwt_rejected && self.options.has_credentials())
        };

        if use_configured {
            return Ok(self.options.jwt.clone());
        }
        if !self.options.has_credentials() {
            return Err(EnvoyError::Auth(
                "no usable token and no credentials configured".to_string(),
            ));
        }
        self.fetch_token().await
    }

    /// Obtain a gateway token from the vendor cloud
    async fn fetch_token(&self) -> EnvoyResult<String> {
        info!("Requesting gateway token for serial {}", self.options.serial_number);

        let response = self
            .http
            .post(&self.options.login_url)
            .form(&[
                ("user[email]", self.options.username.as_str()),
                ("user[password]", self.options.password.as_str()),
            ])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(EnvoyError::Auth(format!(
                "login rejected with status {}",
                response.status()
            )));
        }
        let login: LoginResponse = decode(response).await?;
        let session_id = login
            .session_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| EnvoyError::Auth("login response carried no session_id".to_string()))?;

        let response = self
            .http
            .post(&self.options.token_url)
            .json(&json!({
                "session_id": session_id,
                "serial_num": self.options.serial_number,
                "username": self.options.username,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(EnvoyError::Auth(format!(
                "token request rejected with status {}",
                response.status()
            )));
        }

        let token = response.text().await?.trim().to_string();
        if token.is_empty() {
            return Err(EnvoyError::Auth("token endpoint returned an empty token".to_string()));
        }
        Ok(token)
    }

    /// Validate the token with the gateway and capture its session cookie
    async fn check_jwt(&self, token: &str) -> EnvoyResult<Option<String>> {
        let url = format!("{}{}", self.base_url, PATH_CHECK_JWT);
        debug!("Validating token at {}", url);

        let response = self.http.get(&url).bearer_auth(token).send().await?;
        let response = check_status(response).await?;

        let cookie = session_cookie(&response);
        if cookie.is_none() {
            warn!("Gateway accepted the token but set no session cookie");
        }
        Ok(cookie)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> EnvoyResult<T> {
        let (token, cookie) = self.ensure_session().await?;
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let mut request = self.http.get(&url).bearer_auth(token);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, format!("{SESSION_COOKIE}={cookie}"));
        }

        let response = check_status(request.send().await?).await?;
        decode(response).await
    }
}

#[async_trait]
impl EnvoyApi for EnvoyClient {
    async fn comm_check(&self) -> EnvoyResult<CommCheckResponse> {
        self.get_json(PATH_COMM_CHECK).await
    }

    async fn production(&self) -> EnvoyResult<ProductionResponse> {
        self.get_json(PATH_PRODUCTION).await
    }

    async fn inverters(&self) -> EnvoyResult<Vec<Inverter>> {
        self.get_json(PATH_INVERTERS).await
    }

    async fn batteries(&self) -> EnvoyResult<Vec<Battery>> {
        let groups: Vec<InventoryGroup> = self.get_json(PATH_INVENTORY).await?;
        Ok(batteries_from_inventory(groups))
    }

    /// The token is kept; the next request validates it again
    fn invalidate_session(&self) {
        let mut state = self.state.lock();
        state.cookie = None;
        state.established = false;
        info!("Gateway session invalidated");
    }
}

/// Connects [`EnvoyClient`]s with fixed options
#[derive(Debug, Clone)]
pub struct EnvoyConnector {
    options: ClientOptions,
}

impl EnvoyConnector {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Connector for EnvoyConnector {
    type Client = EnvoyClient;

    async fn connect(&self) -> EnvoyResult<EnvoyClient> {
        EnvoyClient::connect(self.options.clone()).await
    }
}

async fn check_status(response: Response) -> EnvoyResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(EnvoyError::Unauthorized(
            format!("{} {}", status.as_u16(), body.trim()),
        )),
        _ => Err(EnvoyError::Status {
            code: status.as_u16(),
            body,
        }),
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> EnvoyResult<T> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| EnvoyError::Decode(e.to_string()))
}

fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .filter_map(|value| value.split(';').next())
        .find_map(|pair| {
            pair.trim()
                .strip_prefix(SESSION_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
                .map(str::to_string)
        })
}
