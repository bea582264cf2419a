//! XML-RPC client for the CCU.

use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::error::{HomematicError, Result};
use crate::url::XmlRpcUrl;
use crate::xmlrpc::{self, Value};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct XmlRpcClient {
    http: Client,
    endpoint: String,
    username: String,
    password: String,
}

impl XmlRpcClient {
    pub fn new(url: &XmlRpcUrl) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            endpoint: url.endpoint(),
            username: url.username().to_string(),
            password: url.password().to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Invoke `method` and return its result value.
    pub async fn call(&self, method: &str, params: &[Value]) -> Result<Value> {
        debug!("XML-RPC {} {}({:?})", self.endpoint, method, params);

        let mut request = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(xmlrpc::method_call(method, params));
        if !self.username.is_empty() && !self.password.is_empty() {
            request = request.basic_auth(&self.username, Some(&self.password));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HomematicError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        xmlrpc::parse_method_response(&body)
    }

    /// Register `callback_url` for callbacks tagged with `interface_id`.
    pub async fn init(&self, callback_url: &str, interface_id: &str) -> Result<()> {
        self.call("init", &[callback_url.into(), interface_id.into()])
            .await
            .map(|_| ())
    }

    /// Unregister `callback_url`.
    pub async fn deinit(&self, callback_url: &str) -> Result<()> {
        self.call("init", &[callback_url.into()]).await.map(|_| ())
    }

    pub async fn set_value(&self, address: &str, key: &str, value: Value) -> Result<()> {
        self.call("setValue", &[address.into(), key.into(), value])
            .await
            .map(|_| ())
    }
}
