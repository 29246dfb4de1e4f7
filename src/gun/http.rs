//! HTTP GET gun

use super::{Gun, GunOptions, Shot};
use crate::channel::ResultSender;
use crate::error::{AppError, Result};
use crate::types::{
    Fired, GunKind, NET_CODE_TIMED_OUT, NET_CODE_TRANSPORT_ERROR, PROTO_CODE_ERROR,
};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Gun that issues `GET base_address + payload` for every missile
///
/// TLS certificates are not verified.
#[derive(Debug)]
pub struct HttpGun {
    base_address: String,
    timeout: Duration,
    client: Client,
    results: ResultSender,
}

impl HttpGun {
    /// Requires `base_address`; `timeout` is in seconds and defaults to 11
    pub fn new(options: &GunOptions, results: ResultSender) -> Result<Self> {
        let base_address = options.get("base_address")?.to_string();
        let timeout_secs: f64 =
            options.get_parsed_or("timeout", crate::defaults::HTTP_TIMEOUT_SECS as f64)?;
        if !timeout_secs.is_finite() || timeout_secs <= 0.0 {
            return Err(AppError::gun_config("HTTP timeout must be greater than 0"));
        }
        let timeout = Duration::from_secs_f64(timeout_secs);

        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .user_agent(concat!("bfg-shooter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::gun_config(format!("Failed to create HTTP client: {}", e)))?;

        debug!(gun = "http", %base_address, ?timeout, "Initialized HTTP gun");
        Ok(Self {
            base_address,
            timeout,
            client,
            results,
        })
    }

    /// Target prefix every payload is appended to
    pub fn base_address(&self) -> &str {
        &self.base_address
    }

    /// Per-request timeout
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The payload is appended verbatim, no separator is inserted
    fn url_for(&self, payload: &str) -> String {
        format!("{}{}", self.base_address, payload)
    }
}

/// Record a reqwest failure in the shot; unclassified errors are returned
fn record_transport_error(shot: &mut Shot<'_>, err: reqwest::Error) -> Result<Fired> {
    if err.is_timeout() {
        warn!(marker = %shot.tag, error = %err, "HTTP request timed out");
        shot.net_code = NET_CODE_TIMED_OUT;
        shot.proto_code = PROTO_CODE_ERROR;
        Ok(Fired::Measured)
    } else if err.is_connect() {
        warn!(marker = %shot.tag, error = %err, "HTTP connection failed");
        shot.net_code = NET_CODE_TRANSPORT_ERROR;
        shot.proto_code = PROTO_CODE_ERROR;
        Ok(Fired::Measured)
    } else {
        Err(shot.fail(AppError::transport(err.to_string())))
    }
}

#[async_trait]
impl Gun for HttpGun {
    fn kind(&self) -> GunKind {
        GunKind::Http
    }

    async fn shoot(&self, payload: &str, marker: &str) -> Result<Fired> {
        let url = self.url_for(payload);
        let mut shot = self.results.measure(marker);
        shot.size_out = payload.len() as u64;

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(err) => return record_transport_error(&mut shot, err),
        };

        let status = response.status();
        shot.proto_code = i32::from(status.as_u16());

        match response.bytes().await {
            Ok(body) => {
                shot.size_in = body.len() as u64;
                debug!(%marker, %url, status = status.as_u16(), size_in = body.len(), "HTTP response");
                Ok(Fired::Measured)
            }
            Err(err) => record_transport_error(&mut shot, err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::result_channel;

    #[test]
    fn test_base_address_required() {
        let (tx, _rx) = result_channel(4);
        let err = HttpGun::new(&GunOptions::new(), tx).unwrap_err();
        assert!(err.to_string().contains("base_address"));
    }

    #[test]
    fn test_default_timeout() {
        let (tx, _rx) = result_channel(4);
        let gun = HttpGun::new(&GunOptions::new().with("base_address", "http://localhost/"), tx)
            .unwrap();
        assert_eq!(gun.timeout(), Duration::from_secs(11));
        assert_eq!(gun.base_address(), "http://localhost/");
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let (tx, _rx) = result_channel(4);
        let options = GunOptions::new()
            .with("base_address", "http://localhost")
            .with("timeout", "0");
        assert!(HttpGun::new(&options, tx.clone()).is_err());

        let options = options.with("timeout", "soon");
        assert!(HttpGun::new(&options, tx).is_err());
    }

    #[test]
    fn test_url_is_plain_concatenation() {
        let (tx, _rx) = result_channel(4);
        let gun = HttpGun::new(&GunOptions::new().with("base_address", "http://h:1"), tx.clone()).unwrap();
        assert_eq!(gun.url_for("/a?b=1"), "http://h:1/a?b=1");
        assert_eq!(gun.url_for(""), "http://h:1");

        let gun = HttpGun::new(&GunOptions::new().with("base_address", "http://h/api?id="), tx.clone())
            .unwrap();
        assert_eq!(gun.url_for("42"), "http://h/api?id=42");

        let gun = HttpGun::new(&GunOptions::new().with("base_address", "http://h/"), tx).unwrap();
        assert_eq!(gun.url_for("/x"), "http://h//x");
    }

    #[tokio::test]
    async fn test_connection_refused_is_recorded() {
        // Bind then drop a listener so the port is very likely closed
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let (tx, mut rx) = result_channel(4);
        let options = GunOptions::new()
            .with("base_address", format!("http://127.0.0.1:{}", port))
            .with("timeout", "2");
        let gun = HttpGun::new(&options, tx).unwrap();

        let fired = gun.shoot("/", "refused").await.unwrap();
        assert_eq!(fired, Fired::Measured);

        let record = rx.try_drain().unwrap();
        assert_eq!(record.tag, "refused");
        assert_eq!(record.net_code, 1);
        assert_eq!(record.proto_code, 500);
    }
}
