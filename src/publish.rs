//! Position distribution service client.
use std::future::Future;

use serde::{Deserialize, Serialize};

use crate::{
    clock::{Clock, SystemClock},
    error::Result,
    fix::PositionFix,
    utils::iso_timestamp,
};

/// Publication timeout
const TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Where solved positions go. Returns the number of subscribers reached.
pub trait PublishSink: Send + Sync {
    fn publish(&self, fix: &PositionFix) -> impl Future<Output = Result<usize>> + Send;
}

/// `POST /api/pos` body
#[derive(Debug, Serialize)]
struct Payload {
    ts: String,
    lat: f64,
    lon: f64,
    fix_quality: u8,
    pdop: Option<f64>,
    sats: u8,
}

impl Payload {
    fn new(ts: String, fix: &PositionFix) -> Self {
        Self {
            ts,
            lat: fix.latitude,
            lon: fix.longitude,
            fix_quality: fix.quality,
            pdop: fix.dop,
            sats: fix.satellites,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Delivery {
    #[serde(default)]
    delivered: usize,
}

/// HTTP publisher
pub struct HttpSink {
    client: reqwest::Client,
    url: String,
}

impl HttpSink {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(TIMEOUT).build()?;

        Ok(Self {
            client,
            url: format!("http://{}:{}/api/pos", host, port),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl PublishSink for HttpSink {
    async fn publish(&self, fix: &PositionFix) -> Result<usize> {
        let payload = Payload::new(iso_timestamp(SystemClock.now()), fix);

        let delivery = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?
            .json::<Delivery>()
            .await?;

        Ok(delivery.delivered)
    }
}
