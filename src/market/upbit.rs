//! Upbit REST client: public ticker, private accounts and market buy orders.
//!
//! Private calls carry a JWT (HS256) whose payload holds the access key, a
//! random nonce and, for requests with parameters, the SHA-512 hash of the
//! query string.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use hmac::{Hmac, Mac};
use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::time::Duration;

use super::{BalanceSource, Confirmation, Executor, MarketData, Quote, ReferenceMode};
use crate::error::{ExecutionError, FetchError};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_BASE_URL: &str = "https://api.upbit.com/v1";

#[derive(Clone)]
pub struct UpbitClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Option<Credentials>,
}

#[derive(Clone)]
struct Credentials {
    access_key: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct Ticker {
    trade_price: f64,
    prev_closing_price: f64,
}

#[derive(Debug, Deserialize)]
struct Account {
    currency: String,
    balance: String,
    #[serde(default)]
    avg_buy_price: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    uuid: String,
    #[serde(default)]
    state: String,
    market: String,
}

#[derive(Debug, Serialize)]
struct OrderRequest<'a> {
    market: &'a str,
    side: &'a str,
    ord_type: &'a str,
    price: String,
}

impl OrderRequest<'_> {
    /// Query string hashed into the JWT; must match the JSON body fields.
    fn query_string(&self) -> String {
        format!(
            "market={}&side={}&ord_type={}&price={}",
            self.market, self.side, self.ord_type, self.price
        )
    }
}

impl UpbitClient {
    /// Public endpoints only (quotes). Private calls fail with `NotConfigured`.
    pub fn public() -> Self {
        Self {
            http: build_http(),
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials: None,
        }
    }

    pub fn new(access_key: String, secret_key: String) -> Self {
        Self {
            http: build_http(),
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials: Some(Credentials {
                access_key,
                secret_key,
            }),
        }
    }

    /// Reads `UPBIT_ACCESS_KEY` / `UPBIT_SECRET_KEY`; falls back to public-only.
    pub fn from_env() -> Self {
        match (
            std::env::var("UPBIT_ACCESS_KEY").ok(),
            std::env::var("UPBIT_SECRET_KEY").ok(),
        ) {
            (Some(a), Some(s)) if !a.is_empty() && !s.is_empty() => Self::new(a, s),
            _ => Self::public(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    fn bearer(&self, query: Option<&str>) -> Result<String> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| anyhow!("UPBIT_ACCESS_KEY/UPBIT_SECRET_KEY not set"))?;
        let token = sign_jwt(&creds.access_key, &creds.secret_key, query)?;
        Ok(format!("Bearer {token}"))
    }

    async fn ticker(&self, market: &str) -> Result<Ticker, FetchError> {
        let url = format!("{}/ticker", self.base_url);
        let rows: Vec<Ticker> = self
            .http
            .get(url)
            .query(&[("markets", market)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| FetchError::InvalidResponse(format!("empty ticker for {market}")))
    }

    async fn accounts(&self) -> Result<Vec<Account>, FetchError> {
        let auth = self
            .bearer(None)
            .map_err(|e| FetchError::NotConfigured(e.to_string()))?;
        let url = format!("{}/accounts", self.base_url);
        let rows = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(rows)
    }

    async fn place_market_buy(
        &self,
        market: &str,
        amount: f64,
    ) -> Result<OrderResponse, ExecutionError> {
        let req = OrderRequest {
            market,
            side: "bid",
            ord_type: "price",
            price: format!("{:.0}", amount),
        };
        let auth = self
            .bearer(Some(&req.query_string()))
            .map_err(|e| ExecutionError::Rejected(e.to_string()))?;
        let url = format!("{}/orders", self.base_url);
        let resp = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, auth)
            .json(&req)
            .send()
            .await
            .map_err(|e| ExecutionError::Transport(format!("upbit order request: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExecutionError::Rejected(format!(
                "upbit order HTTP {status}: {body}"
            )));
        }
        resp.json()
            .await
            .map_err(|e| ExecutionError::Transport(format!("upbit order response: {e}")))
    }
}

fn build_http() -> reqwest::Client {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(4))
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_default()
}

/// `KRW-BTC` → `BTC`.
fn base_currency(market: &str) -> &str {
    market.split_once('-').map_or(market, |(_, base)| base)
}

fn parse_amount(raw: &str) -> f64 {
    raw.trim().parse::<f64>().unwrap_or(0.0)
}

/// HS256 JWT as Upbit expects it.
pub(crate) fn sign_jwt(access_key: &str, secret_key: &str, query: Option<&str>) -> Result<String> {
    let header = serde_json::json!({ "alg": "HS256", "typ": "JWT" });
    let mut payload = serde_json::json!({
        "access_key": access_key,
        "nonce": uuid::Uuid::new_v4().to_string(),
    });
    if let Some(q) = query {
        let hash = hex::encode(Sha512::digest(q.as_bytes()));
        payload["query_hash"] = serde_json::Value::String(hash);
        payload["query_hash_alg"] = serde_json::Value::String("SHA512".into());
    }

    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload)?)
    );
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
        .map_err(|e| anyhow!("hmac key: {e}"))?;
    mac.update(signing_input.as_bytes());
    let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{signing_input}.{sig}"))
}

#[async_trait]
impl MarketData for UpbitClient {
    async fn quote(&self, symbol: &str, mode: ReferenceMode) -> Result<Quote, FetchError> {
        let ticker = self.ticker(symbol).await?;
        let reference = match mode {
            ReferenceMode::PreviousClose => ticker.prev_closing_price,
            ReferenceMode::AverageBuyPrice => {
                let base = base_currency(symbol);
                self.accounts()
                    .await?
                    .iter()
                    .find(|a| a.currency == base)
                    .map(|a| parse_amount(&a.avg_buy_price))
                    .unwrap_or(0.0)
            }
        };
        tracing::debug!(target: "market", symbol, price = ticker.trade_price, reference, "upbit quote");
        Ok(Quote::from_prices(symbol, ticker.trade_price, reference))
    }

    fn name(&self) -> &'static str {
        "upbit"
    }
}

#[async_trait]
impl BalanceSource for UpbitClient {
    async fn available(&self, currency: &str) -> Result<Option<f64>, FetchError> {
        Ok(self
            .accounts()
            .await?
            .iter()
            .find(|a| a.currency == currency)
            .map(|a| parse_amount(&a.balance)))
    }
}

#[async_trait]
impl Executor for UpbitClient {
    async fn execute(&self, symbol: &str, amount: f64) -> Result<Confirmation, ExecutionError> {
        let o = self.place_market_buy(symbol, amount).await?;
        counter!("orders_total", "venue" => "upbit").increment(1);
        Ok(Confirmation {
            order_id: o.uuid,
            symbol: o.market,
            amount,
            state: o.state,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_part(part: &str) -> serde_json::Value {
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(part).unwrap()).unwrap()
    }

    #[test]
    fn jwt_has_three_parts_and_query_hash() {
        let q = "market=KRW-BTC&side=bid&ord_type=price&price=500000";
        let token = sign_jwt("ak", "sk", Some(q)).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(decode_part(parts[0])["alg"], "HS256");

        let payload = decode_part(parts[1]);
        assert_eq!(payload["access_key"], "ak");
        assert_eq!(payload["query_hash_alg"], "SHA512");
        assert_eq!(
            payload["query_hash"].as_str().unwrap(),
            hex::encode(Sha512::digest(q.as_bytes()))
        );
    }

    #[test]
    fn jwt_without_query_omits_hash() {
        let token = sign_jwt("ak", "sk", None).unwrap();
        let payload = decode_part(token.split('.').nth(1).unwrap());
        assert!(payload.get("query_hash").is_none());
    }

    #[test]
    fn base_currency_strips_quote_side() {
        assert_eq!(base_currency("KRW-BTC"), "BTC");
        assert_eq!(base_currency("ETH"), "ETH");
    }

    #[test]
    fn order_query_matches_body_fields() {
        let req = OrderRequest {
            market: "KRW-ETH",
            side: "bid",
            ord_type: "price",
            price: format!("{:.0}", 110_000.0),
        };
        assert_eq!(
            req.query_string(),
            "market=KRW-ETH&side=bid&ord_type=price&price=110000"
        );
    }
}
