//! Live exchange adapter over a REST order gateway
//!
//! The concrete venue protocol is an external concern; this adapter speaks
//! to a ccxt-style HTTP gateway (ticker, order placement, order status,
//! cancellation) and maps its responses onto the port types. Venue-side
//! rejections become `ExchangeRejected`, transport problems `Transport`.

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::ExchangePort;
use crate::errors::{GridError, GridResult};
use crate::types::{ExchangeOrder, OrderSide, OrderStatus, OrderUpdate, Ticker};

pub struct RestExchange {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl RestExchange {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            req = req.header("X-API-KEY", key);
        }
        req
    }
}

#[derive(Debug, Deserialize)]
struct TickerDto {
    last: f64,
    #[serde(default)]
    bid: Option<f64>,
    #[serde(default)]
    ask: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OrderDto {
    id: String,
    status: String,
    #[serde(default)]
    timestamp: Option<i64>,
    #[serde(default)]
    price: Option<f64>,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    average: Option<f64>,
    #[serde(default)]
    cost: Option<f64>,
}

impl OrderDto {
    fn status(&self) -> OrderStatus {
        match self.status.as_str() {
            "closed" => OrderStatus::Closed,
            "canceled" => OrderStatus::Canceled,
            _ => OrderStatus::Open,
        }
    }
}

#[derive(Debug, Serialize)]
struct PlaceOrderBody<'a> {
    symbol: &'a str,
    #[serde(rename = "type")]
    order_type: &'a str,
    side: &'a str,
    amount: f64,
    price: f64,
}

#[async_trait]
impl ExchangePort for RestExchange {
    async fn fetch_ticker(&self, symbol: &str) -> GridResult<Ticker> {
        let dto: TickerDto = self
            .request(reqwest::Method::GET, "/ticker")
            .query(&[("symbol", symbol)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(Ticker {
            last: dto.last,
            bid: dto.bid,
            ask: dto.ask,
        })
    }

    async fn fetch_orders(&self, symbol: &str, ids: &[String]) -> GridResult<Vec<OrderUpdate>> {
        let dtos: Vec<OrderDto> = self
            .request(reqwest::Method::GET, "/orders")
            .query(&[("symbol", symbol), ("ids", &ids.join(","))])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(dtos
            .into_iter()
            .map(|dto| OrderUpdate {
                status: dto.status(),
                average: dto.average,
                cost: dto.cost,
                id: dto.id,
            })
            .collect())
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        amount: f64,
        price: f64,
    ) -> GridResult<ExchangeOrder> {
        let response = self
            .request(reqwest::Method::POST, "/orders")
            .json(&PlaceOrderBody {
                symbol,
                order_type: "limit",
                side: side.as_str(),
                amount,
                price,
            })
            .send()
            .await?;

        if response.status().is_client_error() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GridError::ExchangeRejected(detail));
        }
        let dto: OrderDto = response.error_for_status()?.json().await?;
        debug!("live {symbol}: placed {side:?} {amount} @ {price} as {}", dto.id);
        Ok(ExchangeOrder {
            timestamp: dto.timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
            price: dto.price.unwrap_or(price),
            amount: dto.amount.unwrap_or(amount),
            cost: dto.cost,
            average: dto.average,
            id: dto.id,
        })
    }

    async fn cancel_order(&self, symbol: &str, id: &str) -> GridResult<()> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("/orders/{id}"))
            .query(&[("symbol", symbol)])
            .send()
            .await?;
        if response.status() == StatusCode::CONFLICT {
            return Err(GridError::OrderNotCancelable(id.to_string()));
        }
        response.error_for_status()?;
        Ok(())
    }
}
