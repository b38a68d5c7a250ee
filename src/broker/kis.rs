//! Korea Investment & Securities open-API client.
//!
//! One client serves both segments: domestic endpoints under
//! `/uapi/domestic-stock`, overseas under `/uapi/overseas-stock` and
//! `/uapi/overseas-price`. All `tr_id`s below are the paper-trading
//! variants; the base URL in config selects the matching host.
//!
//! Numeric fields arrive as strings in every payload and are parsed at
//! the edge, so the rest of the crate only ever sees `f64`/`u32`.

use chrono::{Duration, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::auth::TokenCache;
use super::{AccountGateway, MarketData, OrderGateway};
use crate::config::BrokerConfig;
use crate::strategy::momentum;
use crate::types::{BotError, Candidate, Holding, Segment, Side};
use crate::universe;
use async_trait::async_trait;

// -- Transaction ids (paper trading) ----------------------------------------

const TR_DOMESTIC_BALANCE: &str = "VTTC8434R";
const TR_DOMESTIC_CASH: &str = "VTTC8908R";
const TR_DOMESTIC_PRICE: &str = "FHKST01010100";
const TR_DOMESTIC_DAILY: &str = "FHKST03010100";
const TR_DOMESTIC_BUY: &str = "VTTC0802U";
const TR_DOMESTIC_SELL: &str = "VTTC0801U";

const TR_OVERSEAS_BALANCE: &str = "VTTT3012R";
const TR_OVERSEAS_PRICE: &str = "HHDFS00000300";
const TR_OVERSEAS_DAILY: &str = "HHDFS76240000";
const TR_OVERSEAS_BUY: &str = "VTTT1002U";
const TR_OVERSEAS_SELL: &str = "VTTT1001U";

/// Calendar days fetched to cover the trading-day lookback with room for
/// holidays and weekends.
const HISTORY_CALENDAR_DAYS: i64 = 270;

// ---------------------------------------------------------------------------
// Response shapes (KIS JSON → Rust; only the fields we read)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DomesticPriceResponse {
    output: DomesticPriceOutput,
}

#[derive(Debug, Deserialize)]
struct DomesticPriceOutput {
    /// Current traded price, KRW integer as string.
    stck_prpr: String,
}

#[derive(Debug, Deserialize)]
struct DailyPriceResponse {
    rt_cd: String,
    #[serde(default)]
    msg1: Option<String>,
    /// Daily bars, newest first.
    #[serde(default)]
    output2: Vec<DailyBar>,
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    stck_clpr: String,
    /// Trading date, "YYYYMMDD". The overseas endpoint names it `xymd`.
    #[serde(default, alias = "xymd")]
    stck_bsop_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DomesticCashResponse {
    output: DomesticCashOutput,
}

#[derive(Debug, Deserialize)]
struct DomesticCashOutput {
    ord_psbl_cash: String,
}

#[derive(Debug, Deserialize)]
struct DomesticBalanceResponse {
    rt_cd: String,
    #[serde(default)]
    msg1: Option<String>,
    #[serde(default)]
    output1: Vec<DomesticPosition>,
}

#[derive(Debug, Deserialize)]
struct DomesticPosition {
    pdno: String,
    hldg_qty: String,
    #[serde(default)]
    evlu_amt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverseasBalanceResponse {
    rt_cd: String,
    #[serde(default)]
    msg1: Option<String>,
    #[serde(default)]
    output1: Vec<OverseasPosition>,
    #[serde(default)]
    output2: Option<OverseasAccountSummary>,
}

#[derive(Debug, Deserialize)]
struct OverseasPosition {
    ovrs_pdno: String,
    ovrs_cblc_qty: String,
    #[serde(default)]
    now_pric2: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverseasAccountSummary {
    /// Foreign-currency deposit; the API populates one of these two
    /// depending on account state.
    #[serde(default)]
    frcr_dncl_amt_2: Option<String>,
    #[serde(default)]
    frcr_pchs_amt1: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OverseasPriceResponse {
    output: OverseasPriceOutput,
}

#[derive(Debug, Deserialize)]
struct OverseasPriceOutput {
    last: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    rt_cd: String,
    #[serde(default)]
    msg1: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HashkeyResponse {
    #[serde(rename = "HASH")]
    hash: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct KisClient {
    http: Client,
    base_url: String,
    app_key: String,
    app_secret: SecretString,
    account_no: String,
    product_code: String,
    token: Arc<TokenCache>,
}

impl KisClient {
    pub fn new(
        http: Client,
        cfg: &BrokerConfig,
        app_key: String,
        app_secret: SecretString,
        token: Arc<TokenCache>,
    ) -> Self {
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            app_key,
            app_secret,
            account_no: cfg.account_no.clone(),
            product_code: cfg.account_product_code.clone(),
            token,
        }
    }

    // -- Internal helpers ------------------------------------------------

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        tr_id: &str,
        query: &[(&str, String)],
    ) -> Result<T, BotError> {
        let token = self.token.acquire().await?;
        debug!(path, tr_id, "KIS GET");

        let resp = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .header("authorization", format!("Bearer {token}"))
            .header("appkey", self.app_key.as_str())
            .header("appsecret", self.app_secret.expose_secret())
            .header("tr_id", tr_id)
            .header("custtype", "P")
            .query(query)
            .send()
            .await?
            .error_for_status()?;

        Ok(resp.json::<T>().await?)
    }

    async fn post_order_json(
        &self,
        path: &str,
        tr_id: &str,
        body: &serde_json::Value,
    ) -> Result<OrderResponse, BotError> {
        let token = self.token.acquire().await?;
        let hashkey = self.hashkey(body).await?;
        debug!(path, tr_id, "KIS order POST");

        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("authorization", format!("Bearer {token}"))
            .header("appkey", self.app_key.as_str())
            .header("appsecret", self.app_secret.expose_secret())
            .header("tr_id", tr_id)
            .header("custtype", "P")
            .header("hashkey", hashkey)
            .json(body)
            .send()
            .await?
            .error_for_status()?;

        Ok(resp.json::<OrderResponse>().await?)
    }

    /// Order POSTs must carry a server-issued hash of their body.
    async fn hashkey(&self, body: &serde_json::Value) -> Result<String, BotError> {
        let resp = self
            .http
            .post(format!("{}/uapi/hashkey", self.base_url))
            .header("appKey", self.app_key.as_str())
            .header("appSecret", self.app_secret.expose_secret())
            .json(body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: HashkeyResponse = resp.json().await?;
        Ok(parsed.hash)
    }

    /// Daily closes for a candidate, oldest first.
    async fn daily_closes(&self, candidate: &Candidate) -> Result<Vec<f64>, BotError> {
        let bars = self.fetch_daily_bars(candidate, HISTORY_CALENDAR_DAYS).await?;
        // Bars arrive newest first; the strategy wants chronological order.
        let mut closes = bars
            .iter()
            .map(|b| parse_num(&b.stck_clpr))
            .collect::<Result<Vec<f64>, _>>()?;
        closes.reverse();
        Ok(closes)
    }

    /// Dated daily closes, oldest first. Used by the backtest binary,
    /// which needs the calendar for month-end resampling.
    pub async fn daily_series(
        &self,
        candidate: &Candidate,
        calendar_days: i64,
    ) -> Result<Vec<crate::types::PricePoint>, BotError> {
        let bars = self.fetch_daily_bars(candidate, calendar_days).await?;
        let mut points = Vec::with_capacity(bars.len());
        for bar in &bars {
            let raw = bar.stck_bsop_date.as_deref().ok_or_else(|| {
                BotError::Malformed("daily bar without a trading date".to_string())
            })?;
            let date = chrono::NaiveDate::parse_from_str(raw, "%Y%m%d")
                .map_err(|_| BotError::Malformed(format!("bad trading date: {raw:?}")))?;
            points.push(crate::types::PricePoint {
                date,
                close: parse_num(&bar.stck_clpr)?,
            });
        }
        points.reverse();
        Ok(points)
    }

    async fn fetch_daily_bars(
        &self,
        candidate: &Candidate,
        calendar_days: i64,
    ) -> Result<Vec<DailyBar>, BotError> {
        let end = Utc::now().date_naive();
        let start = end - Duration::days(calendar_days);
        let fmt = |d: chrono::NaiveDate| d.format("%Y%m%d").to_string();

        let bars = match segment_of(candidate) {
            Segment::Domestic => {
                let resp: DailyPriceResponse = self
                    .get_json(
                        "/uapi/domestic-stock/v1/quotations/inquire-daily-itemchartprice",
                        TR_DOMESTIC_DAILY,
                        &[
                            ("FID_COND_MRKT_DIV_CODE", "J".to_string()),
                            ("FID_INPUT_ISCD", candidate.code.to_string()),
                            ("FID_INPUT_DATE_1", fmt(start)),
                            ("FID_INPUT_DATE_2", fmt(end)),
                            ("FID_PERIOD_DIV_CODE", "D".to_string()),
                            ("FID_ORG_ADJ_PRC", "0".to_string()),
                        ],
                    )
                    .await?;
                ensure_ok(&resp.rt_cd, &resp.msg1)?;
                resp.output2
            }
            Segment::Overseas => {
                let resp: DailyPriceResponse = self
                    .get_json(
                        "/uapi/overseas-stock/v1/quotations/inquire-period-price",
                        TR_OVERSEAS_DAILY,
                        &[
                            ("FID_COND_MRKT_DIV_CODE", "N".to_string()),
                            ("FID_INPUT_ISCD", candidate.code.to_string()),
                            ("FID_INPUT_DATE_1", fmt(start)),
                            ("FID_INPUT_DATE_2", fmt(end)),
                            ("FID_PERIOD_DIV_CODE", "D".to_string()),
                        ],
                    )
                    .await?;
                ensure_ok(&resp.rt_cd, &resp.msg1)?;
                resp.output2
            }
        };

        Ok(bars)
    }
}

/// Which endpoint family serves a candidate: KRX listings go through the
/// domestic API, everything else through the overseas API.
fn segment_of(candidate: &Candidate) -> Segment {
    if candidate.exchange == "KRX" {
        Segment::Domestic
    } else {
        Segment::Overseas
    }
}

fn ensure_ok(rt_cd: &str, msg1: &Option<String>) -> Result<(), BotError> {
    if rt_cd == "0" {
        Ok(())
    } else {
        Err(BotError::Malformed(format!(
            "rt_cd={rt_cd}: {}",
            msg1.as_deref().unwrap_or("no message")
        )))
    }
}

fn parse_num(s: &str) -> Result<f64, BotError> {
    s.trim()
        .replace(',', "")
        .parse::<f64>()
        .map_err(|_| BotError::Malformed(format!("non-numeric field: {s:?}")))
}

// ---------------------------------------------------------------------------
// Gateway implementations
// ---------------------------------------------------------------------------

#[async_trait]
impl MarketData for KisClient {
    async fn trailing_return(
        &self,
        candidate: &Candidate,
        lookback: usize,
    ) -> Result<f64, BotError> {
        let closes = self.daily_closes(candidate).await.map_err(|e| match e {
            BotError::Auth(_) | BotError::Transport(_) => e,
            other => BotError::DataUnavailable {
                symbol: candidate.code.to_string(),
                reason: other.to_string(),
            },
        })?;
        momentum::trailing_return(&closes, lookback)
    }

    async fn current_price(&self, candidate: &Candidate) -> Result<f64, BotError> {
        let quote_err = |reason: String| BotError::QuoteUnavailable {
            symbol: candidate.code.to_string(),
            reason,
        };

        match segment_of(candidate) {
            Segment::Domestic => {
                let resp: DomesticPriceResponse = self
                    .get_json(
                        "/uapi/domestic-stock/v1/quotations/inquire-price",
                        TR_DOMESTIC_PRICE,
                        &[
                            ("FID_COND_MRKT_DIV_CODE", "J".to_string()),
                            ("FID_INPUT_ISCD", candidate.code.to_string()),
                        ],
                    )
                    .await
                    .map_err(|e| quote_err(e.to_string()))?;
                parse_num(&resp.output.stck_prpr).map_err(|e| quote_err(e.to_string()))
            }
            Segment::Overseas => {
                let resp: OverseasPriceResponse = self
                    .get_json(
                        "/uapi/overseas-price/v1/quotations/price",
                        TR_OVERSEAS_PRICE,
                        &[
                            ("AUTH", String::new()),
                            ("EXCD", candidate.exchange.to_string()),
                            ("SYMB", candidate.code.to_string()),
                        ],
                    )
                    .await
                    .map_err(|e| quote_err(e.to_string()))?;
                parse_num(&resp.output.last).map_err(|e| quote_err(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl AccountGateway for KisClient {
    async fn holdings(&self, segment: Segment) -> Result<Vec<Holding>, BotError> {
        match segment {
            Segment::Domestic => {
                let resp: DomesticBalanceResponse = self
                    .get_json(
                        "/uapi/domestic-stock/v1/trading/inquire-balance",
                        TR_DOMESTIC_BALANCE,
                        &[
                            ("CANO", self.account_no.clone()),
                            ("ACNT_PRDT_CD", self.product_code.clone()),
                            ("AFHR_FLPR_YN", "N".to_string()),
                            ("OFL_YN", "N".to_string()),
                            ("INQR_DVSN", "02".to_string()),
                            ("UNPR_DVSN", "01".to_string()),
                            ("FUND_STTL_ICLD_YN", "N".to_string()),
                            ("FNCG_AMT_AUTO_RDPT_YN", "N".to_string()),
                            ("PRCS_DVSN", "00".to_string()),
                            ("CTX_AREA_FK100", String::new()),
                            ("CTX_AREA_NK100", String::new()),
                        ],
                    )
                    .await?;
                ensure_ok(&resp.rt_cd, &resp.msg1)?;

                let mut holdings = Vec::new();
                for pos in &resp.output1 {
                    let quantity = parse_num(&pos.hldg_qty)? as u32;
                    if quantity == 0 {
                        continue;
                    }
                    let market_value = pos
                        .evlu_amt
                        .as_deref()
                        .map(parse_num)
                        .transpose()?
                        .unwrap_or(0.0);
                    holdings.push(Holding {
                        symbol: pos.pdno.clone(),
                        quantity,
                        market_value,
                    });
                }
                Ok(holdings)
            }
            Segment::Overseas => {
                let resp = self.overseas_balance().await?;
                let mut holdings = Vec::new();
                for pos in &resp.output1 {
                    let quantity = parse_num(&pos.ovrs_cblc_qty)? as u32;
                    if quantity == 0 {
                        continue;
                    }
                    let price = pos
                        .now_pric2
                        .as_deref()
                        .map(parse_num)
                        .transpose()?
                        .unwrap_or(0.0);
                    holdings.push(Holding {
                        symbol: pos.ovrs_pdno.clone(),
                        quantity,
                        market_value: quantity as f64 * price,
                    });
                }
                Ok(holdings)
            }
        }
    }

    async fn cash_balance(&self, segment: Segment) -> Result<f64, BotError> {
        match segment {
            Segment::Domestic => {
                let resp: DomesticCashResponse = self
                    .get_json(
                        "/uapi/domestic-stock/v1/trading/inquire-psbl-order",
                        TR_DOMESTIC_CASH,
                        &[
                            ("CANO", self.account_no.clone()),
                            ("ACNT_PRDT_CD", self.product_code.clone()),
                            ("PDNO", "005930".to_string()),
                            ("ORD_UNPR", "0".to_string()),
                            ("ORD_DVSN", "01".to_string()),
                            ("CMA_EVLU_AMT_ICLD_YN", "Y".to_string()),
                            ("OVRS_ICLD_YN", "Y".to_string()),
                        ],
                    )
                    .await?;
                parse_num(&resp.output.ord_psbl_cash)
            }
            Segment::Overseas => {
                let resp = self.overseas_balance().await?;
                let summary = resp.output2.ok_or_else(|| {
                    BotError::Malformed("overseas balance without summary block".to_string())
                })?;
                let deposit = summary
                    .frcr_dncl_amt_2
                    .or(summary.frcr_pchs_amt1)
                    .unwrap_or_else(|| "0".to_string());
                parse_num(&deposit)
            }
        }
    }
}

impl KisClient {
    async fn overseas_balance(&self) -> Result<OverseasBalanceResponse, BotError> {
        let resp: OverseasBalanceResponse = self
            .get_json(
                "/uapi/overseas-stock/v1/trading/inquire-balance",
                TR_OVERSEAS_BALANCE,
                &[
                    ("CANO", self.account_no.clone()),
                    ("ACNT_PRDT_CD", self.product_code.clone()),
                    ("OVRS_EXCG_CD", "NASD".to_string()),
                    ("TR_CRCY_CD", "USD".to_string()),
                    ("WCRC_FRCR_DVSN_CD", "02".to_string()),
                    ("CTX_AREA_FK200", String::new()),
                    ("CTX_AREA_NK200", String::new()),
                ],
            )
            .await?;
        ensure_ok(&resp.rt_cd, &resp.msg1)?;
        Ok(resp)
    }
}

#[async_trait]
impl OrderGateway for KisClient {
    async fn submit_order(
        &self,
        segment: Segment,
        symbol: &str,
        quantity: u32,
        price: f64,
        side: Side,
    ) -> Result<(), BotError> {
        let resp = match segment {
            Segment::Domestic => {
                let tr_id = match side {
                    Side::Buy => TR_DOMESTIC_BUY,
                    Side::Sell => TR_DOMESTIC_SELL,
                };
                let body = serde_json::json!({
                    "CANO": self.account_no,
                    "ACNT_PRDT_CD": self.product_code,
                    "PDNO": symbol,
                    "ORD_DVSN": "00",
                    "ORD_QTY": quantity.to_string(),
                    "ORD_UNPR": format!("{price:.0}"),
                });
                self.post_order_json("/uapi/domestic-stock/v1/trading/order-cash", tr_id, &body)
                    .await?
            }
            Segment::Overseas => {
                let tr_id = match side {
                    Side::Buy => TR_OVERSEAS_BUY,
                    Side::Sell => TR_OVERSEAS_SELL,
                };
                let body = serde_json::json!({
                    "CANO": self.account_no,
                    "ACNT_PRDT_CD": self.product_code,
                    "OVRS_EXCG_CD": universe::exchange_for(segment, symbol),
                    "PDNO": symbol,
                    "ORD_QTY": quantity.to_string(),
                    "OVRS_ORD_UNPR": format!("{price:.2}"),
                    "ORD_SVR_DVSN_CD": "0",
                    "ORD_DVSN": "00",
                });
                self.post_order_json("/uapi/overseas-stock/v1/trading/order", tr_id, &body)
                    .await?
            }
        };

        if resp.rt_cd == "0" {
            Ok(())
        } else {
            Err(BotError::OrderRejected {
                message: resp.msg1.unwrap_or_else(|| "no broker message".to_string()),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_num_variants() {
        assert_eq!(parse_num("35000").unwrap(), 35000.0);
        assert_eq!(parse_num("  71.2300 ").unwrap(), 71.23);
        assert_eq!(parse_num("1,000,000").unwrap(), 1_000_000.0);
        assert!(parse_num("-").is_err());
        assert!(parse_num("").is_err());
    }

    #[test]
    fn test_ensure_ok() {
        assert!(ensure_ok("0", &None).is_ok());
        let err = ensure_ok("1", &Some("모의투자 장시간이 아닙니다".to_string())).unwrap_err();
        assert!(format!("{err}").contains("rt_cd=1"));
    }

    #[test]
    fn test_segment_of_candidate() {
        assert_eq!(segment_of(&universe::DOMESTIC[0]), Segment::Domestic);
        assert_eq!(segment_of(&universe::OVERSEAS[2]), Segment::Overseas);
    }

    #[test]
    fn test_balance_response_parses_kis_shape() {
        let json = r#"{
            "rt_cd": "0",
            "msg1": "정상처리 되었습니다.",
            "output1": [
                {"ovrs_pdno": "TQQQ", "ovrs_cblc_qty": "12", "now_pric2": "71.2300"},
                {"ovrs_pdno": "GLD", "ovrs_cblc_qty": "0", "now_pric2": "189.5000"}
            ],
            "output2": {"frcr_dncl_amt_2": "1523.77"}
        }"#;
        let resp: OverseasBalanceResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.output1.len(), 2);
        assert_eq!(resp.output1[0].ovrs_pdno, "TQQQ");
        assert_eq!(
            resp.output2.unwrap().frcr_dncl_amt_2.as_deref(),
            Some("1523.77")
        );
    }

    #[test]
    fn test_daily_response_tolerates_missing_rows() {
        let json = r#"{"rt_cd": "0", "msg1": null}"#;
        let resp: DailyPriceResponse = serde_json::from_str(json).unwrap();
        assert!(resp.output2.is_empty());
    }
}
