//! OpenAI-backed decision oracle.
//!
//! Sends indicator summaries to the chat-completions API and decodes the
//! reply through the strict parsers in the parent module. Both calls are
//! single-shot: transport or format failures surface to the scheduler,
//! which applies cycle-level backoff instead of retrying here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::exchange::OrderbookTop;
use crate::models::{Candle, SelectionVerdict, TradePlan};
use crate::oracle::{parse_plan, parse_selection, DecisionOracle, OracleError, PairSummary};

const OPENAI_API_BASE: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const MAX_TOKENS: u32 = 1024;

/// Number of recent candles included in the price-analysis prompt.
const PLAN_CANDLE_COUNT: usize = 20;

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: MessageContent,
}

#[derive(Debug, Deserialize)]
struct MessageContent {
    content: String,
}

pub struct OpenAiOracle {
    api_key: String,
    model: String,
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiOracle {
    pub fn new(api_key: String, model: Option<String>) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            client: reqwest::Client::new(),
            base_url: OPENAI_API_BASE.to_string(),
        }
    }

    /// Point the client at a different host (HTTP-mock tests).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// One blocking completion call. No retries.
    async fn complete(&self, system: &str, prompt: String) -> Result<String, OracleError> {
        let request = ChatRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            messages: vec![
                Message {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                Message {
                    role: "user".to_string(),
                    content: prompt,
                },
            ],
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", &self.api_key))
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::Http { status, body });
        }

        let parsed: ChatResponse = response.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(OracleError::ResponseFormat)?;

        Ok(text)
    }

    fn selection_prompt(candidates: &[PairSummary]) -> String {
        let fmt_opt = |v: Option<f64>| match v {
            Some(x) => format!("{:.2}", x),
            None => "n/a".to_string(),
        };

        let rows: Vec<String> = candidates
            .iter()
            .map(|c| {
                format!(
                    "- {} ({}): price {:.2}, 24h change {:+.2}%, 24h value {:.0}, RSI(14) {}, MACD {}, BB position {}%",
                    c.market,
                    c.display_name,
                    c.price,
                    c.change_rate_pct,
                    c.volume_24h,
                    fmt_opt(c.rsi),
                    fmt_opt(c.macd_line),
                    fmt_opt(c.bollinger_position_pct),
                )
            })
            .collect();

        format!(
            r#"You are screening volatile crypto pairs for a short scalping entry (minutes-long hold).

## Candidates
{}

Pick at most ONE pair with a clear short-term setup, or decline.

Respond ONLY with valid JSON (no markdown, no code blocks):

{{
  "no_entry": false,
  "market": "<market code from the list>",
  "confidence": 0.0,
  "expected_return_pct": 0.0,
  "reason": "1-2 sentences"
}}

Set "no_entry": true and omit the market when nothing qualifies.
Confidence is 0.0-1.0; be conservative, anything under 0.5 is discarded."#,
            rows.join("\n")
        )
    }

    fn plan_prompt(market: &str, candles: &[Candle], book: OrderbookTop) -> String {
        let rows: Vec<String> = candles
            .iter()
            .take(PLAN_CANDLE_COUNT)
            .map(|c| {
                format!(
                    "{{\"time\": \"{}\", \"open\": {:.4}, \"high\": {:.4}, \"low\": {:.4}, \"close\": {:.4}, \"volume\": {:.2}}}",
                    c.timestamp.format("%Y-%m-%d %H:%M"),
                    c.open,
                    c.high,
                    c.low,
                    c.close,
                    c.volume
                )
            })
            .collect();

        format!(
            r#"Set scalping price targets for {}.

## Order book
- Best bid: {:.4}
- Best ask: {:.4}

## Recent 1-minute candles (newest first)
{}

Choose a realistic limit buy price near the book, a take-profit above it and
a stop-loss below it, sized for a minutes-long hold.

Respond ONLY with valid JSON (no markdown, no code blocks):

{{
  "buy_price": 0.0,
  "take_profit": 0.0,
  "stop_loss": 0.0,
  "reason": "1-2 sentences"
}}"#,
            market, book.best_bid, book.best_ask,
            rows.join(",\n")
        )
    }
}

const SYSTEM_FRAMING: &str = "You are an expert cryptocurrency scalping analyst. \
Analyze the provided market data and answer with valid JSON only, no markdown formatting.";

#[async_trait]
impl DecisionOracle for OpenAiOracle {
    async fn select_pair(
        &self,
        candidates: &[PairSummary],
    ) -> Result<SelectionVerdict, OracleError> {
        let prompt = Self::selection_prompt(candidates);
        let reply = self.complete(SYSTEM_FRAMING, prompt).await?;
        parse_selection(&reply, candidates)
    }

    async fn plan_prices(
        &self,
        market: &str,
        candles: &[Candle],
        book: OrderbookTop,
    ) -> Result<TradePlan, OracleError> {
        let prompt = Self::plan_prompt(market, candles, book);
        let reply = self.complete(SYSTEM_FRAMING, prompt).await?;
        parse_plan(&reply)
    }
}
