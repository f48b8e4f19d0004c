// Decision oracle adapter: ships compact market summaries to an external
// decision service and decodes its free-text reply into typed verdicts.
// Replies are never trusted as-is: the first balanced JSON object is
// extracted and strictly validated, and anything else is a typed error.

pub mod openai;

pub use openai::OpenAiOracle;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::exchange::OrderbookTop;
use crate::indicators::IndicatorSet;
use crate::models::{Candle, PairSnapshot, SelectionVerdict, TradePlan};

/// Entries below this confidence are suppressed, exactly like an explicit
/// no-entry verdict.
pub const MIN_ENTRY_CONFIDENCE: f64 = 0.5;

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("decision service transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decision service HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("no JSON object found in decision reply")]
    ResponseFormat,

    #[error("malformed decision payload: {0}")]
    DecisionParse(String),
}

/// Compact indicator-backed summary of one candidate pair, the only data
/// the oracle sees at selection time.
#[derive(Debug, Clone)]
pub struct PairSummary {
    pub market: String,
    pub display_name: String,
    pub price: f64,
    pub change_rate_pct: f64,
    pub volume_24h: f64,
    pub rsi: Option<f64>,
    pub macd_line: Option<f64>,
    pub bollinger_position_pct: Option<f64>,
}

impl PairSummary {
    pub fn from_snapshot(snapshot: &PairSnapshot) -> Self {
        let set = IndicatorSet::from_closes(&snapshot.closes());
        Self {
            market: snapshot.market.clone(),
            display_name: snapshot.display_name.clone(),
            price: snapshot.last_price,
            change_rate_pct: snapshot.change_rate_pct,
            volume_24h: snapshot.volume_24h,
            rsi: set.rsi,
            macd_line: set.macd.map(|m| m.line),
            bollinger_position_pct: set
                .bollinger
                .map(|b| b.position_pct(snapshot.last_price)),
        }
    }
}

/// The two decisions the external service makes for us. Backends are
/// interchangeable behind this trait; both calls are single-shot, with
/// failures propagating to the scheduler.
#[async_trait]
pub trait DecisionOracle: Send + Sync {
    /// Pick the most promising pair, or decline to trade.
    async fn select_pair(
        &self,
        candidates: &[PairSummary],
    ) -> std::result::Result<SelectionVerdict, OracleError>;

    /// Produce entry/exit price targets for the selected pair.
    async fn plan_prices(
        &self,
        market: &str,
        candles: &[Candle],
        book: OrderbookTop,
    ) -> std::result::Result<TradePlan, OracleError>;
}

// ============== Reply decoding ==============

/// Extract the first balanced JSON object embedded in free text.
/// String literals and escapes are respected while matching braces.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

#[derive(Debug, Deserialize)]
struct SelectionRaw {
    #[serde(default)]
    no_entry: bool,
    market: Option<String>,
    confidence: Option<f64>,
    reason: Option<String>,
    #[serde(default)]
    expected_return_pct: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct PlanRaw {
    buy_price: Option<f64>,
    take_profit: Option<f64>,
    stop_loss: Option<f64>,
    reason: Option<String>,
}

/// Decode a selection reply. `candidates` resolve display names and keep
/// the verdict tied to a pair we actually offered.
pub fn parse_selection(
    text: &str,
    candidates: &[PairSummary],
) -> std::result::Result<SelectionVerdict, OracleError> {
    let json = extract_json_object(text).ok_or(OracleError::ResponseFormat)?;
    let raw: SelectionRaw = serde_json::from_str(json)
        .map_err(|e| OracleError::DecisionParse(e.to_string()))?;

    let reason = raw.reason.unwrap_or_else(|| "no reason given".to_string());

    if raw.no_entry {
        return Ok(SelectionVerdict::NoEntry { reason });
    }

    let market = raw
        .market
        .ok_or_else(|| OracleError::DecisionParse("missing market".to_string()))?;
    let confidence = raw
        .confidence
        .ok_or_else(|| OracleError::DecisionParse("missing confidence".to_string()))?;
    if !confidence.is_finite() {
        return Err(OracleError::DecisionParse("non-finite confidence".to_string()));
    }
    let confidence = confidence.clamp(0.0, 1.0);

    let candidate = candidates
        .iter()
        .find(|c| c.market == market)
        .ok_or_else(|| OracleError::DecisionParse(format!("unknown market {}", market)))?;

    // Weak conviction is treated exactly like an explicit pass
    if confidence < MIN_ENTRY_CONFIDENCE {
        return Ok(SelectionVerdict::NoEntry {
            reason: format!("confidence {:.2} below threshold ({})", confidence, reason),
        });
    }

    Ok(SelectionVerdict::Entry {
        market,
        display_name: candidate.display_name.clone(),
        confidence,
        reason,
        expected_return_pct: raw.expected_return_pct.unwrap_or(0.0),
    })
}

/// Decode a price-plan reply. Any structurally valid plan is accepted;
/// there is no confidence gate at this stage.
pub fn parse_plan(text: &str) -> std::result::Result<TradePlan, OracleError> {
    let json = extract_json_object(text).ok_or(OracleError::ResponseFormat)?;
    let raw: PlanRaw = serde_json::from_str(json)
        .map_err(|e| OracleError::DecisionParse(e.to_string()))?;

    let field = |value: Option<f64>, name: &str| -> std::result::Result<f64, OracleError> {
        let v = value.ok_or_else(|| OracleError::DecisionParse(format!("missing {}", name)))?;
        if !v.is_finite() || v <= 0.0 {
            return Err(OracleError::DecisionParse(format!("invalid {}: {}", name, v)));
        }
        Ok(v)
    };

    Ok(TradePlan {
        buy_price: field(raw.buy_price, "buy_price")?,
        take_profit: field(raw.take_profit, "take_profit")?,
        stop_loss: field(raw.stop_loss, "stop_loss")?,
        analysis: raw.reason.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(market: &str) -> PairSummary {
        PairSummary {
            market: market.to_string(),
            display_name: format!("{} coin", market),
            price: 100.0,
            change_rate_pct: 6.0,
            volume_24h: 1_000_000.0,
            rsi: Some(55.0),
            macd_line: Some(0.4),
            bollinger_position_pct: Some(62.0),
        }
    }

    #[test]
    fn test_extract_json_plain() {
        let text = r#"Sure! {"a": 1, "b": {"c": 2}} trailing"#;
        assert_eq!(extract_json_object(text), Some(r#"{"a": 1, "b": {"c": 2}}"#));
    }

    #[test]
    fn test_extract_json_braces_in_strings() {
        let text = r#"{"reason": "range {tight}", "x": 1}"#;
        assert_eq!(extract_json_object(text), Some(text));
    }

    #[test]
    fn test_extract_json_none() {
        assert_eq!(extract_json_object("no object here"), None);
        assert_eq!(extract_json_object("unbalanced { \"a\": 1"), None);
    }

    #[test]
    fn test_parse_selection_entry() {
        let verdict = parse_selection(
            r#"Picking one: {"no_entry": false, "market": "KRW-XRP", "confidence": 0.8,
                "reason": "volume spike", "expected_return_pct": 1.5}"#,
            &[summary("KRW-XRP")],
        )
        .unwrap();

        match verdict {
            SelectionVerdict::Entry {
                market, confidence, ..
            } => {
                assert_eq!(market, "KRW-XRP");
                assert_eq!(confidence, 0.8);
            }
            other => panic!("expected entry, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_selection_no_entry() {
        let verdict = parse_selection(
            r#"{"no_entry": true, "reason": "nothing moves"}"#,
            &[summary("KRW-XRP")],
        )
        .unwrap();
        assert!(matches!(verdict, SelectionVerdict::NoEntry { .. }));
    }

    #[test]
    fn test_parse_selection_low_confidence_suppressed() {
        let verdict = parse_selection(
            r#"{"no_entry": false, "market": "KRW-XRP", "confidence": 0.3, "reason": "weak"}"#,
            &[summary("KRW-XRP")],
        )
        .unwrap();
        assert!(matches!(verdict, SelectionVerdict::NoEntry { .. }));
    }

    #[test]
    fn test_parse_selection_missing_fields() {
        let err = parse_selection(
            r#"{"no_entry": false, "market": "KRW-XRP"}"#,
            &[summary("KRW-XRP")],
        )
        .unwrap_err();
        assert!(matches!(err, OracleError::DecisionParse(_)));
    }

    #[test]
    fn test_parse_selection_unknown_market() {
        let err = parse_selection(
            r#"{"market": "KRW-NOPE", "confidence": 0.9}"#,
            &[summary("KRW-XRP")],
        )
        .unwrap_err();
        assert!(matches!(err, OracleError::DecisionParse(_)));
    }

    #[test]
    fn test_parse_selection_no_json() {
        let err = parse_selection("I would not trade today.", &[summary("KRW-XRP")]).unwrap_err();
        assert!(matches!(err, OracleError::ResponseFormat));
    }

    #[test]
    fn test_parse_plan() {
        let plan = parse_plan(
            r#"{"buy_price": 100.0, "take_profit": 101.5, "stop_loss": 99.0,
                "reason": "tight range"}"#,
        )
        .unwrap();
        assert_eq!(plan.buy_price, 100.0);
        assert_eq!(plan.take_profit, 101.5);
        assert_eq!(plan.stop_loss, 99.0);
    }

    #[test]
    fn test_parse_plan_rejects_missing_target() {
        let err = parse_plan(r#"{"buy_price": 100.0, "stop_loss": 99.0}"#).unwrap_err();
        assert!(matches!(err, OracleError::DecisionParse(_)));
    }

    #[test]
    fn test_parse_plan_rejects_negative_price() {
        let err =
            parse_plan(r#"{"buy_price": -5, "take_profit": 101.0, "stop_loss": 99.0}"#)
                .unwrap_err();
        assert!(matches!(err, OracleError::DecisionParse(_)));
    }
}
