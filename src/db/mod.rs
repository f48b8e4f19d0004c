use crate::models::{TradeRecord, TradeStatus};
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

/// Postgres persistence for trade records
pub struct TradeStore {
    pool: PgPool,
}

impl TradeStore {
    /// Connect to Postgres and run pending migrations.
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        tracing::info!("Connected to Postgres trade store");

        Ok(Self { pool })
    }

    /// Upsert a trade record. Called at each status transition so the row
    /// always reflects the latest known state of the trade.
    pub async fn save_trade(&self, record: &TradeRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO trade_records (
                id, market, status, plan_buy_price, take_profit, stop_loss,
                analysis, buy_order_id, buy_price, buy_volume, bought_at,
                sell_order_id, sell_price, profit_rate, profit_amount,
                created_at, closed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                buy_order_id = EXCLUDED.buy_order_id,
                buy_price = EXCLUDED.buy_price,
                buy_volume = EXCLUDED.buy_volume,
                bought_at = EXCLUDED.bought_at,
                sell_order_id = EXCLUDED.sell_order_id,
                sell_price = EXCLUDED.sell_price,
                profit_rate = EXCLUDED.profit_rate,
                profit_amount = EXCLUDED.profit_amount,
                closed_at = EXCLUDED.closed_at,
                updated_at = NOW()
            "#,
        )
        .bind(record.id)
        .bind(&record.market)
        .bind(record.status.as_str())
        .bind(record.plan_buy_price)
        .bind(record.take_profit)
        .bind(record.stop_loss)
        .bind(&record.analysis)
        .bind(&record.buy_order_id)
        .bind(record.buy_price)
        .bind(record.buy_volume)
        .bind(record.bought_at)
        .bind(&record.sell_order_id)
        .bind(record.sell_price)
        .bind(record.profit_rate)
        .bind(record.profit_amount)
        .bind(record.created_at)
        .bind(record.closed_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Saved trade {} for {} to Postgres", record.id, record.market);

        Ok(())
    }

    pub async fn load_trade(&self, id: Uuid) -> Result<Option<TradeRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, market, status, plan_buy_price, take_profit, stop_loss,
                   analysis, buy_order_id, buy_price, buy_volume, bought_at,
                   sell_order_id, sell_price, profit_rate, profit_amount,
                   created_at, closed_at
            FROM trade_records
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(record_from_row).transpose()
    }

    /// Most recent trades, newest first.
    pub async fn load_recent(&self, limit: i64) -> Result<Vec<TradeRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, market, status, plan_buy_price, take_profit, stop_loss,
                   analysis, buy_order_id, buy_price, buy_volume, bought_at,
                   sell_order_id, sell_price, profit_rate, profit_amount,
                   created_at, closed_at
            FROM trade_records
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let records: Vec<TradeRecord> = rows
            .into_iter()
            .map(record_from_row)
            .collect::<Result<_>>()?;

        tracing::info!("Loaded {} trades from Postgres", records.len());

        Ok(records)
    }
}

fn record_from_row(row: sqlx::postgres::PgRow) -> Result<TradeRecord> {
    let id: Uuid = row.get("id");
    let market: String = row.get("market");
    let status_str: String = row.get("status");
    let plan_buy_price: rust_decimal::Decimal = row.get("plan_buy_price");
    let take_profit: rust_decimal::Decimal = row.get("take_profit");
    let stop_loss: rust_decimal::Decimal = row.get("stop_loss");
    let analysis: String = row.get("analysis");
    let buy_order_id: Option<String> = row.get("buy_order_id");
    let buy_price: Option<rust_decimal::Decimal> = row.get("buy_price");
    let buy_volume: Option<rust_decimal::Decimal> = row.get("buy_volume");
    let bought_at: Option<DateTime<Utc>> = row.get("bought_at");
    let sell_order_id: Option<String> = row.get("sell_order_id");
    let sell_price: Option<rust_decimal::Decimal> = row.get("sell_price");
    let profit_rate: Option<rust_decimal::Decimal> = row.get("profit_rate");
    let profit_amount: Option<rust_decimal::Decimal> = row.get("profit_amount");
    let created_at: DateTime<Utc> = row.get("created_at");
    let closed_at: Option<DateTime<Utc>> = row.get("closed_at");

    let status = TradeStatus::parse(&status_str)
        .ok_or_else(|| format!("Invalid trade status: {status_str}"))?;

    Ok(TradeRecord {
        id,
        market,
        status,
        plan_buy_price: plan_buy_price.to_string().parse()?,
        take_profit: take_profit.to_string().parse()?,
        stop_loss: stop_loss.to_string().parse()?,
        analysis,
        buy_order_id,
        buy_price: buy_price.map(|v| v.to_string().parse()).transpose()?,
        buy_volume: buy_volume.map(|v| v.to_string().parse()).transpose()?,
        bought_at,
        sell_order_id,
        sell_price: sell_price.map(|v| v.to_string().parse()).transpose()?,
        profit_rate: profit_rate.map(|v| v.to_string().parse()).transpose()?,
        profit_amount: profit_amount.map(|v| v.to_string().parse()).transpose()?,
        created_at,
        closed_at,
    })
}
