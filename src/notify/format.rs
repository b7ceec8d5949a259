//! Message rendering

use super::Notification;
use crate::detector::AlertEvent;
use crate::market::Market;

/// Render a notification as a plain-text chat message
pub fn render(notification: &Notification) -> String {
    match notification {
        Notification::NewMarket(market) => {
            format!("🆕 New Market Found!\n\n{}", market_block(market))
        }
        Notification::MarketClosed(market) => {
            format!("🔒 Market Closed\n\n{}", market_block(market))
        }
        Notification::PriceMove(event) => price_move(event),
    }
}

fn market_block(market: &Market) -> String {
    let price = |p: Option<rust_decimal::Decimal>| {
        p.map_or_else(|| "n/a".to_string(), |p| format!("${}", p.round_dp(3)))
    };

    let mut text = format!(
        "Condition ID: {}\nQuestion: {}\nTokens: {}: {}, {}: {}",
        market.condition_id,
        market.question,
        market.yes_outcome,
        price(market.yes_price),
        market.no_outcome,
        price(market.no_price),
    );
    if !market.tags.is_empty() {
        text.push_str(&format!("\nTags: {}", market.tags.join(", ")));
    }
    if let Some(close) = market.close_time {
        text.push_str(&format!("\nCloses: {}", close.format("%Y-%m-%d %H:%M UTC")));
    }
    text
}

fn price_move(event: &AlertEvent) -> String {
    format!(
        "⚠️ Price Change Alert!\n\nMarket: {}\nYes moved {} by {} in last {}\nYes: {} -> {}\nNo: {} -> {}\nCondition ID: {}",
        event.question,
        event.direction,
        event.yes_delta().abs().round_dp(3),
        event.bucket,
        event.old_yes.round_dp(3),
        event.new_yes.round_dp(3),
        event.old_no.round_dp(3),
        event.new_no.round_dp(3),
        event.condition_id,
    )
}
