//! Core types shared by the RPC calls and bots

use crate::proto::{get_trades_request::Category, OfferInfo, TradeInfo};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const SATOSHIS_PER_BTC: i64 = 100_000_000;

/// Offer direction, always from the BTC point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(Direction::Buy),
            "SELL" => Ok(Direction::Sell),
            other => Err(format!("invalid direction '{}', expected BUY or SELL", other)),
        }
    }
}

impl TryFrom<String> for Direction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Direction> for String {
    fn from(direction: Direction) -> Self {
        direction.as_str().to_string()
    }
}

/// Trade list category accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeCategory {
    Open,
    Closed,
    Failed,
}

impl FromStr for TradeCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(TradeCategory::Open),
            "closed" => Ok(TradeCategory::Closed),
            "failed" => Ok(TradeCategory::Failed),
            other => Err(format!("invalid trade category '{}', expected open, closed or failed", other)),
        }
    }
}

impl fmt::Display for TradeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeCategory::Open => write!(f, "OPEN"),
            TradeCategory::Closed => write!(f, "CLOSED"),
            TradeCategory::Failed => write!(f, "FAILED"),
        }
    }
}

impl From<TradeCategory> for Category {
    fn from(category: TradeCategory) -> Self {
        match category {
            TradeCategory::Open => Category::Open,
            TradeCategory::Closed => Category::Closed,
            TradeCategory::Failed => Category::Failed,
        }
    }
}

/// The six "take best priced offer" markets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TakerMarket {
    BuyBtc,
    SellBtc,
    BuyXmr,
    SellXmr,
    BuyBsq,
    SellBsq,
}

impl TakerMarket {
    /// Direction of the offers this market takes
    pub fn offer_direction(&self) -> Direction {
        match self {
            TakerMarket::BuyBtc => Direction::Buy,
            TakerMarket::SellBtc => Direction::Sell,
            TakerMarket::BuyXmr => Direction::Sell,
            TakerMarket::SellXmr => Direction::Buy,
            TakerMarket::BuyBsq => Direction::Sell,
            TakerMarket::SellBsq => Direction::Buy,
        }
    }

    /// Fixed currency for altcoin markets, `None` when the payment account decides
    pub fn fixed_currency(&self) -> Option<&'static str> {
        match self {
            TakerMarket::BuyXmr | TakerMarket::SellXmr => Some("XMR"),
            TakerMarket::BuyBsq | TakerMarket::SellBsq => Some("BSQ"),
            TakerMarket::BuyBtc | TakerMarket::SellBtc => None,
        }
    }

    pub fn is_bsq_swap(&self) -> bool {
        matches!(self, TakerMarket::BuyBsq | TakerMarket::SellBsq)
    }

    /// Buy markets look for a minimum margin, sell markets for a maximum
    pub fn wants_min_margin(&self) -> bool {
        matches!(self, TakerMarket::BuyBtc | TakerMarket::BuyXmr | TakerMarket::BuyBsq)
    }

    pub fn description(&self) -> &'static str {
        match self {
            TakerMarket::BuyBtc => "Buy BTC",
            TakerMarket::SellBtc => "Sell BTC",
            TakerMarket::BuyXmr => "Buy XMR",
            TakerMarket::SellXmr => "Sell XMR",
            TakerMarket::BuyBsq => "Buy BSQ",
            TakerMarket::SellBsq => "Sell BSQ",
        }
    }
}

impl fmt::Display for TakerMarket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl FromStr for TakerMarket {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy-btc" => Ok(TakerMarket::BuyBtc),
            "sell-btc" => Ok(TakerMarket::SellBtc),
            "buy-xmr" => Ok(TakerMarket::BuyXmr),
            "sell-xmr" => Ok(TakerMarket::SellXmr),
            "buy-bsq" => Ok(TakerMarket::BuyBsq),
            "sell-bsq" => Ok(TakerMarket::SellBsq),
            other => Err(format!("unknown market '{}'", other)),
        }
    }
}

pub fn is_bsq(currency_code: &str) -> bool {
    currency_code.eq_ignore_ascii_case("BSQ")
}

pub fn is_xmr(currency_code: &str) -> bool {
    currency_code.eq_ignore_ascii_case("XMR")
}

pub fn is_altcoin(currency_code: &str) -> bool {
    is_bsq(currency_code) || is_xmr(currency_code)
}

/// Decimal places used for prices in the given currency
pub fn price_precision(currency_code: &str) -> u32 {
    if is_altcoin(currency_code) {
        8
    } else {
        4
    }
}

pub fn sats_to_btc(sats: u64) -> Decimal {
    Decimal::from(sats) / Decimal::from(SATOSHIS_PER_BTC)
}

pub fn btc_to_sats(btc: Decimal) -> u64 {
    use rust_decimal::prelude::ToPrimitive;
    (btc * Decimal::from(SATOSHIS_PER_BTC))
        .round()
        .to_u64()
        .unwrap_or(0)
}

/// Parse a daemon price or volume string; empty or malformed strings become zero
pub fn parse_decimal(value: &str) -> Decimal {
    Decimal::from_str(value.trim()).unwrap_or(Decimal::ZERO)
}

pub fn offer_price(offer: &OfferInfo) -> Decimal {
    parse_decimal(&offer.price)
}

pub fn epoch_millis_to_utc(millis: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis as i64)
        .single()
        .unwrap_or_default()
}

/// From the offer's point of view: am I buying BTC in this trade?
pub fn i_am_buyer(trade: &TradeInfo) -> bool {
    match &trade.offer {
        Some(offer) if offer.is_my_offer => offer.direction.eq_ignore_ascii_case("BUY"),
        Some(offer) => offer.direction.eq_ignore_ascii_case("SELL"),
        None => false,
    }
}

/// From the contract's point of view: am I the BTC buyer?
pub fn is_btc_buyer(trade: &TradeInfo) -> bool {
    let is_my_offer = trade.offer.as_ref().map(|o| o.is_my_offer).unwrap_or(false);
    let is_buyer_maker = trade
        .contract
        .as_ref()
        .map(|c| c.is_buyer_maker_and_seller_taker)
        .unwrap_or(false);
    is_my_offer == is_buyer_maker
}

/// Fiat offers have base BTC; altcoin offers have the altcoin as base.
pub fn trade_currency_code(trade: &TradeInfo) -> String {
    match &trade.offer {
        Some(offer) if offer.base_currency_code == "BTC" => offer.counter_currency_code.clone(),
        Some(offer) => offer.base_currency_code.clone(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::ContractInfo;
    use rust_decimal_macros::dec;

    fn trade_with(direction: &str, is_my_offer: bool) -> TradeInfo {
        TradeInfo {
            offer: Some(OfferInfo {
                direction: direction.to_string(),
                is_my_offer,
                base_currency_code: "BTC".to_string(),
                counter_currency_code: "EUR".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_direction_parse() {
        assert_eq!("buy".parse::<Direction>().unwrap(), Direction::Buy);
        assert_eq!(" SELL ".parse::<Direction>().unwrap(), Direction::Sell);
        assert!("hold".parse::<Direction>().is_err());
        assert_eq!(Direction::Buy.opposite(), Direction::Sell);
    }

    #[test]
    fn test_i_am_buyer() {
        assert!(i_am_buyer(&trade_with("BUY", true)));
        assert!(!i_am_buyer(&trade_with("SELL", true)));
        assert!(i_am_buyer(&trade_with("SELL", false)));
        assert!(!i_am_buyer(&trade_with("BUY", false)));
    }

    #[test]
    fn test_is_btc_buyer_uses_contract() {
        let mut trade = trade_with("BUY", true);
        trade.contract = Some(ContractInfo {
            is_buyer_maker_and_seller_taker: true,
            ..Default::default()
        });
        assert!(is_btc_buyer(&trade));

        trade.offer.as_mut().unwrap().is_my_offer = false;
        assert!(!is_btc_buyer(&trade));
    }

    #[test]
    fn test_trade_currency_code() {
        let fiat = trade_with("BUY", true);
        assert_eq!(trade_currency_code(&fiat), "EUR");

        let mut xmr = trade_with("SELL", false);
        let offer = xmr.offer.as_mut().unwrap();
        offer.base_currency_code = "XMR".to_string();
        offer.counter_currency_code = "BTC".to_string();
        assert_eq!(trade_currency_code(&xmr), "XMR");
    }

    #[test]
    fn test_sats_conversion() {
        assert_eq!(sats_to_btc(12_500_000), dec!(0.125));
        assert_eq!(btc_to_sats(dec!(0.125)), 12_500_000);
        assert_eq!(btc_to_sats(dec!(0.00000001)), 1);
    }

    #[test]
    fn test_price_precision() {
        assert_eq!(price_precision("XMR"), 8);
        assert_eq!(price_precision("bsq"), 8);
        assert_eq!(price_precision("EUR"), 4);
    }

    #[test]
    fn test_taker_market() {
        assert_eq!("sell-xmr".parse::<TakerMarket>().unwrap(), TakerMarket::SellXmr);
        assert_eq!(TakerMarket::BuyXmr.offer_direction(), Direction::Sell);
        assert_eq!(TakerMarket::BuyBtc.offer_direction(), Direction::Buy);
        assert_eq!(TakerMarket::SellBsq.fixed_currency(), Some("BSQ"));
        assert!(TakerMarket::BuyBsq.is_bsq_swap());
        assert!(!TakerMarket::SellBtc.wants_min_margin());
    }

    #[test]
    fn test_epoch_millis_to_utc() {
        let dt = epoch_millis_to_utc(1_650_000_000_000);
        assert_eq!(dt.to_rfc3339(), "2022-04-15T05:20:00+00:00");
    }
}
