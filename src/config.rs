//! Configuration management
//!
//! Connection settings come from the environment (`.env` supported) and may be
//! overridden on the command line. Each bot reads its own INI file.

use crate::types::{Direction, TakerMarket};
use anyhow::{bail, Context, Result};
use config::{Config, File, FileFormat};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::env;
use std::path::Path;

/// How to reach the API daemon
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    /// Sent as `password` metadata with every call
    pub api_password: String,
    /// Only needed by bots that unlock an encrypted wallet
    pub wallet_password: Option<String>,
    pub connect_timeout_secs: u64,
    pub call_timeout_secs: u64,
}

impl ConnectionConfig {
    /// Load from environment variables, letting any `Some` argument win.
    pub fn load(
        host: Option<String>,
        port: Option<u16>,
        api_password: Option<String>,
        wallet_password: Option<String>,
    ) -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let host = host
            .or_else(|| env::var("BISQ_HOST").ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| "localhost".to_string());

        let port = match port {
            Some(port) => port,
            None => match env::var("BISQ_PORT") {
                Ok(v) => v
                    .parse()
                    .with_context(|| format!("BISQ_PORT '{}' is not a valid port", v))?,
                Err(_) => 9998,
            },
        };

        let api_password = api_password
            .or_else(|| env::var("BISQ_API_PASSWORD").ok())
            .filter(|s| !s.is_empty());

        let wallet_password = wallet_password
            .or_else(|| env::var("BISQ_WALLET_PASSWORD").ok())
            .filter(|s| !s.is_empty());

        let connect_timeout_secs = env::var("BISQ_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        // takeoffer can block while the daemon prepares the trade
        let call_timeout_secs = env::var("BISQ_CALL_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(90);

        let Some(api_password) = api_password else {
            bail!("API password required: pass --password or set BISQ_API_PASSWORD");
        };

        Ok(Self {
            host,
            port,
            api_password,
            wallet_password,
            connect_timeout_secs,
            call_timeout_secs,
        })
    }

    pub fn endpoint_uri(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn require_wallet_password(&self) -> Result<&str> {
        match self.wallet_password.as_deref() {
            Some(password) => Ok(password),
            None => bail!("wallet password required: pass --wallet-password or set BISQ_WALLET_PASSWORD"),
        }
    }
}

fn read_ini(path: &Path) -> Result<Config> {
    Config::builder()
        .add_source(File::from(path).format(FileFormat::Ini))
        .build()
        .with_context(|| format!("cannot read bot configuration {}", path.display()))
}

fn read_ini_str(contents: &str) -> Result<Config> {
    Ok(Config::builder()
        .add_source(File::from_str(contents, FileFormat::Ini))
        .build()?)
}

fn section<T: DeserializeOwned>(config: &Config, name: &str) -> Result<T> {
    config
        .get::<T>(name)
        .with_context(|| format!("invalid or missing [{}] section", name))
}

/// Margins are percent literals with at most two decimal places
fn as_margin_literal(margin: Decimal) -> Result<Decimal> {
    let mut margin = margin.normalize();
    if margin.scale() > 2 {
        bail!(
            "market_price_margin {} has more than two decimal places",
            margin
        );
    }
    margin.rescale(2);
    Ok(margin)
}

fn default_sepa_iterations() -> u32 {
    1000
}

fn default_iterations() -> u32 {
    100
}

fn default_eur() -> String {
    "EUR".to_string()
}

fn default_sepa() -> String {
    "SEPA".to_string()
}

fn default_fee_currency() -> String {
    "BSQ".to_string()
}

fn default_max_take_offers() -> u32 {
    1
}

/// SEPA market maker bot, `[general]` section
#[derive(Debug, Clone, Deserialize)]
pub struct SepaMmConfig {
    pub offers_poll_interval_in_sec: u64,
    /// Market price margin (%) both offers are centred on
    pub reference_price_margin: Decimal,
    /// Distance (%) between the buy and sell offer margins
    pub target_spread: Decimal,
    pub amount_in_satoshis: u64,
    pub sepa_payment_account_id: String,
    #[serde(default = "default_sepa_iterations")]
    pub max_polling_iterations: u32,
    #[serde(default = "default_eur")]
    pub currency_code: String,
    #[serde(default = "default_sepa")]
    pub payment_method_id: String,
}

impl SepaMmConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        section::<Self>(&read_ini(path)?, "general")?.validated()
    }

    pub fn from_ini_str(contents: &str) -> Result<Self> {
        section::<Self>(&read_ini_str(contents)?, "general")?.validated()
    }

    fn validated(mut self) -> Result<Self> {
        if self.sepa_payment_account_id.trim().is_empty() {
            bail!("sepa_payment_account_id is not specified");
        }
        if self.amount_in_satoshis == 0 {
            bail!("amount_in_satoshis must be greater than zero");
        }
        self.currency_code = self.currency_code.to_uppercase();
        Ok(self)
    }
}

/// BSQ swap market maker bot, `[general]` section
#[derive(Debug, Clone, Deserialize)]
pub struct BsqSwapMmConfig {
    pub offers_poll_interval_in_sec: u64,
    /// BTC price of 1 BSQ
    pub reference_price: Decimal,
    /// Spread (%) between the buy and sell offer prices
    pub spread: Decimal,
    /// Offer amount in satoshis
    pub amount: u64,
    #[serde(default = "default_iterations")]
    pub max_iterations: u32,
}

impl BsqSwapMmConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        section::<Self>(&read_ini(path)?, "general")?.validated()
    }

    pub fn from_ini_str(contents: &str) -> Result<Self> {
        section::<Self>(&read_ini_str(contents)?, "general")?.validated()
    }

    fn validated(self) -> Result<Self> {
        if self.reference_price <= Decimal::ZERO {
            bail!("reference_price must be greater than zero");
        }
        if self.amount == 0 {
            bail!("amount must be greater than zero");
        }
        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
struct PriceSyncGeneral {
    check_price_interval_in_sec: u64,
    #[serde(default = "default_iterations")]
    max_iterations: u32,
}

#[derive(Debug, Deserialize)]
struct PriceSyncOffers {
    #[serde(default)]
    offer_ids: String,
}

#[derive(Debug, Deserialize)]
struct PriceSyncOfferType {
    direction: Direction,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct PriceSyncSafeguards {
    min_accepted_offer_amount_for_price_adaption: Decimal,
    min_accepted_price: Decimal,
    max_accepted_price: Decimal,
}

/// Best priced offer (price sync) bot
#[derive(Debug, Clone)]
pub struct PriceSyncConfig {
    pub check_price_interval_in_sec: u64,
    pub max_iterations: u32,
    pub offer_ids: Vec<String>,
    pub direction: Direction,
    pub currency: String,
    pub min_accepted_offer_amount_for_price_adaption: Decimal,
    pub min_accepted_price: Decimal,
    pub max_accepted_price: Decimal,
}

impl PriceSyncConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        Self::from_config(&read_ini(path)?)
    }

    pub fn from_ini_str(contents: &str) -> Result<Self> {
        Self::from_config(&read_ini_str(contents)?)
    }

    fn from_config(config: &Config) -> Result<Self> {
        let general: PriceSyncGeneral = section(config, "general")?;
        let offers: PriceSyncOffers = config.get("offers").unwrap_or(PriceSyncOffers {
            offer_ids: String::new(),
        });
        let offer_type: PriceSyncOfferType = section(config, "offer_type")?;
        let safeguards: PriceSyncSafeguards = section(config, "safeguards")?;

        let offer_ids: Vec<String> = offers
            .offer_ids
            .split(',')
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        if offer_ids.is_empty() {
            bail!("offer_ids value is not specified");
        }
        if safeguards.min_accepted_price > safeguards.max_accepted_price {
            bail!(
                "min_accepted_price {} is greater than max_accepted_price {}",
                safeguards.min_accepted_price,
                safeguards.max_accepted_price
            );
        }

        Ok(Self {
            check_price_interval_in_sec: general.check_price_interval_in_sec,
            max_iterations: general.max_iterations,
            offer_ids,
            direction: offer_type.direction,
            currency: offer_type.currency.trim().to_uppercase(),
            min_accepted_offer_amount_for_price_adaption: safeguards
                .min_accepted_offer_amount_for_price_adaption,
            min_accepted_price: safeguards.min_accepted_price,
            max_accepted_price: safeguards.max_accepted_price,
        })
    }
}

/// Take best priced offer bots, `[general]` section
#[derive(Debug, Clone, Deserialize)]
pub struct TakerConfig {
    pub market: TakerMarket,
    /// Not used by BSQ swap markets, which use the default BSQ swap account
    #[serde(default)]
    pub payment_account_id: String,
    /// Minimum margin (%) for buy markets, maximum margin (%) for sell markets
    pub market_price_margin: Decimal,
    /// BTC
    pub min_amount: Decimal,
    /// BTC
    pub max_amount: Decimal,
    /// sats/vbyte
    pub max_tx_fee_rate: u64,
    #[serde(default = "default_fee_currency")]
    pub bisq_trade_fee_currency: String,
    #[serde(default = "default_max_take_offers")]
    pub max_take_offers: u32,
    pub polling_interval_ms: u64,
    /// Comma separated host:port list
    #[serde(default)]
    pub preferred_trading_peers: String,
    /// 30-day average BSQ price to use when not connected to mainnet
    #[serde(default)]
    pub avg_bsq_price_override: Option<Decimal>,
}

impl TakerConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        section::<Self>(&read_ini(path)?, "general")?.validated()
    }

    pub fn from_ini_str(contents: &str) -> Result<Self> {
        section::<Self>(&read_ini_str(contents)?, "general")?.validated()
    }

    fn validated(mut self) -> Result<Self> {
        self.market_price_margin = as_margin_literal(self.market_price_margin)?;
        self.bisq_trade_fee_currency = self.bisq_trade_fee_currency.trim().to_uppercase();
        if self.polling_interval_ms < 1_000 {
            bail!("Cannot poll offer-book faster than 1x per second.");
        }
        if self.bisq_trade_fee_currency != "BSQ" && self.bisq_trade_fee_currency != "BTC" {
            bail!(
                "Bisq trade fees must be paid in BSQ or BTC, not {}.",
                self.bisq_trade_fee_currency
            );
        }
        if self.min_amount > self.max_amount {
            bail!("min_amount {} is greater than max_amount {}", self.min_amount, self.max_amount);
        }
        if !self.market.is_bsq_swap() && self.payment_account_id.trim().is_empty() {
            bail!("payment_account_id is required for the {} market", self.market);
        }
        Ok(self)
    }
}
