//! Single RPC calls from the command line
//!
//! `bisq-bots rpc <call>` builds one request from its arguments, sends it, and
//! prints the reply.

use crate::client::BisqClient;
use crate::proto::edit_offer_request::EditType;
use crate::proto::{CreateOfferRequest, EditOfferRequest, TakeOfferRequest};
use crate::table::{
    balances_table, bsq_swap_offers_table, my_offers_table, payment_accounts_table, payment_methods_table,
    to_table, trade_detail_table, trades_table,
};
use crate::types::{btc_to_sats, is_bsq, Direction, TradeCategory};
use anyhow::{bail, Context, Result};
use clap::{Subcommand, ValueEnum};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Which offer details an editoffer call changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EditTypeArg {
    ActivationStateOnly,
    FixedPriceOnly,
    FixedPriceAndActivationState,
    MktPriceMarginOnly,
    MktPriceMarginAndActivationState,
    TriggerPriceOnly,
    TriggerPriceAndActivationState,
    MktPriceMarginAndTriggerPrice,
    MktPriceMarginAndTriggerPriceAndActivationState,
}

impl From<EditTypeArg> for EditType {
    fn from(arg: EditTypeArg) -> Self {
        match arg {
            EditTypeArg::ActivationStateOnly => EditType::ActivationStateOnly,
            EditTypeArg::FixedPriceOnly => EditType::FixedPriceOnly,
            EditTypeArg::FixedPriceAndActivationState => EditType::FixedPriceAndActivationState,
            EditTypeArg::MktPriceMarginOnly => EditType::MktPriceMarginOnly,
            EditTypeArg::MktPriceMarginAndActivationState => EditType::MktPriceMarginAndActivationState,
            EditTypeArg::TriggerPriceOnly => EditType::TriggerPriceOnly,
            EditTypeArg::TriggerPriceAndActivationState => EditType::TriggerPriceAndActivationState,
            EditTypeArg::MktPriceMarginAndTriggerPrice => EditType::MktPriceMarginAndTriggerPrice,
            EditTypeArg::MktPriceMarginAndTriggerPriceAndActivationState => {
                EditType::MktPriceMarginAndTriggerPriceAndActivationState
            }
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum RpcCall {
    /// Show the daemon version
    GetVersion,
    /// Shut the daemon down
    Stop,

    /// Show one available offer
    GetOffer {
        #[arg(long)]
        offer_id: String,
    },
    /// Show one of my offers
    GetMyOffer {
        #[arg(long)]
        offer_id: String,
    },
    /// List available offers
    GetOffers {
        #[arg(long)]
        direction: Direction,
        #[arg(long)]
        currency_code: String,
    },
    /// List my offers
    GetMyOffers {
        #[arg(long)]
        direction: Direction,
        #[arg(long)]
        currency_code: String,
    },
    /// Show whether an offer is a fiat, altcoin or BSQ swap offer
    GetOfferCategory {
        #[arg(long)]
        offer_id: String,
        #[arg(long)]
        my_offer: bool,
    },
    /// Create a fixed-price or market price margin offer
    CreateOffer {
        #[arg(long)]
        direction: Direction,
        #[arg(long)]
        currency_code: String,
        /// BTC
        #[arg(long)]
        amount: Decimal,
        /// BTC, defaults to the amount
        #[arg(long)]
        min_amount: Option<Decimal>,
        #[arg(long, conflicts_with = "market_price_margin")]
        fixed_price: Option<Decimal>,
        /// Percent
        #[arg(long, allow_hyphen_values = true)]
        market_price_margin: Option<Decimal>,
        /// Percent of the amount
        #[arg(long, default_value = "15.0")]
        security_deposit: Decimal,
        #[arg(long)]
        payment_account_id: String,
        #[arg(long, default_value = "BSQ")]
        fee_currency: String,
        #[arg(long)]
        trigger_price: Option<Decimal>,
    },
    /// Create a BSQ swap offer
    CreateBsqSwapOffer {
        #[arg(long)]
        direction: Direction,
        /// BTC
        #[arg(long)]
        amount: Decimal,
        /// BTC, defaults to the amount
        #[arg(long)]
        min_amount: Option<Decimal>,
        /// BTC per BSQ
        #[arg(long)]
        fixed_price: Decimal,
    },
    /// Change an offer's price, margin, trigger price or activation state
    EditOffer {
        #[arg(long)]
        offer_id: String,
        #[arg(long, value_enum)]
        edit_type: EditTypeArg,
        #[arg(long)]
        fixed_price: Option<Decimal>,
        #[arg(long, allow_hyphen_values = true)]
        market_price_margin: Option<Decimal>,
        #[arg(long)]
        trigger_price: Option<Decimal>,
        /// 1 enables, 0 disables, -1 leaves the activation state alone
        #[arg(long, default_value_t = -1, allow_hyphen_values = true,
              value_parser = clap::value_parser!(i32).range(-1..=1))]
        enable: i32,
    },
    CancelOffer {
        #[arg(long)]
        offer_id: String,
    },

    GetTrade {
        #[arg(long)]
        trade_id: String,
    },
    /// List open, closed or failed trades
    GetTrades {
        #[arg(long, default_value = "open")]
        category: TradeCategory,
    },
    TakeOffer {
        #[arg(long)]
        offer_id: String,
        /// Not used for BSQ swap offers
        #[arg(long, default_value = "")]
        payment_account_id: String,
        #[arg(long, default_value = "BSQ")]
        fee_currency: String,
        /// BTC, defaults to the offer amount
        #[arg(long)]
        amount: Option<Decimal>,
    },
    ConfirmPaymentStarted {
        #[arg(long)]
        trade_id: String,
    },
    ConfirmPaymentReceived {
        #[arg(long)]
        trade_id: String,
    },
    CloseTrade {
        #[arg(long)]
        trade_id: String,
    },
    FailTrade {
        #[arg(long)]
        trade_id: String,
    },
    UnfailTrade {
        #[arg(long)]
        trade_id: String,
    },
    /// Send a closed trade's payout to an external address
    WithdrawFunds {
        #[arg(long)]
        trade_id: String,
        #[arg(long)]
        address: String,
        #[arg(long, default_value = "")]
        memo: String,
    },

    /// Show BTC and BSQ balances
    GetBalances {
        /// BTC or BSQ, both when omitted
        #[arg(long, default_value = "")]
        currency_code: String,
    },
    GetNetwork,
    GetTxFeeRate,
    SetTxFeeRate {
        /// sats/vbyte
        #[arg(long)]
        tx_fee_rate: u64,
    },
    UnsetTxFeeRate,
    GetAddressBalance {
        #[arg(long)]
        address: String,
    },
    GetFundingAddresses,
    GetUnusedBsqAddress,
    SendBsq {
        #[arg(long)]
        address: String,
        #[arg(long)]
        amount: String,
        #[arg(long, default_value = "")]
        tx_fee_rate: String,
    },
    SendBtc {
        #[arg(long)]
        address: String,
        #[arg(long)]
        amount: String,
        #[arg(long, default_value = "")]
        tx_fee_rate: String,
        #[arg(long, default_value = "")]
        memo: String,
    },
    VerifyBsqSentToAddress {
        #[arg(long)]
        address: String,
        #[arg(long)]
        amount: String,
    },
    GetTransaction {
        #[arg(long)]
        tx_id: String,
    },
    LockWallet,
    UnlockWallet {
        #[arg(long)]
        wallet_password: String,
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
    SetWalletPassword {
        #[arg(long)]
        wallet_password: String,
        #[arg(long, default_value = "")]
        new_wallet_password: String,
    },
    RemoveWalletPassword {
        #[arg(long)]
        wallet_password: String,
    },

    GetMarketPrice {
        #[arg(long)]
        currency_code: String,
    },
    GetAvgBsqPrice {
        #[arg(long, default_value_t = 30)]
        days: i32,
    },

    GetPaymentMethods,
    /// Print an empty JSON form for a new payment account
    GetPaymentAcctForm {
        #[arg(long)]
        payment_method_id: String,
    },
    /// Create a payment account from a filled in JSON form
    CreatePaymentAcct {
        #[arg(long)]
        payment_account_form: PathBuf,
    },
    GetPaymentAccts,
    CreateCryptoCurrencyPaymentAcct {
        #[arg(long)]
        account_name: String,
        #[arg(long)]
        currency_code: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        trade_instant: bool,
    },
    GetCryptoCurrencyPaymentMethods,
}

#[allow(clippy::too_many_arguments)]
pub fn create_offer_request(
    direction: Direction,
    currency_code: &str,
    amount: Decimal,
    min_amount: Option<Decimal>,
    fixed_price: Option<Decimal>,
    market_price_margin: Option<Decimal>,
    security_deposit: Decimal,
    payment_account_id: &str,
    fee_currency: &str,
    trigger_price: Option<Decimal>,
) -> Result<CreateOfferRequest> {
    if fixed_price.is_none() && market_price_margin.is_none() {
        bail!("either --fixed-price or --market-price-margin is required");
    }
    Ok(CreateOfferRequest {
        currency_code: currency_code.to_uppercase(),
        direction: direction.to_string(),
        price: fixed_price.map(|p| p.to_string()).unwrap_or_else(|| "0".to_string()),
        use_market_based_price: market_price_margin.is_some(),
        market_price_margin_pct: market_price_margin.and_then(|m| m.to_f64()).unwrap_or(0.0),
        amount: btc_to_sats(amount),
        min_amount: btc_to_sats(min_amount.unwrap_or(amount)),
        buyer_security_deposit_pct: security_deposit.to_f64().unwrap_or(15.0),
        trigger_price: trigger_price.map(|p| p.to_string()).unwrap_or_else(|| "0".to_string()),
        payment_account_id: payment_account_id.to_string(),
        maker_fee_currency_code: fee_currency.to_uppercase(),
    })
}

/// Build an editoffer request, checking the values the edit type needs are present.
pub fn edit_offer_request(
    offer_id: &str,
    edit_type: EditTypeArg,
    fixed_price: Option<Decimal>,
    market_price_margin: Option<Decimal>,
    trigger_price: Option<Decimal>,
    enable: i32,
) -> Result<EditOfferRequest> {
    let edit_type = EditType::from(edit_type);
    let needs_price = matches!(
        edit_type,
        EditType::FixedPriceOnly | EditType::FixedPriceAndActivationState
    );
    let needs_margin = matches!(
        edit_type,
        EditType::MktPriceMarginOnly
            | EditType::MktPriceMarginAndActivationState
            | EditType::MktPriceMarginAndTriggerPrice
            | EditType::MktPriceMarginAndTriggerPriceAndActivationState
    );
    let needs_trigger = matches!(
        edit_type,
        EditType::TriggerPriceOnly
            | EditType::TriggerPriceAndActivationState
            | EditType::MktPriceMarginAndTriggerPrice
            | EditType::MktPriceMarginAndTriggerPriceAndActivationState
    );
    let needs_state = matches!(
        edit_type,
        EditType::ActivationStateOnly
            | EditType::FixedPriceAndActivationState
            | EditType::MktPriceMarginAndActivationState
            | EditType::TriggerPriceAndActivationState
            | EditType::MktPriceMarginAndTriggerPriceAndActivationState
    );

    if needs_price && fixed_price.is_none() {
        bail!("--fixed-price is required for edit type {:?}", edit_type);
    }
    if needs_margin && market_price_margin.is_none() {
        bail!("--market-price-margin is required for edit type {:?}", edit_type);
    }
    if needs_trigger && trigger_price.is_none() {
        bail!("--trigger-price is required for edit type {:?}", edit_type);
    }
    if needs_state && enable == -1 {
        bail!("--enable must be 0 or 1 for edit type {:?}", edit_type);
    }

    Ok(EditOfferRequest {
        id: offer_id.to_string(),
        price: fixed_price.map(|p| p.to_string()).unwrap_or_else(|| "0".to_string()),
        use_market_based_price: needs_margin,
        market_price_margin_pct: market_price_margin.and_then(|m| m.to_f64()).unwrap_or(0.0),
        trigger_price: trigger_price.map(|p| p.to_string()).unwrap_or_else(|| "0".to_string()),
        enable,
        edit_type: edit_type as i32,
    })
}

/// Perform the call and print its reply.
pub async fn run(client: &BisqClient, call: RpcCall) -> Result<()> {
    match call {
        RpcCall::GetVersion => println!("{}", client.get_version().await?),
        RpcCall::Stop => {
            client.stop().await?;
            println!("Daemon is shutting down.");
        }

        RpcCall::GetOffer { offer_id } => {
            let offer = client.get_offer(&offer_id).await?;
            print_offers(std::slice::from_ref(&offer));
        }
        RpcCall::GetMyOffer { offer_id } => {
            let offer = client.get_my_offer(&offer_id).await?;
            print_offers(std::slice::from_ref(&offer));
        }
        RpcCall::GetOffers {
            direction,
            currency_code,
        } => {
            let offers = if is_bsq(&currency_code) {
                client.get_bsq_swap_offers(direction).await?
            } else {
                client.get_offers(direction, &currency_code).await?
            };
            if offers.is_empty() {
                println!("No available {} {} offers found.", direction, currency_code.to_uppercase());
            } else {
                print_offers(&offers);
            }
        }
        RpcCall::GetMyOffers {
            direction,
            currency_code,
        } => {
            let offers = if is_bsq(&currency_code) {
                client.get_my_bsq_swap_offers(direction).await?
            } else {
                client.get_my_offers(direction, &currency_code).await?
            };
            if offers.is_empty() {
                println!("No {} {} offers of mine found.", direction, currency_code.to_uppercase());
            } else {
                print_offers(&offers);
            }
        }
        RpcCall::GetOfferCategory { offer_id, my_offer } => {
            let category = client.get_offer_category(&offer_id, my_offer).await?;
            println!("{:?}", category);
        }
        RpcCall::CreateOffer {
            direction,
            currency_code,
            amount,
            min_amount,
            fixed_price,
            market_price_margin,
            security_deposit,
            payment_account_id,
            fee_currency,
            trigger_price,
        } => {
            let request = create_offer_request(
                direction,
                &currency_code,
                amount,
                min_amount,
                fixed_price,
                market_price_margin,
                security_deposit,
                &payment_account_id,
                &fee_currency,
                trigger_price,
            )?;
            let offer = client.create_offer(request).await?;
            print_offers(std::slice::from_ref(&offer));
        }
        RpcCall::CreateBsqSwapOffer {
            direction,
            amount,
            min_amount,
            fixed_price,
        } => {
            let offer = client
                .create_bsq_swap_offer(
                    direction,
                    btc_to_sats(amount),
                    btc_to_sats(min_amount.unwrap_or(amount)),
                    &fixed_price.to_string(),
                )
                .await?;
            println!("{}", bsq_swap_offers_table(std::slice::from_ref(&offer)));
        }
        RpcCall::EditOffer {
            offer_id,
            edit_type,
            fixed_price,
            market_price_margin,
            trigger_price,
            enable,
        } => {
            let request =
                edit_offer_request(&offer_id, edit_type, fixed_price, market_price_margin, trigger_price, enable)?;
            client.edit_offer(request).await?;
            println!("Offer {} has been edited.", offer_id);
        }
        RpcCall::CancelOffer { offer_id } => {
            client.cancel_offer(&offer_id).await?;
            println!("Offer {} has been canceled.", offer_id);
        }

        RpcCall::GetTrade { trade_id } => {
            let trade = client.get_trade(&trade_id).await?;
            println!("{}", trade_detail_table(&trade));
        }
        RpcCall::GetTrades { category } => {
            let trades = client.get_trades(category.into()).await?;
            if trades.is_empty() {
                println!("No {} trades found.", category);
            } else {
                println!("{}", trades_table(&trades));
            }
        }
        RpcCall::TakeOffer {
            offer_id,
            payment_account_id,
            fee_currency,
            amount,
        } => {
            let reply = client
                .take_offer(TakeOfferRequest {
                    offer_id,
                    payment_account_id,
                    taker_fee_currency_code: fee_currency.to_uppercase(),
                    amount: amount.map(btc_to_sats).unwrap_or(0),
                })
                .await?;
            if let Some(reason) = reply.failure_reason {
                bail!("{}: {}", reason.availability_result, reason.description);
            }
            match reply.trade {
                Some(trade) => println!("{}", trade_detail_table(&trade)),
                None => println!("Trade is being prepared."),
            }
        }
        RpcCall::ConfirmPaymentStarted { trade_id } => {
            client.confirm_payment_started(&trade_id).await?;
            println!("Payment started message has been sent for trade {}.", trade_id);
        }
        RpcCall::ConfirmPaymentReceived { trade_id } => {
            client.confirm_payment_received(&trade_id).await?;
            println!("Payment received message has been sent for trade {}.", trade_id);
        }
        RpcCall::CloseTrade { trade_id } => {
            client.close_trade(&trade_id).await?;
            println!("Trade {} has been closed.", trade_id);
        }
        RpcCall::FailTrade { trade_id } => {
            client.fail_trade(&trade_id).await?;
            println!("Trade {} has been moved to failed trades.", trade_id);
        }
        RpcCall::UnfailTrade { trade_id } => {
            client.unfail_trade(&trade_id).await?;
            println!("Trade {} has been moved back to open trades.", trade_id);
        }
        RpcCall::WithdrawFunds {
            trade_id,
            address,
            memo,
        } => {
            client.withdraw_funds(&trade_id, &address, &memo).await?;
            println!("Funds from trade {} have been sent to {}.", trade_id, address);
        }

        RpcCall::GetBalances { currency_code } => {
            let balances = client.get_balances(&currency_code).await?;
            println!("{}", balances_table(&balances));
        }
        RpcCall::GetNetwork => println!("{}", client.get_network().await?),
        RpcCall::GetTxFeeRate => println!("{:#?}", client.get_tx_fee_rate().await?),
        RpcCall::SetTxFeeRate { tx_fee_rate } => {
            println!("{:#?}", client.set_tx_fee_rate_preference(tx_fee_rate).await?)
        }
        RpcCall::UnsetTxFeeRate => println!("{:#?}", client.unset_tx_fee_rate_preference().await?),
        RpcCall::GetAddressBalance { address } => {
            let info = client.get_address_balance(&address).await?;
            println!(
                "{}",
                to_table(
                    "Address Balance",
                    &[
                        ("Address:".to_string(), info.address),
                        ("Balance (sats):".to_string(), info.balance.to_string()),
                        ("Confirmations:".to_string(), info.num_confirmations.to_string()),
                        ("Is Unused:".to_string(), crate::table::yes_no(info.is_address_unused)),
                    ],
                )
            );
        }
        RpcCall::GetFundingAddresses => {
            let rows: Vec<(String, String)> = client
                .get_funding_addresses()
                .await?
                .into_iter()
                .map(|info| (info.address, format!("{} sats, {} confirmations", info.balance, info.num_confirmations)))
                .collect();
            println!("{}", to_table("Funding Addresses", &rows));
        }
        RpcCall::GetUnusedBsqAddress => println!("{}", client.get_unused_bsq_address().await?),
        RpcCall::SendBsq {
            address,
            amount,
            tx_fee_rate,
        } => {
            let tx = client.send_bsq(&address, &amount, &tx_fee_rate).await?;
            println!("{} BSQ sent to {} in tx {}", amount, address, tx.tx_id);
        }
        RpcCall::SendBtc {
            address,
            amount,
            tx_fee_rate,
            memo,
        } => {
            let tx = client.send_btc(&address, &amount, &tx_fee_rate, &memo).await?;
            println!("{} BTC sent to {} in tx {}", amount, address, tx.tx_id);
        }
        RpcCall::VerifyBsqSentToAddress { address, amount } => {
            let received = client.verify_bsq_sent_to_address(&address, &amount).await?;
            println!(
                "{} BSQ {} been sent to {}",
                amount,
                if received { "has" } else { "has not" },
                address
            );
        }
        RpcCall::GetTransaction { tx_id } => println!("{:#?}", client.get_transaction(&tx_id).await?),
        RpcCall::LockWallet => {
            client.lock_wallet().await?;
            println!("Wallet is locked.");
        }
        RpcCall::UnlockWallet {
            wallet_password,
            timeout,
        } => {
            client.unlock_wallet(&wallet_password, timeout).await?;
            println!("Wallet is unlocked for {} seconds.", timeout);
        }
        RpcCall::SetWalletPassword {
            wallet_password,
            new_wallet_password,
        } => {
            client.set_wallet_password(&wallet_password, &new_wallet_password).await?;
            println!("Wallet encrypted.");
        }
        RpcCall::RemoveWalletPassword { wallet_password } => {
            client.remove_wallet_password(&wallet_password).await?;
            println!("Wallet decrypted.");
        }

        RpcCall::GetMarketPrice { currency_code } => {
            println!("{}", client.get_market_price(&currency_code).await?)
        }
        RpcCall::GetAvgBsqPrice { days } => {
            let price = client.get_average_bsq_trade_price(days).await?;
            println!(
                "{}",
                to_table(
                    &format!("{}-day Average BSQ Trade Price", days),
                    &[
                        ("USD:".to_string(), price.usd_price),
                        ("BTC:".to_string(), price.btc_price),
                    ],
                )
            );
        }

        RpcCall::GetPaymentMethods => {
            println!("{}", payment_methods_table(&client.get_payment_methods().await?))
        }
        RpcCall::GetPaymentAcctForm { payment_method_id } => {
            let form = client.get_payment_account_form(&payment_method_id).await?;
            let json: serde_json::Value = serde_json::from_str(&form).context("daemon returned an invalid form")?;
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
        RpcCall::CreatePaymentAcct { payment_account_form } => {
            let form = std::fs::read_to_string(&payment_account_form)
                .with_context(|| format!("cannot read {}", payment_account_form.display()))?;
            // reject malformed forms before the daemon sees them
            serde_json::from_str::<serde_json::Value>(&form)
                .with_context(|| format!("{} is not valid JSON", payment_account_form.display()))?;
            let account = client.create_payment_account(&form).await?;
            println!("{}", payment_accounts_table(std::slice::from_ref(&account)));
        }
        RpcCall::GetPaymentAccts => {
            println!("{}", payment_accounts_table(&client.get_payment_accounts().await?))
        }
        RpcCall::CreateCryptoCurrencyPaymentAcct {
            account_name,
            currency_code,
            address,
            trade_instant,
        } => {
            let account = client
                .create_crypto_currency_payment_account(&account_name, &currency_code, &address, trade_instant)
                .await?;
            println!("{}", payment_accounts_table(std::slice::from_ref(&account)));
        }
        RpcCall::GetCryptoCurrencyPaymentMethods => {
            println!("{}", payment_methods_table(&client.get_crypto_currency_payment_methods().await?))
        }
    }
    Ok(())
}

fn print_offers(offers: &[crate::proto::OfferInfo]) {
    let (swaps, others): (Vec<_>, Vec<_>) = offers.iter().cloned().partition(|o| o.is_bsq_swap_offer);
    if !swaps.is_empty() {
        println!("{}", bsq_swap_offers_table(&swaps));
    }
    if let Some(first) = others.first() {
        let currency = if first.base_currency_code == "BTC" {
            first.counter_currency_code.clone()
        } else {
            first.base_currency_code.clone()
        };
        println!("{}", my_offers_table(&others, &currency));
    }
}
