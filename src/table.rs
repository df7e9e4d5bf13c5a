//! Console tables for offers, trades, balances and payment accounts

use crate::proto::{BalancesInfo, OfferInfo, PaymentAccount, PaymentMethod, TradeInfo};
use crate::types::{epoch_millis_to_utc, sats_to_btc, trade_currency_code};
use colored::Colorize;
use rust_decimal::Decimal;

pub const BANNER: &str =
    "##############################################################################";

/// BTC amount with 8 decimal places
pub fn sats_to_btc_str(sats: u64) -> String {
    format!("{:.8}", sats_to_btc(sats))
}

fn bsq_sats_to_bsq_str(bsq_sats: u64) -> String {
    // 1 BSQ = 100 satoshis
    format!("{:.2}", Decimal::from(bsq_sats) / Decimal::from(100))
}

pub fn yes_no(value: bool) -> String {
    let text = if value { "YES" } else { "NO" };
    text.to_string()
}

fn join_lines(header: String, rows: Vec<String>) -> String {
    let mut table = header;
    table.push('\n');
    for row in rows {
        table.push_str(&row);
        table.push('\n');
    }
    table
}

fn my_offer_row(c0: &str, c1: &str, c2: &str, c3: &str, c4: &str, c5: &str, c6: &str) -> String {
    format!(
        "\t\t{:<50} {:<11} {:<9} {:>10} {:>16} {:>18} {:<50}",
        c0, c1, c2, c3, c4, c5, c6
    )
}

/// Offers made by this node, one row per offer
pub fn my_offers_table(offers: &[OfferInfo], currency_code: &str) -> String {
    let header = my_offer_row(
        "OFFER_ID",
        "DIRECTION",
        "CURRENCY",
        "PRICE",
        "AMOUNT (BTC)",
        &format!("BUYER COST ({})", currency_code),
        "PAYMENT_ACCOUNT_ID",
    );
    let rows = offers
        .iter()
        .map(|o| {
            my_offer_row(
                &o.id,
                &o.direction,
                &o.counter_currency_code,
                &o.price,
                &sats_to_btc_str(o.amount),
                &o.volume,
                &o.payment_account_id,
            )
        })
        .collect();
    join_lines(header, rows)
}

fn bsq_swap_row(c0: &str, c1: &str, c2: &str, c3: &str, c4: &str, c5: &str) -> String {
    format!("\t\t{:<50} {:<11} {:<10} {:>11} {:>12} {:>16}", c0, c1, c2, c3, c4, c5)
}

pub fn bsq_swap_offers_table(offers: &[OfferInfo]) -> String {
    let header = bsq_swap_row(
        "OFFER_ID",
        "DIRECTION",
        "CURRENCY",
        "PRICE (BTC)",
        "AMOUNT (BTC)",
        "BUYER COST (BSQ)",
    );
    let rows = offers
        .iter()
        .map(|o| {
            bsq_swap_row(
                &o.id,
                &format!("{} (BTC)", o.direction),
                &o.base_currency_code,
                &o.price,
                &sats_to_btc_str(o.amount),
                &o.volume,
            )
        })
        .collect();
    join_lines(header, rows)
}

fn trade_row(c0: &str, c1: &str, c2: &str, c3: &str, c4: &str, c5: &str) -> String {
    format!("\t\t{:<50} {:<26} {:<20} {:>16} {:>13} {:>12}", c0, c1, c2, c3, c4, c5)
}

pub fn trades_table(trades: &[TradeInfo]) -> String {
    let header = trade_row("TRADE_ID", "DATE", "ROLE", "PRICE", "AMOUNT (BTC)", "BUYER COST");
    let rows = trades
        .iter()
        .map(|t| {
            let currency_code = trade_currency_code(t);
            trade_row(
                &t.trade_id,
                &epoch_millis_to_utc(t.date).to_rfc3339(),
                &t.role,
                &format!("{} {}", t.trade_price, currency_code),
                &sats_to_btc_str(t.trade_amount_as_long),
                &format!("{} {}", t.trade_volume, currency_code),
            )
        })
        .collect();
    join_lines(header, rows)
}

/// Left-aligned columns sized to their widest cell, separated by two spaces
fn column_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(width) = widths.get_mut(i) {
                *width = (*width).max(cell.len());
            }
        }
    }

    let render = |cells: Vec<&str>| -> String {
        cells
            .iter()
            .zip(widths.iter())
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut lines = vec![render(headers.to_vec())];
    for row in rows {
        lines.push(render(row.iter().map(|c| c.as_str()).collect()));
    }
    lines.join("\n")
}

pub fn trade_detail_table(trade: &TradeInfo) -> String {
    let currency_code = trade_currency_code(trade);
    let headers = [
        "Trade ID",
        "Role",
        "Price",
        "Amount in BTC",
        "Deposit Published",
        "Deposit Confirmed",
        "Buyer Cost",
        "Payment Sent Message Sent",
        "Payment Received Message Sent",
        "Payout Published",
        "Completed",
    ];
    let row = vec![
        trade.short_id.clone(),
        trade.role.clone(),
        trade.trade_price.clone(),
        sats_to_btc_str(trade.trade_amount_as_long),
        yes_no(trade.is_deposit_published),
        yes_no(trade.is_deposit_confirmed),
        format!("{} {}", trade.trade_volume, currency_code),
        yes_no(trade.is_payment_started_message_sent),
        yes_no(trade.is_payment_received_message_sent),
        yes_no(trade.is_payout_published),
        yes_no(trade.is_completed),
    ];
    column_table(&headers, &[row])
}

/// The trading peer's payment details: where to send, or where to expect, the payment
pub fn peer_payment_details(trade: &TradeInfo) -> String {
    let is_my_offer = trade.offer.as_ref().map(|o| o.is_my_offer).unwrap_or(false);
    let payload = trade.contract.as_ref().and_then(|c| {
        if is_my_offer {
            c.taker_payment_account_payload.as_ref()
        } else {
            c.maker_payment_account_payload.as_ref()
        }
    });
    match payload {
        Some(p) if !p.payment_details.is_empty() => p.payment_details.clone(),
        Some(p) if !p.address.is_empty() => p.address.clone(),
        _ => "Not available".to_string(),
    }
}

pub fn trade_payment_summary(trade: &TradeInfo) -> String {
    let currency_code = trade_currency_code(trade);
    to_table(
        &format!("Trade {} payment summary", trade.short_id),
        &[
            ("Trade ID".to_string(), trade.trade_id.clone()),
            ("Role".to_string(), trade.role.clone()),
            ("Amount (BTC)".to_string(), sats_to_btc_str(trade.trade_amount_as_long)),
            (
                format!("Payment ({})", currency_code),
                format!("{} {}", trade.trade_volume, currency_code),
            ),
            ("Peer's Payment Details".to_string(), peer_payment_details(trade)),
        ],
    )
}

pub fn balances_table(balances: &BalancesInfo) -> String {
    let mut sections = Vec::new();
    if let Some(btc) = &balances.btc {
        sections.push(column_table(
            &["Available Balance", "Reserved Balance", "Total Available Balance", "Locked Balance"],
            &[vec![
                sats_to_btc_str(btc.available_balance),
                sats_to_btc_str(btc.reserved_balance),
                sats_to_btc_str(btc.total_available_balance),
                sats_to_btc_str(btc.locked_balance),
            ]],
        ));
    }
    if let Some(bsq) = &balances.bsq {
        sections.push(column_table(
            &[
                "Available Balance",
                "Unverified Balance",
                "Unconfirmed Change Balance",
                "Locked For Voting Balance",
                "Lockup Bonds Balance",
                "Unlocking Bonds Balance",
            ],
            &[vec![
                bsq_sats_to_bsq_str(bsq.available_balance),
                bsq_sats_to_bsq_str(bsq.unverified_balance),
                bsq_sats_to_bsq_str(bsq.unconfirmed_change_balance),
                bsq_sats_to_bsq_str(bsq.locked_for_voting_balance),
                bsq_sats_to_bsq_str(bsq.lockup_bonds_balance),
                bsq_sats_to_bsq_str(bsq.unlocking_bonds_balance),
            ]],
        ));
    }
    sections.join("\n\n")
}

pub fn payment_accounts_table(accounts: &[PaymentAccount]) -> String {
    let rows: Vec<Vec<String>> = accounts
        .iter()
        .map(|a| {
            vec![
                a.account_name.clone(),
                a.payment_method.as_ref().map(|m| m.id.clone()).unwrap_or_default(),
                a.selected_trade_currency
                    .as_ref()
                    .map(|c| c.code.clone())
                    .unwrap_or_default(),
                a.id.clone(),
            ]
        })
        .collect();
    column_table(&["Name", "Payment Method", "Currency", "ID"], &rows)
}

pub fn payment_methods_table(methods: &[PaymentMethod]) -> String {
    let rows: Vec<Vec<String>> = methods.iter().map(|m| vec![m.id.clone()]).collect();
    column_table(&["Payment Method ID"], &rows)
}

/// Two column label/value table under a title.
///
/// Labels starting with a tab are treated as sub-items and get a narrower pad.
pub fn to_table(title: &str, rows: &[(String, String)]) -> String {
    let label_width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0) + 2;
    let lines: Vec<String> = rows
        .iter()
        .map(|(label, value)| {
            let width = if label.starts_with('\t') {
                label_width
            } else {
                label_width + 3
            };
            format!("\t{:<width$} {}", label, value, width = width)
        })
        .collect();
    format!("{}\n{}", title, lines.join("\n"))
}

/// Lines for a warning banner around `message`
pub fn banner_lines(message: &[String]) -> Vec<String> {
    let mut lines = Vec::with_capacity(message.len() + 2);
    lines.push(BANNER.yellow().to_string());
    lines.extend(message.iter().cloned());
    lines.push(BANNER.yellow().to_string());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{BtcBalanceInfo, ContractInfo, PaymentAccountPayloadInfo};

    #[test]
    fn test_sats_to_btc_str() {
        assert_eq!(sats_to_btc_str(1_000_000), "0.01000000");
        assert_eq!(sats_to_btc_str(0), "0.00000000");
    }

    #[test]
    fn test_to_table_pads_labels() {
        let table = to_table(
            "Bot Configuration",
            &[
                ("Market".to_string(), "Buy BTC".to_string()),
                ("Dry Run".to_string(), yes_no(true)),
                ("\tSub".to_string(), "x".to_string()),
            ],
        );
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "Bot Configuration");
        // longest label is 7 chars: top-level labels pad to 7 + 5
        assert_eq!(lines[1], "\tMarket       Buy BTC");
        assert_eq!(lines[2], "\tDry Run      YES");
        assert_eq!(lines[3], "\t\tSub      x");
    }

    #[test]
    fn test_my_offers_table_columns() {
        let offer = OfferInfo {
            id: "abc".to_string(),
            direction: "BUY".to_string(),
            counter_currency_code: "EUR".to_string(),
            price: "40000.0000".to_string(),
            amount: 1_000_000,
            volume: "400.0000".to_string(),
            payment_account_id: "acct".to_string(),
            ..Default::default()
        };
        let table = my_offers_table(&[offer], "EUR");
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("\t\tOFFER_ID"));
        assert!(lines[0].contains("BUYER COST (EUR)"));
        assert!(lines[1].contains("0.01000000"));
        assert!(lines[1].contains("40000.0000"));
    }

    #[test]
    fn test_trades_table_uses_iso_dates() {
        let trade = TradeInfo {
            trade_id: "t-1".to_string(),
            date: 1_650_000_000_000,
            role: "BTC buyer as maker".to_string(),
            trade_price: "40000.0000".to_string(),
            trade_volume: "400.0000".to_string(),
            trade_amount_as_long: 1_000_000,
            offer: Some(OfferInfo {
                base_currency_code: "BTC".to_string(),
                counter_currency_code: "EUR".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let table = trades_table(&[trade]);
        assert!(table.contains("2022-04-15T05:20:00+00:00"));
        assert!(table.contains("40000.0000 EUR"));
        assert!(table.contains("400.0000 EUR"));
    }

    #[test]
    fn test_peer_payment_details_picks_counterparty() {
        let trade = TradeInfo {
            offer: Some(OfferInfo {
                is_my_offer: true,
                ..Default::default()
            }),
            contract: Some(ContractInfo {
                maker_payment_account_payload: Some(PaymentAccountPayloadInfo {
                    payment_details: "mine".to_string(),
                    ..Default::default()
                }),
                taker_payment_account_payload: Some(PaymentAccountPayloadInfo {
                    payment_details: "IBAN DE00 1234".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(peer_payment_details(&trade), "IBAN DE00 1234");
    }

    #[test]
    fn test_balances_table() {
        let balances = BalancesInfo {
            btc: Some(BtcBalanceInfo {
                available_balance: 150_000_000,
                ..Default::default()
            }),
            bsq: None,
        };
        let table = balances_table(&balances);
        assert!(table.starts_with("Available Balance"));
        assert!(table.contains("1.50000000"));
    }
}
