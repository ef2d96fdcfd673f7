//! Converts the provider's raw transaction envelope into our domain
//! `RawTransaction` (§3). Swap-event decoding is DEX-specific and out of
//! reach of a generic client; we always populate `token_transfers` /
//! `native_transfers` from the pre/post balance diffs the provider returns
//! alongside every transaction, which is what the Swap Extractor's fallback
//! path (§4.4) is specified against. `swap_event` stays `None` here —
//! providers that emit a structured swap event would set it from their
//! own payload shape, but our generic JSON-RPC upstream does not.

use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, EncodedTransaction, EncodedTransactionWithStatusMeta,
    UiMessage, UiTransactionStatusMeta,
};

use crate::domain::{NativeTransfer, RawTransaction, TokenTransfer};

pub fn parse_transaction(
    signature: String,
    tx: EncodedConfirmedTransactionWithStatusMeta,
) -> Option<RawTransaction> {
    let EncodedConfirmedTransactionWithStatusMeta {
        slot,
        transaction: EncodedTransactionWithStatusMeta { meta, transaction, .. },
        block_time,
        ..
    } = tx;

    let meta = meta?;
    if meta.err.is_some() {
        return None;
    }

    let account_keys = extract_account_keys(&transaction);
    let token_transfers = extract_token_transfers(&meta);
    let native_transfers = extract_native_transfers(&meta, &account_keys);
    let source = detect_source(&meta);
    let fee_lamports = meta.fee;

    Some(RawTransaction {
        signature,
        slot,
        block_time: block_time.unwrap_or(0),
        swap_event: None,
        token_transfers,
        native_transfers,
        source,
        fee_lamports,
    })
}

fn extract_token_transfers(meta: &UiTransactionStatusMeta) -> Vec<TokenTransfer> {
    use solana_transaction_status::option_serializer::OptionSerializer;

    let pre: Vec<_> = match &meta.pre_token_balances {
        OptionSerializer::Some(v) => v.clone(),
        _ => Vec::new(),
    };
    let post: Vec<_> = match &meta.post_token_balances {
        OptionSerializer::Some(v) => v.clone(),
        _ => Vec::new(),
    };

    let mut transfers = Vec::new();
    for post_balance in &post {
        let owner = match &post_balance.owner {
            OptionSerializer::Some(o) => o.clone(),
            _ => continue,
        };
        let mint = post_balance.mint.clone();
        let decimals = post_balance.ui_token_amount.decimals;
        let post_amount: i128 = post_balance
            .ui_token_amount
            .amount
            .parse()
            .unwrap_or_default();

        let pre_amount: i128 = pre
            .iter()
            .find(|p| p.account_index == post_balance.account_index)
            .and_then(|p| p.ui_token_amount.amount.parse::<i128>().ok())
            .unwrap_or(0);

        let delta = post_amount - pre_amount;
        if delta == 0 {
            continue;
        }

        // A positive delta is a receive (to=owner); a negative delta is a
        // send (from=owner). The counterparty is unknown at this level of
        // detail and is reconciled by the extractor via mint + wallet
        // matching rather than a fully resolved account graph.
        if delta > 0 {
            transfers.push(TokenTransfer {
                mint,
                from: String::new(),
                to: owner,
                amount_raw: delta as u64,
                decimals,
            });
        } else {
            transfers.push(TokenTransfer {
                mint,
                from: owner,
                to: String::new(),
                amount_raw: (-delta) as u64,
                decimals,
            });
        }
    }
    transfers
}

fn extract_account_keys(transaction: &EncodedTransaction) -> Vec<String> {
    match transaction {
        EncodedTransaction::Json(ui_tx) => match &ui_tx.message {
            UiMessage::Parsed(m) => m.account_keys.iter().map(|k| k.pubkey.clone()).collect(),
            UiMessage::Raw(m) => m.account_keys.clone(),
        },
        _ => Vec::new(),
    }
}

fn extract_native_transfers(
    meta: &UiTransactionStatusMeta,
    account_keys: &[String],
) -> Vec<NativeTransfer> {
    let mut transfers = Vec::new();
    for (idx, post) in meta.post_balances.iter().enumerate() {
        let pre = meta.pre_balances.get(idx).copied().unwrap_or(0);
        if *post == pre {
            continue;
        }
        let account = account_keys
            .get(idx)
            .cloned()
            .unwrap_or_else(|| format!("account_index:{idx}"));
        let lamports = post.abs_diff(pre);
        if *post > pre {
            transfers.push(NativeTransfer {
                from: String::new(),
                to: account,
                lamports,
            });
        } else {
            transfers.push(NativeTransfer {
                from: account,
                to: String::new(),
                lamports,
            });
        }
    }
    transfers
}

fn detect_source(meta: &UiTransactionStatusMeta) -> Option<String> {
    use solana_transaction_status::option_serializer::OptionSerializer;
    match &meta.log_messages {
        OptionSerializer::Some(logs) => {
            for log in logs {
                if log.contains("Jupiter") {
                    return Some("jupiter".to_string());
                }
                if log.contains("Raydium") {
                    return Some("raydium".to_string());
                }
                if log.contains("Whirlpool") {
                    return Some("orca".to_string());
                }
            }
            None
        }
        _ => None,
    }
}
