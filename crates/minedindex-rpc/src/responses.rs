//! Node response shapes and their conversion into core types.

use minedindex_core::{Block, Transaction, TxOutput, COIN};
use serde::Deserialize;

/// `getblock <hash> 1`
#[derive(Debug, Clone, Deserialize)]
pub struct RawBlock {
    pub height: u64,
    #[serde(default)]
    pub tx: Vec<String>,
}

impl From<RawBlock> for Block {
    fn from(raw: RawBlock) -> Self {
        Block {
            height: raw.height,
            transaction_ids: raw.tx,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawScriptPubKey {
    #[serde(default)]
    pub addresses: Option<Vec<String>>,
    #[serde(default)]
    pub address: Option<String>,
}

impl RawScriptPubKey {
    fn first_address(self) -> Option<String> {
        self.addresses
            .and_then(|a| a.into_iter().next())
            .or(self.address)
    }
}

/// One `vout` entry of `getrawtransaction <txid> 1`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawOutput {
    #[serde(default)]
    pub value: f64,
    /// Exact amount in smallest units, when the node reports it.
    #[serde(default, rename = "valueSat", alias = "valueZat")]
    pub value_sat: Option<u64>,
    #[serde(default, rename = "scriptPubKey")]
    pub script_pub_key: RawScriptPubKey,
}

impl RawOutput {
    /// Amount in smallest units; falls back to rounding the coin value.
    pub fn amount(&self) -> u64 {
        self.value_sat
            .unwrap_or_else(|| (self.value * COIN as f64).round().max(0.0) as u64)
    }
}

/// `getrawtransaction <txid> 1`
#[derive(Debug, Clone, Deserialize)]
pub struct RawTransaction {
    #[serde(default)]
    pub vout: Vec<RawOutput>,
}

impl From<RawTransaction> for Transaction {
    fn from(raw: RawTransaction) -> Self {
        Transaction {
            outputs: raw
                .vout
                .into_iter()
                .map(|out| TxOutput {
                    amount: out.amount(),
                    address: out.script_pub_key.first_address(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn block_keeps_transaction_order() {
        let raw: RawBlock = serde_json::from_value(json!({
            "hash": "00000000abc",
            "height": 250_000,
            "tx": ["coinbase", "second"],
        }))
        .unwrap();
        let block = Block::from(raw);
        assert_eq!(block.height, 250_000);
        assert_eq!(block.coinbase_txid(), Some("coinbase"));
    }

    #[test]
    fn coinbase_outputs_prefer_exact_amounts() {
        let raw: RawTransaction = serde_json::from_value(json!({
            "txid": "cb",
            "vout": [
                {"value": 11.25, "valueSat": 1_125_000_000u64, "n": 0,
                 "scriptPubKey": {"type": "pubkeyhash", "addresses": ["t1pool"]}},
                {"value": 0.1, "valueZat": 10_000_000u64, "n": 1,
                 "scriptPubKey": {"type": "pubkeyhash", "addresses": ["t1node"]}},
                {"value": 0.0, "n": 2, "scriptPubKey": {"type": "nulldata"}}
            ]
        }))
        .unwrap();
        let tx = Transaction::from(raw);
        assert_eq!(tx.outputs.len(), 3);
        assert_eq!(tx.outputs[0].amount, 1_125_000_000);
        assert_eq!(tx.outputs[0].address.as_deref(), Some("t1pool"));
        assert_eq!(tx.outputs[1].amount, 10_000_000);
        assert_eq!(tx.outputs[2].address, None);
    }

    #[test]
    fn coin_value_fallback_and_single_address_field() {
        let raw: RawTransaction = serde_json::from_value(json!({
            "vout": [
                {"value": 3.00000001, "scriptPubKey": {"address": "bc1qminer"}}
            ]
        }))
        .unwrap();
        let tx = Transaction::from(raw);
        assert_eq!(tx.outputs[0].amount, 300_000_001);
        assert_eq!(tx.outputs[0].address.as_deref(), Some("bc1qminer"));
    }
}
