use std::fmt;

use bitcoin::{Address, PubkeyHash, ScriptBuf, Transaction};

/// The destination a monitor watches, reduced to the output script a paying
/// transaction must carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchedAddress {
    script_pubkey: ScriptBuf,
}

impl WatchedAddress {
    /// P2PKH destination for a 20-byte public-key hash.
    pub fn from_pubkey_hash(hash: PubkeyHash) -> Self {
        Self {
            script_pubkey: ScriptBuf::new_p2pkh(&hash),
        }
    }

    /// Any address type; matched on its `script_pubkey`.
    pub fn from_address(address: &Address) -> Self {
        Self {
            script_pubkey: address.script_pubkey(),
        }
    }

    /// Output script a paying transaction carries.
    pub fn script_pubkey(&self) -> &ScriptBuf {
        &self.script_pubkey
    }

    /// Stable key for storage and logs.
    pub fn key(&self) -> String {
        hex::encode(self.script_pubkey.as_bytes())
    }
}

impl fmt::Display for WatchedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Indices of the outputs in `tx` paying `watched`. Several outputs may pay
/// the same destination.
pub fn paying_outputs(tx: &Transaction, watched: &WatchedAddress) -> Vec<usize> {
    tx.output
        .iter()
        .enumerate()
        .filter(|(_, out)| out.script_pubkey == watched.script_pubkey)
        .map(|(i, _)| i)
        .collect()
}
