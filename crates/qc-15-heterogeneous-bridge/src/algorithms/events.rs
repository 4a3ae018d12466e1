//! # Event Decoding
//!
//! Maps a receipt log to a [`BridgeEvent`] by its signature topic.
//!
//! Logs with an unknown or missing signature topic decode to
//! [`BridgeEvent::Unrecognized`]. A known signature with missing or
//! inconsistent fields is `MalformedData`.

use super::calldata::{token_address, token_string, token_uint};
use crate::domain::{
    u256_from_word, Address, BridgeError, ContractSignatures, LogEntry, TxKind, U256,
};
use ethabi::ParamType;

const WORD: usize = 32;

/// A decoded bridge-relevant log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeEvent {
    /// ERC20 `Transfer(address indexed, address indexed, uint256)`.
    Erc20Transfer {
        /// Emitting token contract.
        contract: Address,
        /// Sender.
        from: Address,
        /// Recipient; zero for a burn.
        to: Address,
        /// Amount.
        amount: U256,
    },
    /// Legacy `DepositFunds(address,uint256)`.
    DepositFunds {
        /// Depositor.
        from: Address,
        /// Amount.
        amount: U256,
    },
    /// `CrossOutFunds(address,string,uint256,address)`.
    CrossOutFunds {
        /// Depositor.
        from: Address,
        /// Platform destination.
        to: String,
        /// Amount.
        amount: U256,
        /// Token, zero for the native coin.
        token: Address,
    },
    /// `TransferFunds(address,uint256)`: native payout.
    TransferFunds {
        /// Recipient.
        to: Address,
        /// Amount.
        amount: U256,
    },
    /// One of the three completion events.
    Completed {
        /// Which authorization completed.
        kind: TxKind,
        /// Platform transaction hash (last event field).
        platform_tx_hash: String,
    },
    /// Not an event the bridge interprets.
    Unrecognized,
}

/// Topic-dispatching log decoder.
#[derive(Clone, Debug)]
pub struct EventDecoder {
    signatures: ContractSignatures,
}

impl EventDecoder {
    /// Decoder for the given topic set.
    pub fn new(signatures: &ContractSignatures) -> Self {
        Self {
            signatures: signatures.clone(),
        }
    }

    /// Decode one log.
    pub fn decode(&self, log: &LogEntry) -> Result<BridgeEvent, BridgeError> {
        let Some(topic) = log.topics.first() else {
            return Ok(BridgeEvent::Unrecognized);
        };
        let s = &self.signatures;

        if *topic == s.erc20_transfer_topic {
            decode_erc20_transfer(log)
        } else if *topic == s.transfer_funds_topic {
            decode_transfer_funds(log)
        } else if *topic == s.deposit_funds_topic {
            let mut f = ethabi::decode(&[ParamType::Address, ParamType::Uint(256)], &log.data)?
                .into_iter();
            Ok(BridgeEvent::DepositFunds {
                from: token_address(f.next())?,
                amount: token_uint(f.next())?,
            })
        } else if *topic == s.cross_out_funds_topic {
            let layout = [
                ParamType::Address,
                ParamType::String,
                ParamType::Uint(256),
                ParamType::Address,
            ];
            let mut f = ethabi::decode(&layout, &log.data)?.into_iter();
            Ok(BridgeEvent::CrossOutFunds {
                from: token_address(f.next())?,
                to: token_string(f.next())?,
                amount: token_uint(f.next())?,
                token: token_address(f.next())?,
            })
        } else if let Some(kind) = self.completion_kind(topic) {
            let fields = ethabi::decode(&[ParamType::String], &log.data)?;
            Ok(BridgeEvent::Completed {
                kind,
                platform_tx_hash: token_string(fields.into_iter().last())?,
            })
        } else {
            Ok(BridgeEvent::Unrecognized)
        }
    }

    fn completion_kind(&self, topic: &crate::domain::Hash) -> Option<TxKind> {
        let s = &self.signatures;
        if *topic == s.withdraw_completed_topic {
            Some(TxKind::Withdrawal)
        } else if *topic == s.manager_change_completed_topic {
            Some(TxKind::MembershipChange)
        } else if *topic == s.upgrade_completed_topic {
            Some(TxKind::UpgradeAuthorization)
        } else {
            None
        }
    }
}

/// Standard ERC20 indexes from and to. The amount sits in data, or in a
/// fourth topic for tokens that index it too.
fn decode_erc20_transfer(log: &LogEntry) -> Result<BridgeEvent, BridgeError> {
    if log.topics.len() < 3 {
        return Err(BridgeError::malformed(format!(
            "Transfer log with {} topics",
            log.topics.len()
        )));
    }
    let amount = match log.topics.get(3) {
        Some(t) => u256_from_word(&t.0),
        None => {
            let word = log
                .data
                .get(..WORD)
                .ok_or_else(|| BridgeError::malformed("Transfer log without amount"))?;
            u256_from_word(word)
        }
    };
    Ok(BridgeEvent::Erc20Transfer {
        contract: log.address,
        from: Address::from_word(&log.topics[1].0),
        to: Address::from_word(&log.topics[2].0),
        amount,
    })
}

fn decode_transfer_funds(log: &LogEntry) -> Result<BridgeEvent, BridgeError> {
    if log.data.len() < 2 * WORD {
        return Err(BridgeError::malformed("TransferFunds data too short"));
    }
    let mut to = [0u8; WORD];
    to.copy_from_slice(&log.data[..WORD]);
    Ok(BridgeEvent::TransferFunds {
        to: Address::from_word(&to),
        amount: u256_from_word(&log.data[WORD..2 * WORD]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::calldata::{to_abi_address, to_abi_uint};
    use crate::domain::Hash;
    use ethabi::Token;

    fn decoder() -> (EventDecoder, ContractSignatures) {
        let sigs = ContractSignatures::default();
        (EventDecoder::new(&sigs), sigs)
    }

    fn word(value: u64) -> Vec<u8> {
        let mut w = [0u8; 32];
        U256::from(value).to_big_endian(&mut w);
        w.to_vec()
    }

    #[test]
    fn test_transfer_amount_from_data() {
        let (decoder, sigs) = decoder();
        let log = LogEntry {
            address: Address([0xC0; 20]),
            topics: vec![
                sigs.erc20_transfer_topic,
                Hash(Address([1; 20]).to_word()),
                Hash(Address([2; 20]).to_word()),
            ],
            data: word(500),
        };
        assert_eq!(
            decoder.decode(&log).unwrap(),
            BridgeEvent::Erc20Transfer {
                contract: Address([0xC0; 20]),
                from: Address([1; 20]),
                to: Address([2; 20]),
                amount: U256::from(500),
            }
        );
    }

    #[test]
    fn test_transfer_amount_from_fourth_topic() {
        let (decoder, sigs) = decoder();
        let mut amount = [0u8; 32];
        U256::from(77).to_big_endian(&mut amount);
        let log = LogEntry {
            address: Address([0xC0; 20]),
            topics: vec![
                sigs.erc20_transfer_topic,
                Hash(Address([1; 20]).to_word()),
                Hash(Address([2; 20]).to_word()),
                Hash(amount),
            ],
            data: vec![],
        };
        match decoder.decode(&log).unwrap() {
            BridgeEvent::Erc20Transfer { amount, .. } => assert_eq!(amount, U256::from(77)),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_transfer_with_missing_topics_is_malformed() {
        let (decoder, sigs) = decoder();
        let log = LogEntry {
            address: Address([0xC0; 20]),
            topics: vec![sigs.erc20_transfer_topic],
            data: word(1),
        };
        assert!(matches!(
            decoder.decode(&log),
            Err(BridgeError::MalformedData(_))
        ));
    }

    #[test]
    fn test_transfer_funds_layout() {
        let (decoder, sigs) = decoder();
        let mut data = Address([7; 20]).to_word().to_vec();
        data.extend(word(42));
        let log = LogEntry {
            address: Address([0xBB; 20]),
            topics: vec![sigs.transfer_funds_topic],
            data,
        };
        assert_eq!(
            decoder.decode(&log).unwrap(),
            BridgeEvent::TransferFunds {
                to: Address([7; 20]),
                amount: U256::from(42),
            }
        );
    }

    #[test]
    fn test_cross_out_funds() {
        let (decoder, sigs) = decoder();
        let data = ethabi::encode(&[
            Token::Address(to_abi_address(Address([1; 20]))),
            Token::String("TNVTdTSP".into()),
            Token::Uint(to_abi_uint(U256::from(9))),
            Token::Address(to_abi_address(Address::ZERO)),
        ]);
        let log = LogEntry {
            address: Address([0xBB; 20]),
            topics: vec![sigs.cross_out_funds_topic],
            data,
        };
        assert_eq!(
            decoder.decode(&log).unwrap(),
            BridgeEvent::CrossOutFunds {
                from: Address([1; 20]),
                to: "TNVTdTSP".into(),
                amount: U256::from(9),
                token: Address::ZERO,
            }
        );
    }

    #[test]
    fn test_deposit_funds_with_truncated_data_is_malformed() {
        let (decoder, sigs) = decoder();
        let log = LogEntry {
            address: Address([0xBB; 20]),
            topics: vec![sigs.deposit_funds_topic],
            data: word(1),
        };
        assert!(decoder.decode(&log).is_err());
    }

    #[test]
    fn test_completion_event() {
        let (decoder, sigs) = decoder();
        let log = LogEntry {
            address: Address([0xBB; 20]),
            topics: vec![sigs.upgrade_completed_topic],
            data: ethabi::encode(&[Token::String("p-9".into())]),
        };
        assert_eq!(
            decoder.decode(&log).unwrap(),
            BridgeEvent::Completed {
                kind: TxKind::UpgradeAuthorization,
                platform_tx_hash: "p-9".into(),
            }
        );
    }

    #[test]
    fn test_unknown_topic_and_anonymous_log() {
        let (decoder, _) = decoder();
        let anonymous = LogEntry {
            address: Address([0xBB; 20]),
            topics: vec![],
            data: vec![],
        };
        assert_eq!(decoder.decode(&anonymous).unwrap(), BridgeEvent::Unrecognized);

        let other = LogEntry {
            topics: vec![Hash([0x11; 32])],
            ..anonymous
        };
        assert_eq!(decoder.decode(&other).unwrap(), BridgeEvent::Unrecognized);
    }
}
