//! # Calldata Decoding
//!
//! Selector dispatch and strict ABI layouts of the bridge contract methods.
//!
//! Each [`BridgeMethod`] owns its parameter layout. The [`MethodTable`] maps
//! the leading four bytes of calldata to a method; anything else is
//! `Unrecognized`, never an error.

use crate::domain::{Address, BridgeError, ContractSignatures, DecodedCallIntent, U256};
use ethabi::{ParamType, Token};
use tracing::warn;

/// Length of a method selector.
pub const SELECTOR_LEN: usize = 4;

/// Bridge contract methods the classifier understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeMethod {
    /// `createOrSignWithdraw(string,address,uint256,bool,address,bytes)`
    Withdraw,
    /// `createOrSignManagerChange(string,address[],address[],uint8,bytes)`
    ManagerChange,
    /// `createOrSignUpgrade(string,address,bytes)`
    Upgrade,
    /// `crossOut(string,uint256,address)`
    CrossOut,
}

impl BridgeMethod {
    /// ABI parameter layout.
    pub fn layout(self) -> Vec<ParamType> {
        match self {
            Self::Withdraw => vec![
                ParamType::String,
                ParamType::Address,
                ParamType::Uint(256),
                ParamType::Bool,
                ParamType::Address,
                ParamType::Bytes,
            ],
            Self::ManagerChange => vec![
                ParamType::String,
                ParamType::Array(Box::new(ParamType::Address)),
                ParamType::Array(Box::new(ParamType::Address)),
                ParamType::Uint(8),
                ParamType::Bytes,
            ],
            Self::Upgrade => vec![ParamType::String, ParamType::Address, ParamType::Bytes],
            Self::CrossOut => vec![ParamType::String, ParamType::Uint(256), ParamType::Address],
        }
    }

    /// Decode the arguments that follow the selector.
    pub fn decode_args(self, input: &[u8]) -> Result<Vec<Token>, BridgeError> {
        if input.len() < SELECTOR_LEN {
            return Err(BridgeError::malformed("calldata shorter than selector"));
        }
        Ok(ethabi::decode(&self.layout(), &input[SELECTOR_LEN..])?)
    }
}

/// Selector → method lookup table.
#[derive(Clone, Debug)]
pub struct MethodTable {
    entries: [([u8; 4], BridgeMethod); 4],
}

impl MethodTable {
    /// Build from the configured selectors.
    pub fn new(signatures: &ContractSignatures) -> Self {
        Self {
            entries: [
                (signatures.withdraw, BridgeMethod::Withdraw),
                (signatures.manager_change, BridgeMethod::ManagerChange),
                (signatures.upgrade, BridgeMethod::Upgrade),
                (signatures.cross_out, BridgeMethod::CrossOut),
            ],
        }
    }

    /// Method for the leading selector of `input`, if known.
    pub fn method_of(&self, input: &[u8]) -> Option<BridgeMethod> {
        let selector = input.get(..SELECTOR_LEN)?;
        self.entries
            .iter()
            .find(|(s, _)| s.as_slice() == selector)
            .map(|(_, m)| *m)
    }

    /// First-pass classification of calldata.
    pub fn classify(&self, input: &[u8]) -> DecodedCallIntent {
        let Some(method) = self.method_of(input) else {
            return DecodedCallIntent::Unrecognized;
        };
        if method == BridgeMethod::CrossOut {
            return DecodedCallIntent::CrossOut;
        }
        let platform_tx_hash = match decode_platform_tx_hash(method, input) {
            Ok(hash) => hash,
            Err(e) => {
                warn!("[qc-15] Bridge selector with undecodable arguments: {}", e);
                return DecodedCallIntent::Unrecognized;
            }
        };
        match method {
            BridgeMethod::Withdraw => DecodedCallIntent::Withdrawal { platform_tx_hash },
            BridgeMethod::ManagerChange => DecodedCallIntent::MembershipChange { platform_tx_hash },
            BridgeMethod::Upgrade => DecodedCallIntent::UpgradeAuthorization { platform_tx_hash },
            BridgeMethod::CrossOut => DecodedCallIntent::CrossOut,
        }
    }
}

/// First parameter of an authorization call.
pub fn decode_platform_tx_hash(method: BridgeMethod, input: &[u8]) -> Result<String, BridgeError> {
    let mut args = method.decode_args(input)?.into_iter();
    token_string(args.next())
}

/// Arguments of `crossOut`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossOutArgs {
    /// Platform destination address.
    pub to: String,
    /// Amount.
    pub amount: U256,
    /// Token contract, zero for the native coin.
    pub token: Address,
}

/// Decode `crossOut` calldata.
pub fn decode_cross_out(input: &[u8]) -> Result<CrossOutArgs, BridgeError> {
    let mut args = BridgeMethod::CrossOut.decode_args(input)?.into_iter();
    Ok(CrossOutArgs {
        to: token_string(args.next())?,
        amount: token_uint(args.next())?,
        token: token_address(args.next())?,
    })
}

/// Arguments of `createOrSignManagerChange` that the bridge records.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerChangeArgs {
    /// Platform transaction being completed.
    pub platform_tx_hash: String,
    /// Members joining.
    pub added: Vec<Address>,
    /// Members leaving.
    pub removed: Vec<Address>,
}

/// Decode `createOrSignManagerChange` calldata.
pub fn decode_manager_change(input: &[u8]) -> Result<ManagerChangeArgs, BridgeError> {
    let mut args = BridgeMethod::ManagerChange.decode_args(input)?.into_iter();
    Ok(ManagerChangeArgs {
        platform_tx_hash: token_string(args.next())?,
        added: token_address_array(args.next())?,
        removed: token_address_array(args.next())?,
    })
}

/// Encode a view call: selector followed by ABI-encoded arguments.
pub fn encode_call(selector: [u8; 4], args: &[Token]) -> Vec<u8> {
    let mut out = selector.to_vec();
    out.extend(ethabi::encode(args));
    out
}

/// Decode a single `bool` return value.
pub fn decode_bool_return(output: &[u8]) -> Result<bool, BridgeError> {
    match ethabi::decode(&[ParamType::Bool], output)?.into_iter().next() {
        Some(Token::Bool(b)) => Ok(b),
        other => Err(BridgeError::malformed(format!("expected bool, got {:?}", other))),
    }
}

// =============================================================================
// TOKEN CONVERSIONS
// =============================================================================

pub(crate) fn to_abi_address(addr: Address) -> ethabi::Address {
    ethabi::Address::from(addr.0)
}

pub(crate) fn to_abi_uint(value: U256) -> ethabi::Uint {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    ethabi::Uint::from_big_endian(&buf)
}

pub(crate) fn token_string(token: Option<Token>) -> Result<String, BridgeError> {
    match token {
        Some(Token::String(s)) => Ok(s),
        other => Err(BridgeError::malformed(format!("expected string, got {:?}", other))),
    }
}

pub(crate) fn token_address(token: Option<Token>) -> Result<Address, BridgeError> {
    match token {
        Some(Token::Address(a)) => Ok(Address(a.0)),
        other => Err(BridgeError::malformed(format!("expected address, got {:?}", other))),
    }
}

pub(crate) fn token_uint(token: Option<Token>) -> Result<U256, BridgeError> {
    match token {
        Some(Token::Uint(v)) => {
            let mut buf = [0u8; 32];
            v.to_big_endian(&mut buf);
            Ok(U256::from_big_endian(&buf))
        }
        other => Err(BridgeError::malformed(format!("expected uint, got {:?}", other))),
    }
}

fn token_address_array(token: Option<Token>) -> Result<Vec<Address>, BridgeError> {
    match token {
        Some(Token::Array(items)) => items
            .into_iter()
            .map(|t| token_address(Some(t)))
            .collect(),
        other => Err(BridgeError::malformed(format!("expected address[], got {:?}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> (MethodTable, ContractSignatures) {
        let sigs = ContractSignatures::default();
        (MethodTable::new(&sigs), sigs)
    }

    fn withdraw_input(sigs: &ContractSignatures, key: &str) -> Vec<u8> {
        encode_call(
            sigs.withdraw,
            &[
                Token::String(key.into()),
                Token::Address(to_abi_address(Address([1; 20]))),
                Token::Uint(to_abi_uint(U256::from(10))),
                Token::Bool(false),
                Token::Address(to_abi_address(Address::ZERO)),
                Token::Bytes(vec![0xAA; 65]),
            ],
        )
    }

    #[test]
    fn test_short_calldata_is_not_bridge_call() {
        let (table, _) = table();
        assert_eq!(table.classify(&[]), DecodedCallIntent::Unrecognized);
        assert_eq!(table.classify(&[0x01, 0x02, 0x03]), DecodedCallIntent::Unrecognized);
    }

    #[test]
    fn test_unknown_selector_regardless_of_length() {
        let (table, _) = table();
        let mut input = vec![0xde, 0xad, 0xbe, 0xef];
        assert_eq!(table.classify(&input), DecodedCallIntent::Unrecognized);
        input.extend(vec![0u8; 256]);
        assert_eq!(table.classify(&input), DecodedCallIntent::Unrecognized);
    }

    #[test]
    fn test_withdraw_selector_decodes_platform_hash() {
        let (table, sigs) = table();
        let intent = table.classify(&withdraw_input(&sigs, "nerve-tx-1"));
        assert_eq!(
            intent,
            DecodedCallIntent::Withdrawal {
                platform_tx_hash: "nerve-tx-1".into()
            }
        );
    }

    #[test]
    fn test_upgrade_selector() {
        let (table, sigs) = table();
        let input = encode_call(
            sigs.upgrade,
            &[
                Token::String("up-1".into()),
                Token::Address(to_abi_address(Address([9; 20]))),
                Token::Bytes(vec![]),
            ],
        );
        assert_eq!(
            table.classify(&input).platform_tx_hash(),
            Some("up-1")
        );
    }

    #[test]
    fn test_cross_out_selector_needs_no_decoding() {
        let (table, sigs) = table();
        let input = sigs.cross_out.to_vec();
        assert_eq!(table.classify(&input), DecodedCallIntent::CrossOut);
    }

    #[test]
    fn test_truncated_authorization_args_are_unrecognized() {
        let (table, sigs) = table();
        let mut input = sigs.withdraw.to_vec();
        input.extend([0u8; 8]);
        assert_eq!(table.classify(&input), DecodedCallIntent::Unrecognized);
    }

    #[test]
    fn test_decode_cross_out() {
        let (_, sigs) = table();
        let input = encode_call(
            sigs.cross_out,
            &[
                Token::String("TNVTdTSP".into()),
                Token::Uint(to_abi_uint(U256::from(1_000u64))),
                Token::Address(to_abi_address(Address([0xCC; 20]))),
            ],
        );
        let args = decode_cross_out(&input).unwrap();
        assert_eq!(args.to, "TNVTdTSP");
        assert_eq!(args.amount, U256::from(1_000u64));
        assert_eq!(args.token, Address([0xCC; 20]));
    }

    #[test]
    fn test_decode_manager_change() {
        let (_, sigs) = table();
        let input = encode_call(
            sigs.manager_change,
            &[
                Token::String("chg-1".into()),
                Token::Array(vec![
                    Token::Address(to_abi_address(Address([1; 20]))),
                    Token::Address(to_abi_address(Address([2; 20]))),
                ]),
                Token::Array(vec![Token::Address(to_abi_address(Address([3; 20])))]),
                Token::Uint(ethabi::Uint::from(1u8)),
                Token::Bytes(vec![]),
            ],
        );
        let args = decode_manager_change(&input).unwrap();
        assert_eq!(args.platform_tx_hash, "chg-1");
        assert_eq!(args.added, vec![Address([1; 20]), Address([2; 20])]);
        assert_eq!(args.removed, vec![Address([3; 20])]);
    }

    #[test]
    fn test_decode_bool_return() {
        let encoded = ethabi::encode(&[Token::Bool(true)]);
        assert!(decode_bool_return(&encoded).unwrap());
        assert!(decode_bool_return(&[]).is_err());
    }
}
