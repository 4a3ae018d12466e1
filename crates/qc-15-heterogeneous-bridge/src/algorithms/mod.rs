//! # Algorithms Module
//!
//! Pure decoding of bridge calldata and event logs. No I/O.

pub mod calldata;
pub mod events;

pub use calldata::{
    decode_bool_return, decode_cross_out, decode_manager_change, decode_platform_tx_hash,
    encode_call, BridgeMethod, CrossOutArgs, ManagerChangeArgs, MethodTable, SELECTOR_LEN,
};
pub use events::{BridgeEvent, EventDecoder};
