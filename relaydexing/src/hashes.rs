use ethers::abi::{self, Token};
use ethers::types::{H160, H256, U256};
use ethers::utils::keccak256;

use crate::events::RelayData;

pub fn h160_to_string(h160: &H160) -> String {
    format!("{h160:#x}")
}

pub fn h256_to_string(h256: &H256) -> String {
    format!("{h256:#x}")
}

/// Deterministic identifier shared by a deposit and its eventual fill.
///
/// Hashes the ABI encoding of the relay data tuple followed by the
/// destination chain id, so any change to an immutable deposit parameter
/// yields a different relay hash.
pub fn relay_hash(relay_data: &RelayData) -> String {
    let RelayData {
        depositor,
        recipient,
        exclusive_relayer,
        input_token,
        output_token,
        input_amount,
        output_amount,
        origin_chain_id,
        destination_chain_id,
        deposit_id,
        fill_deadline,
        exclusivity_deadline,
        message_hash,
    } = relay_data;

    let encoded = abi::encode(&[
        Token::Tuple(vec![
            Token::Address(*depositor),
            Token::Address(*recipient),
            Token::Address(*exclusive_relayer),
            Token::Address(*input_token),
            Token::Address(*output_token),
            Token::Uint(*input_amount),
            Token::Uint(*output_amount),
            Token::Uint(U256::from(*origin_chain_id)),
            Token::Uint(*deposit_id),
            Token::Uint(U256::from(*fill_deadline)),
            Token::Uint(U256::from(*exclusivity_deadline)),
            Token::FixedBytes(message_hash.as_bytes().to_vec()),
        ]),
        Token::Uint(U256::from(*destination_chain_id)),
    ]);

    h256_to_string(&H256::from(keccak256(encoded)))
}
