//! Just enough of the Solana wire format to hand a wallet an unsigned SOL
//! transfer: base58 keys, shortvec lengths, and the legacy transaction
//! layout. Signing, fees, and submission stay on the wallet/chain side.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// The system program owns plain SOL transfers; its id is all zero bytes.
pub const SYSTEM_PROGRAM_ID: Pubkey = Pubkey([0u8; 32]);

// SystemInstruction discriminant for Transfer, little-endian u32 on the wire.
const TRANSFER_INSTRUCTION_INDEX: u32 = 2;

#[derive(Debug, PartialEq, Error)]
pub enum WireError {
    #[error("not a valid base58 string")]
    InvalidBase58,
    #[error("expected 32 bytes, got {0}")]
    InvalidLength(usize),
    #[error("amount does not convert to a positive lamport value")]
    AmountOutOfRange,
    #[error("payer and recipient must be different accounts")]
    DuplicateParties,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Pubkey([u8; 32]);

impl Pubkey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for Pubkey {
    type Err = WireError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        decode_base58_32(value).map(Self)
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

/// Distinct from `Pubkey` so a recent blockhash can never be passed where an
/// account is expected, even though both are 32 base58-encoded bytes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Blockhash([u8; 32]);

impl Blockhash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for Blockhash {
    type Err = WireError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        decode_base58_32(value).map(Self)
    }
}

impl fmt::Display for Blockhash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

fn decode_base58_32(value: &str) -> Result<[u8; 32], WireError> {
    let decoded = bs58::decode(value.trim())
        .into_vec()
        .map_err(|_| WireError::InvalidBase58)?;
    let length = decoded.len();
    decoded
        .try_into()
        .map_err(|_| WireError::InvalidLength(length))
}

pub fn sol_to_lamports(amount_sol: f64) -> Result<u64, WireError> {
    if !amount_sol.is_finite() || amount_sol <= 0.0 {
        return Err(WireError::AmountOutOfRange);
    }

    let lamports = (amount_sol * LAMPORTS_PER_SOL as f64).round();
    if lamports < 1.0 || lamports >= u64::MAX as f64 {
        return Err(WireError::AmountOutOfRange);
    }

    Ok(lamports as u64)
}

pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Compact-u16 length prefix used throughout the transaction format.
pub fn encode_shortvec_len(mut value: u16, out: &mut Vec<u8>) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
            out.push(byte);
        } else {
            out.push(byte);
            return;
        }
    }
}

/// Builds an unsigned legacy transaction moving `lamports` from `payer` to
/// `recipient`: one zeroed 64-byte signature slot (the wallet replaces it
/// when signing) followed by a message with header 1/0/1, the three static
/// account keys, the recent blockhash, and a single system-program transfer
/// instruction.
pub fn build_transfer_transaction(
    payer: &Pubkey,
    recipient: &Pubkey,
    lamports: u64,
    recent_blockhash: &Blockhash,
) -> Result<Vec<u8>, WireError> {
    // Legacy messages reject duplicate static keys; catch it before the RPC does.
    if payer == recipient {
        return Err(WireError::DuplicateParties);
    }

    let mut message = Vec::with_capacity(160);
    message.push(1); // required signatures: the payer
    message.push(0); // read-only signed accounts
    message.push(1); // read-only unsigned accounts: the system program

    encode_shortvec_len(3, &mut message);
    message.extend_from_slice(payer.as_bytes());
    message.extend_from_slice(recipient.as_bytes());
    message.extend_from_slice(SYSTEM_PROGRAM_ID.as_bytes());

    message.extend_from_slice(recent_blockhash.as_bytes());

    encode_shortvec_len(1, &mut message);
    message.push(2); // program id index: the system program key above
    encode_shortvec_len(2, &mut message);
    message.push(0); // from: payer
    message.push(1); // to: recipient

    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&TRANSFER_INSTRUCTION_INDEX.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    encode_shortvec_len(data.len() as u16, &mut message);
    message.extend_from_slice(&data);

    let mut transaction = Vec::with_capacity(1 + 64 + message.len());
    encode_shortvec_len(1, &mut transaction);
    transaction.extend_from_slice(&[0u8; 64]);
    transaction.extend_from_slice(&message);
    Ok(transaction)
}

pub fn encode_transaction_base64(transaction: &[u8]) -> String {
    BASE64.encode(transaction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_program_id_renders_as_thirty_two_ones() {
        assert_eq!(SYSTEM_PROGRAM_ID.to_string(), "11111111111111111111111111111111");
        let parsed: Pubkey = "11111111111111111111111111111111".parse().expect("system id parses");
        assert_eq!(parsed, SYSTEM_PROGRAM_ID);
    }

    #[test]
    fn pubkeys_round_trip_through_base58() {
        let key = Pubkey::from_bytes([7u8; 32]);
        let encoded = key.to_string();
        let decoded: Pubkey = encoded.parse().expect("round trip parses");
        assert_eq!(decoded, key);
    }

    #[test]
    fn pubkey_parsing_rejects_bad_input() {
        assert!(matches!("abc".parse::<Pubkey>(), Err(WireError::InvalidLength(_))));
        assert_eq!("0OIl".parse::<Pubkey>(), Err(WireError::InvalidBase58));
        assert!("".parse::<Pubkey>().is_err());
    }

    #[test]
    fn shortvec_encodings_are_canonical() {
        let cases: [(u16, &[u8]); 6] = [
            (0, &[0x00]),
            (1, &[0x01]),
            (127, &[0x7f]),
            (128, &[0x80, 0x01]),
            (16_383, &[0xff, 0x7f]),
            (16_384, &[0x80, 0x80, 0x01]),
        ];

        for (value, expected) in cases {
            let mut out = Vec::new();
            encode_shortvec_len(value, &mut out);
            assert_eq!(out.as_slice(), expected, "shortvec({value})");
        }
    }

    #[test]
    fn sol_conversion_handles_the_edges() {
        assert_eq!(sol_to_lamports(0.1), Ok(100_000_000));
        assert_eq!(sol_to_lamports(1.0), Ok(LAMPORTS_PER_SOL));
        assert_eq!(sol_to_lamports(0.000_000_001), Ok(1));

        assert_eq!(sol_to_lamports(0.000_000_000_4), Err(WireError::AmountOutOfRange));
        assert_eq!(sol_to_lamports(0.0), Err(WireError::AmountOutOfRange));
        assert_eq!(sol_to_lamports(-1.0), Err(WireError::AmountOutOfRange));
        assert_eq!(sol_to_lamports(f64::NAN), Err(WireError::AmountOutOfRange));
        assert_eq!(sol_to_lamports(f64::INFINITY), Err(WireError::AmountOutOfRange));
        assert_eq!(sol_to_lamports(20_000_000_000.0), Err(WireError::AmountOutOfRange));
    }

    #[test]
    fn transfer_transaction_has_the_legacy_layout() {
        let payer = Pubkey::from_bytes([2u8; 32]);
        let recipient = Pubkey::from_bytes([3u8; 32]);
        let blockhash = Blockhash::from_bytes([9u8; 32]);

        let tx = build_transfer_transaction(&payer, &recipient, LAMPORTS_PER_SOL, &blockhash)
            .expect("transaction builds");

        assert_eq!(tx.len(), 215);
        assert_eq!(tx[0], 1, "one signature slot");
        assert!(tx[1..65].iter().all(|byte| *byte == 0), "signature slot is zeroed");
        assert_eq!(&tx[65..68], &[1, 0, 1], "message header");
        assert_eq!(tx[68], 3, "three static account keys");
        assert_eq!(&tx[69..101], payer.as_bytes());
        assert_eq!(&tx[101..133], recipient.as_bytes());
        assert_eq!(&tx[133..165], SYSTEM_PROGRAM_ID.as_bytes());
        assert_eq!(&tx[165..197], blockhash.as_bytes());
        assert_eq!(tx[197], 1, "one instruction");
        assert_eq!(tx[198], 2, "program id index points at the system program");
        assert_eq!(&tx[199..202], &[2, 0, 1], "two account indexes: payer, recipient");
        assert_eq!(tx[202], 12, "transfer data is 12 bytes");
        assert_eq!(&tx[203..207], &2u32.to_le_bytes(), "transfer discriminant");
        assert_eq!(&tx[207..215], &LAMPORTS_PER_SOL.to_le_bytes(), "lamports little-endian");
    }

    #[test]
    fn transfer_to_self_is_rejected() {
        let key = Pubkey::from_bytes([5u8; 32]);
        let blockhash = Blockhash::from_bytes([9u8; 32]);

        let result = build_transfer_transaction(&key, &key, 1, &blockhash);
        assert_eq!(result, Err(WireError::DuplicateParties));
    }

    #[test]
    fn base64_envelope_decodes_back_to_the_same_bytes() {
        let payer = Pubkey::from_bytes([2u8; 32]);
        let recipient = Pubkey::from_bytes([3u8; 32]);
        let blockhash = Blockhash::from_bytes([9u8; 32]);
        let tx = build_transfer_transaction(&payer, &recipient, 42, &blockhash).expect("transaction builds");

        let encoded = encode_transaction_base64(&tx);
        let decoded = BASE64.decode(encoded.as_bytes()).expect("valid base64");
        assert_eq!(decoded, tx);
    }
}
