//! Compact difficulty decoding and hash-vs-target comparison.

use bitcoin::{BlockHash, CompactTarget, Target};

/// Errors raised while decoding the node's difficulty bits.
///
/// All of these indicate the node speaks a protocol we do not understand;
/// none of them are transient.
#[derive(Debug, thiserror::Error)]
pub enum DifficultyError {
    #[error("difficulty bits {bits:?} are not a 32-bit hex integer")]
    InvalidBits {
        bits: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("difficulty bits {0:#010x} encode a negative target")]
    Negative(u32),

    #[error("difficulty bits {0:#010x} overflow a 256-bit target")]
    Overflow(u32),
}

/// Parse the hex `bits` string from a block template into its compact form.
pub fn parse_bits(bits: &str) -> Result<CompactTarget, DifficultyError> {
    let digits = bits
        .strip_prefix("0x")
        .or_else(|| bits.strip_prefix("0X"))
        .unwrap_or(bits);

    u32::from_str_radix(digits, 16)
        .map(CompactTarget::from_consensus)
        .map_err(|source| DifficultyError::InvalidBits {
            bits: bits.to_string(),
            source,
        })
}

/// Expand a compact target into its full 256-bit value.
///
/// The compact format is `[exponent (1 byte)][mantissa (3 bytes)]` with
/// `target = mantissa * 256^(exponent - 3)`. Bit 23 of the mantissa is a
/// sign bit. A set sign bit is only an error when the resulting magnitude
/// is nonzero; a negative zero decodes to the zero target.
pub fn compact_to_target(bits: CompactTarget) -> Result<Target, DifficultyError> {
    let raw = bits.to_consensus();
    let negative = raw & 0x0080_0000 != 0;

    let exponent = (raw >> 24) as isize;
    let mantissa = raw & 0x007f_ffff;

    // Big-endian target. Mantissa byte `i` (0 = least significant) lands at
    // index 34 - exponent - i; bytes past the end are shifted out.
    let mut target = [0u8; 32];
    for (i, byte) in mantissa.to_le_bytes()[..3].iter().enumerate() {
        if *byte == 0 {
            continue;
        }
        let pos = 34 - exponent - i as isize;
        if pos < 0 {
            return Err(DifficultyError::Overflow(raw));
        }
        if pos < 32 {
            target[pos as usize] = *byte;
        }
    }

    if negative && target != [0u8; 32] {
        return Err(DifficultyError::Negative(raw));
    }

    Ok(Target::from_be_bytes(target))
}

/// Decode the template's hex `bits` string straight into a target.
pub fn decode_target(bits: &str) -> Result<Target, DifficultyError> {
    compact_to_target(parse_bits(bits)?)
}

/// Check whether a block hash satisfies the target.
///
/// The hash is read as a little-endian 256-bit integer, as Bitcoin does, and
/// passes if it is numerically less than or equal to the target.
#[inline]
pub fn meets_target(hash: &BlockHash, target: &Target) -> bool {
    target.is_met_by(*hash)
}

/// Difficulty relative to the mainnet difficulty-1 target.
pub fn bits_to_difficulty(target: &Target) -> f64 {
    target.difficulty_float()
}

/// Format difficulty for display (e.g., "1.23T" for trillion).
pub fn format_difficulty(difficulty: f64) -> String {
    if difficulty >= 1e15 {
        format!("{:.2}P", difficulty / 1e15)
    } else if difficulty >= 1e12 {
        format!("{:.2}T", difficulty / 1e12)
    } else if difficulty >= 1e9 {
        format!("{:.2}G", difficulty / 1e9)
    } else if difficulty >= 1e6 {
        format!("{:.2}M", difficulty / 1e6)
    } else if difficulty >= 1e3 {
        format!("{:.2}K", difficulty / 1e3)
    } else {
        format!("{:.2}", difficulty)
    }
}
