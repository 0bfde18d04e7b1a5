// Pitch-configuration codec.
//
// Each time step of a drum loop is a configuration of p pitches, each on or
// off. With p <= 8 there are at most 256 configurations, so every step
// collapses to one symbol in [0, 2^p) and the whole corpus becomes an
// ordinary integer sequence. The codec is the bijection between the two
// views, built once per pitch set and immutable afterwards: a trained
// predictor's output layout depends on the enumeration order, so the order
// must never change within a run.
//
// Enumeration is lexicographic over the p binary positions with position 0
// as the most significant bit: for p = 2 the order is (0,0), (0,1), (1,0),
// (1,1) with ids 0..4. Encode is direct bit arithmetic, decode is direct
// table indexing; no hashing, no per-call allocation on the encode path.
//
// Two lossy edges are documented here rather than hidden: encoding
// thresholds real-valued intensity to on/off (anything > 0 is on), and
// decoding assigns every active pitch one fixed emission velocity. Original
// velocity is unrecoverable from generated output.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A pitch configuration id in `[0, 2^p)`.
pub type Symbol = usize;

/// Hard cap on pitch-set width. 2^8 = 256 symbols is the largest alphabet
/// the one-hot batch layout is sized for.
pub const MAX_PITCHES: usize = 8;

/// Velocity assigned to every active pitch when decoding generated symbols
/// back to an activity matrix.
pub const EMISSION_VELOCITY: f32 = 120.0;

/// Number of pitch columns in the full unfolded MIDI layout.
pub const FULL_PITCH_RANGE: usize = 128;

/// Errors from codec construction and use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The pitch set is empty.
    EmptyPitchSet,
    /// More pitches than `MAX_PITCHES`.
    TooManyPitches { count: usize },
    /// The same pitch appears twice in the set.
    DuplicatePitch { pitch: u8 },
    /// A configuration or matrix row has the wrong number of columns.
    WidthMismatch { expected: usize, found: usize },
    /// A symbol is outside `[0, alphabet_size)`.
    SymbolOutOfRange { symbol: Symbol, alphabet_size: usize },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::EmptyPitchSet => write!(f, "pitch set is empty"),
            CodecError::TooManyPitches { count } => {
                write!(f, "too many configurations for {count} pitches (max {MAX_PITCHES})")
            }
            CodecError::DuplicatePitch { pitch } => {
                write!(f, "duplicate pitch {pitch} in pitch set")
            }
            CodecError::WidthMismatch { expected, found } => {
                write!(f, "expected {expected} pitch columns, found {found}")
            }
            CodecError::SymbolOutOfRange { symbol, alphabet_size } => {
                write!(f, "symbol {symbol} outside alphabet of size {alphabet_size}")
            }
        }
    }
}

impl std::error::Error for CodecError {}

/// An ordered set of distinct MIDI pitches. Position in the list is the
/// pitch's bit index in every configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PitchSet {
    pitches: Vec<u8>,
}

impl PitchSet {
    /// Validate and build a pitch set. Fails on an empty list, more than
    /// `MAX_PITCHES` entries, or a repeated pitch.
    pub fn new(pitches: Vec<u8>) -> Result<Self, CodecError> {
        if pitches.is_empty() {
            return Err(CodecError::EmptyPitchSet);
        }
        if pitches.len() > MAX_PITCHES {
            return Err(CodecError::TooManyPitches { count: pitches.len() });
        }
        for (i, &p) in pitches.iter().enumerate() {
            if pitches[..i].contains(&p) {
                return Err(CodecError::DuplicatePitch { pitch: p });
            }
        }
        Ok(PitchSet { pitches })
    }

    /// Number of pitches in the set.
    pub fn len(&self) -> usize {
        self.pitches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pitches.is_empty()
    }

    /// The pitches in bit-index order.
    pub fn pitches(&self) -> &[u8] {
        &self.pitches
    }

    /// Size of the symbol alphabet for this set: 2^p.
    pub fn alphabet_size(&self) -> usize {
        1 << self.pitches.len()
    }
}

/// The configuration <-> symbol bijection for one pitch set.
///
/// Decode is a precomputed table; encode folds the bit vector directly into
/// the table index. Both are total over their valid domains and mutually
/// inverse: `encode(decode(s)) == s` and `decode(encode(c)) == c`.
#[derive(Debug, Clone)]
pub struct Codec {
    pitch_count: usize,
    /// `decode_table[s]` is the length-p configuration with id `s`.
    decode_table: Vec<Vec<bool>>,
}

impl Codec {
    /// Build the codec for a pitch set by enumerating all 2^p
    /// configurations in canonical order.
    pub fn new(pitch_set: &PitchSet) -> Self {
        let p = pitch_set.len();
        let decode_table = (0..1usize << p)
            .map(|id| {
                // Position 0 is the most significant bit of the id.
                (0..p).map(|j| (id >> (p - 1 - j)) & 1 == 1).collect()
            })
            .collect();
        Codec {
            pitch_count: p,
            decode_table,
        }
    }

    /// Number of pitches per configuration.
    pub fn pitch_count(&self) -> usize {
        self.pitch_count
    }

    /// Number of distinct symbols: 2^p.
    pub fn alphabet_size(&self) -> usize {
        self.decode_table.len()
    }

    /// Map a configuration to its symbol.
    pub fn encode(&self, config: &[bool]) -> Result<Symbol, CodecError> {
        if config.len() != self.pitch_count {
            return Err(CodecError::WidthMismatch {
                expected: self.pitch_count,
                found: config.len(),
            });
        }
        let mut id = 0usize;
        for &bit in config {
            id = (id << 1) | usize::from(bit);
        }
        Ok(id)
    }

    /// Map a symbol back to its configuration.
    pub fn decode(&self, symbol: Symbol) -> Result<&[bool], CodecError> {
        self.decode_table
            .get(symbol)
            .map(Vec::as_slice)
            .ok_or(CodecError::SymbolOutOfRange {
                symbol,
                alphabet_size: self.decode_table.len(),
            })
    }

    /// Encode an activity matrix (rows = time steps, columns = pitches in
    /// bit-index order) into a symbol sequence.
    ///
    /// Each cell is thresholded to active iff its value is > 0 before
    /// lookup. This is the lossy step: intensity is discarded.
    pub fn encode_matrix(&self, matrix: &[Vec<f32>]) -> Result<Vec<Symbol>, CodecError> {
        matrix
            .iter()
            .map(|row| {
                if row.len() != self.pitch_count {
                    return Err(CodecError::WidthMismatch {
                        expected: self.pitch_count,
                        found: row.len(),
                    });
                }
                let config: Vec<bool> = row.iter().map(|&v| v > 0.0).collect();
                self.encode(&config)
            })
            .collect()
    }

    /// Decode a symbol sequence into an activity matrix, assigning
    /// `EMISSION_VELOCITY` to every active pitch.
    pub fn decode_matrix(&self, symbols: &[Symbol]) -> Result<Vec<Vec<f32>>, CodecError> {
        symbols
            .iter()
            .map(|&s| {
                let config = self.decode(s)?;
                Ok(config
                    .iter()
                    .map(|&on| if on { EMISSION_VELOCITY } else { 0.0 })
                    .collect())
            })
            .collect()
    }
}

/// Unfold a folded activity matrix (one column per pitch in `pitch_set`)
/// onto the full 128-column MIDI pitch layout. Unused columns stay zero.
pub fn unfold(
    folded: &[Vec<f32>],
    pitch_set: &PitchSet,
) -> Result<Vec<[f32; FULL_PITCH_RANGE]>, CodecError> {
    let p = pitch_set.len();
    folded
        .iter()
        .map(|row| {
            if row.len() != p {
                return Err(CodecError::WidthMismatch {
                    expected: p,
                    found: row.len(),
                });
            }
            let mut full = [0.0f32; FULL_PITCH_RANGE];
            for (&pitch, &value) in pitch_set.pitches().iter().zip(row) {
                full[pitch as usize] = value;
            }
            Ok(full)
        })
        .collect()
}
