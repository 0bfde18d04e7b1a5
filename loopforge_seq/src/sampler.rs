// Autoregressive generation against an external next-symbol predictor.
//
// The predictor is a black box behind the `Predictor` trait: one-hot window
// of shape (L, alphabet) in, raw non-negative probability vector out. It
// does not have to be normalized to machine precision — the sampler
// renormalizes after temperature rescaling anyway.
//
// Per step: one-hot the current window, query the predictor, rescale the
// distribution by exp(ln(p) / T), draw one categorical sample, append it,
// and slide the window forward by one. The max logit is subtracted before
// exponentiating so low temperatures cannot overflow. Temperature toward 0
// sharpens toward the mode; large temperature flattens toward uniform;
// T = 1 is neutral up to renormalization.
//
// A distribution that comes out of rescaling all-zero or non-finite is a
// typed error, fatal to this call only — drawing from it would be
// undefined, and the caller may well retry with a different seed window.

use crate::codec::Symbol;
use crate::dataset::one_hot;
use rand::Rng;
use std::fmt;

/// The narrow contract the trained sequence model is used through.
///
/// `window` is one-hot, shape (L, alphabet). The returned vector must have
/// alphabet length and non-negative entries; it need not sum to 1.
pub trait Predictor {
    fn predict(&self, window: &[Vec<f32>]) -> Vec<f32>;
}

/// Errors from a single generation call.
#[derive(Debug, Clone, PartialEq)]
pub enum SamplingError {
    /// Temperature must be finite and strictly positive.
    InvalidTemperature { temperature: f64 },
    /// The seed window is empty.
    EmptySeedWindow,
    /// A seed symbol is outside the alphabet.
    SeedSymbolOutOfRange { symbol: Symbol, alphabet_size: usize },
    /// The predictor returned a vector of the wrong length.
    PredictorWidthMismatch { expected: usize, found: usize },
    /// After rescaling, the distribution was all-zero or non-finite.
    DegenerateDistribution,
}

impl fmt::Display for SamplingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingError::InvalidTemperature { temperature } => {
                write!(f, "temperature {temperature} must be finite and > 0")
            }
            SamplingError::EmptySeedWindow => write!(f, "seed window is empty"),
            SamplingError::SeedSymbolOutOfRange { symbol, alphabet_size } => {
                write!(f, "seed symbol {symbol} outside alphabet of size {alphabet_size}")
            }
            SamplingError::PredictorWidthMismatch { expected, found } => {
                write!(f, "predictor returned {found} probabilities, expected {expected}")
            }
            SamplingError::DegenerateDistribution => {
                write!(f, "rescaled distribution is all-zero or non-finite")
            }
        }
    }
}

impl std::error::Error for SamplingError {}

/// Generate `length` new symbols by rolling the seed window forward one
/// predicted symbol at a time.
///
/// The seed window itself is not part of the output. `length = 0` returns
/// an empty sequence without ever querying the predictor. Randomness comes
/// only from the caller-owned `rng`, so a seeded rng makes the whole call
/// reproducible.
pub fn generate(
    predictor: &impl Predictor,
    seed_window: &[Symbol],
    temperature: f64,
    length: usize,
    alphabet_size: usize,
    rng: &mut impl Rng,
) -> Result<Vec<Symbol>, SamplingError> {
    if !(temperature.is_finite() && temperature > 0.0) {
        return Err(SamplingError::InvalidTemperature { temperature });
    }
    if length == 0 {
        return Ok(Vec::new());
    }
    if seed_window.is_empty() {
        return Err(SamplingError::EmptySeedWindow);
    }
    if let Some(&symbol) = seed_window.iter().find(|&&s| s >= alphabet_size) {
        return Err(SamplingError::SeedSymbolOutOfRange { symbol, alphabet_size });
    }

    let mut window: Vec<Symbol> = seed_window.to_vec();
    let mut generated = Vec::with_capacity(length);

    for _ in 0..length {
        let encoded: Vec<Vec<f32>> = window.iter().map(|&s| one_hot(s, alphabet_size)).collect();
        let raw = predictor.predict(&encoded);
        if raw.len() != alphabet_size {
            return Err(SamplingError::PredictorWidthMismatch {
                expected: alphabet_size,
                found: raw.len(),
            });
        }

        let distribution = rescale(&raw, temperature)?;
        let next = sample_categorical(&distribution, rng.random());

        generated.push(next);
        // Slide the window: drop the oldest symbol, append the newest.
        window.remove(0);
        window.push(next);
    }

    Ok(generated)
}

/// Temperature-rescale a raw probability vector into a distribution.
///
/// Computes exp(ln(p) / T), shifted by the max logit for overflow safety,
/// then renormalizes. Zero entries stay zero (ln 0 = -inf, exp -inf = 0);
/// negative or NaN inputs poison the sum and surface as a degenerate
/// distribution error.
fn rescale(raw: &[f32], temperature: f64) -> Result<Vec<f64>, SamplingError> {
    let logits: Vec<f64> = raw.iter().map(|&p| f64::from(p).ln() / temperature).collect();
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        // Every entry was zero (or the vector was empty).
        return Err(SamplingError::DegenerateDistribution);
    }

    let weights: Vec<f64> = logits.iter().map(|&l| (l - max).exp()).collect();
    let total: f64 = weights.iter().sum();
    if !total.is_finite() || total <= 0.0 {
        return Err(SamplingError::DegenerateDistribution);
    }

    Ok(weights.into_iter().map(|w| w / total).collect())
}

/// Draw one index from a normalized distribution via cumulative scan.
/// `roll` is uniform in [0, 1). Falls back to the last index if rounding
/// leaves the cumulative sum fractionally short of 1.
fn sample_categorical(distribution: &[f64], roll: f64) -> Symbol {
    let mut cumulative = 0.0;
    for (symbol, &p) in distribution.iter().enumerate() {
        cumulative += p;
        if roll < cumulative {
            return symbol;
        }
    }
    distribution.len() - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::cell::Cell;

    /// Predictor that always returns the same vector, counting calls.
    struct FixedPredictor {
        output: Vec<f32>,
        calls: Cell<usize>,
    }

    impl FixedPredictor {
        fn new(output: Vec<f32>) -> Self {
            FixedPredictor { output, calls: Cell::new(0) }
        }
    }

    impl Predictor for FixedPredictor {
        fn predict(&self, _window: &[Vec<f32>]) -> Vec<f32> {
            self.calls.set(self.calls.get() + 1);
            self.output.clone()
        }
    }

    /// Predictor that deterministically continues with (last + 1) mod A.
    struct SuccessorPredictor;

    impl Predictor for SuccessorPredictor {
        fn predict(&self, window: &[Vec<f32>]) -> Vec<f32> {
            let alphabet = window[0].len();
            let last = window
                .last()
                .unwrap()
                .iter()
                .position(|&v| v == 1.0)
                .unwrap();
            let mut out = vec![0.0; alphabet];
            out[(last + 1) % alphabet] = 1.0;
            out
        }
    }

    #[test]
    fn zero_length_never_queries_the_predictor() {
        let predictor = FixedPredictor::new(vec![0.25; 4]);
        let mut rng = StdRng::seed_from_u64(0);
        let out = generate(&predictor, &[0, 1], 1.0, 0, 4, &mut rng).unwrap();
        assert!(out.is_empty());
        assert_eq!(predictor.calls.get(), 0);
    }

    #[test]
    fn one_hot_predictor_forces_constant_output() {
        let mut output = vec![0.0; 8];
        output[5] = 1.0;
        let predictor = FixedPredictor::new(output);
        let mut rng = StdRng::seed_from_u64(1);
        for temperature in [0.2, 1.0, 5.0] {
            let out = generate(&predictor, &[0, 1, 2], temperature, 10, 8, &mut rng).unwrap();
            assert_eq!(out, vec![5; 10], "temperature {temperature}");
        }
    }

    #[test]
    fn window_slides_one_symbol_per_step() {
        let mut rng = StdRng::seed_from_u64(2);
        let out = generate(&SuccessorPredictor, &[0, 1, 2], 1.0, 5, 4, &mut rng).unwrap();
        // Each step continues from the newest symbol in the window.
        assert_eq!(out, vec![3, 0, 1, 2, 3]);
    }

    #[test]
    fn uniform_predictor_gives_roughly_uniform_output() {
        // P = 3: alphabet of 8, seed window of 4 symbols, T = 1, length 2.
        let predictor = FixedPredictor::new(vec![1.0 / 8.0; 8]);
        let mut rng = StdRng::seed_from_u64(3);
        let mut counts = [0usize; 8];
        let trials = 2_000;
        for _ in 0..trials {
            for s in generate(&predictor, &[0, 3, 5, 7], 1.0, 2, 8, &mut rng).unwrap() {
                counts[s] += 1;
            }
        }
        let total = (trials * 2) as f64;
        for (symbol, &count) in counts.iter().enumerate() {
            let frequency = count as f64 / total;
            // Expected 0.125 per symbol; generous statistical bounds.
            assert!(
                (0.10..0.15).contains(&frequency),
                "symbol {symbol} frequency {frequency}"
            );
        }
    }

    #[test]
    fn unnormalized_predictor_output_is_accepted() {
        // Counts instead of probabilities; renormalization handles it.
        let predictor = FixedPredictor::new(vec![3.0, 0.0, 0.0, 0.0]);
        let mut rng = StdRng::seed_from_u64(4);
        let out = generate(&predictor, &[1, 2], 1.0, 6, 4, &mut rng).unwrap();
        assert_eq!(out, vec![0; 6]);
    }

    #[test]
    fn low_temperature_sharpens_to_the_mode() {
        let predictor = FixedPredictor::new(vec![0.6, 0.4, 0.0, 0.0]);
        let mut rng = StdRng::seed_from_u64(5);
        let out = generate(&predictor, &[0, 1], 0.01, 200, 4, &mut rng).unwrap();
        assert!(out.iter().all(|&s| s == 0), "all draws should hit the mode");
    }

    #[test]
    fn degenerate_distributions_are_fatal_to_the_call() {
        let mut rng = StdRng::seed_from_u64(6);
        for bad in [vec![0.0; 4], vec![f32::NAN; 4], vec![-1.0, 0.5, 0.0, 0.0]] {
            let predictor = FixedPredictor::new(bad);
            let err = generate(&predictor, &[0], 1.0, 3, 4, &mut rng).unwrap_err();
            assert_eq!(err, SamplingError::DegenerateDistribution);
        }
    }

    #[test]
    fn invalid_temperature_rejected() {
        let predictor = FixedPredictor::new(vec![0.25; 4]);
        let mut rng = StdRng::seed_from_u64(7);
        for temperature in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let err = generate(&predictor, &[0], temperature, 1, 4, &mut rng).unwrap_err();
            assert!(matches!(err, SamplingError::InvalidTemperature { .. }));
        }
        assert_eq!(predictor.calls.get(), 0);
    }

    #[test]
    fn predictor_width_mismatch_rejected() {
        let predictor = FixedPredictor::new(vec![0.5, 0.5]);
        let mut rng = StdRng::seed_from_u64(8);
        let err = generate(&predictor, &[0], 1.0, 1, 4, &mut rng).unwrap_err();
        assert_eq!(err, SamplingError::PredictorWidthMismatch { expected: 4, found: 2 });
    }

    #[test]
    fn seed_validation() {
        let predictor = FixedPredictor::new(vec![0.25; 4]);
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(
            generate(&predictor, &[], 1.0, 1, 4, &mut rng).unwrap_err(),
            SamplingError::EmptySeedWindow
        );
        assert_eq!(
            generate(&predictor, &[4], 1.0, 1, 4, &mut rng).unwrap_err(),
            SamplingError::SeedSymbolOutOfRange { symbol: 4, alphabet_size: 4 }
        );
    }

    #[test]
    fn rescale_is_neutral_at_temperature_one() {
        let dist = rescale(&[0.1, 0.2, 0.3, 0.4], 1.0).unwrap();
        let expected = [0.1, 0.2, 0.3, 0.4];
        for (got, want) in dist.iter().zip(expected) {
            assert!((got - want).abs() < 1e-6, "{got} vs {want}");
        }
    }

    #[test]
    fn categorical_scan_covers_the_unit_interval() {
        let dist = [0.5, 0.25, 0.25];
        assert_eq!(sample_categorical(&dist, 0.0), 0);
        assert_eq!(sample_categorical(&dist, 0.49), 0);
        assert_eq!(sample_categorical(&dist, 0.5), 1);
        assert_eq!(sample_categorical(&dist, 0.74), 1);
        assert_eq!(sample_categorical(&dist, 0.75), 2);
        assert_eq!(sample_categorical(&dist, 0.999_999), 2);
    }
}
