// Counts-based transition model: the stand-in sequence predictor.
//
// The real next-symbol model is an external learned collaborator; this
// module provides a small one that satisfies the same `Predictor` contract
// so the pipeline runs end to end. It is a backoff n-gram model over the
// symbol alphabet: order-2 transition tables conditioned on the last two
// symbols, backing off to order-1 and finally to a unigram table, with a
// small additive smoothing so unseen symbols keep nonzero mass.
//
// The model accumulates counts either straight from a symbol sequence or
// from pulled one-hot batches (each window contributes its trailing
// context and its label), reports mean categorical cross-entropy over a
// batch as its validation loss, and persists to JSON keyed by a model
// name — the best-validation-loss checkpoint lives wherever the driver
// puts it.

use loopforge_seq::codec::Symbol;
use loopforge_seq::dataset::{Batch, SymbolSequence};
use loopforge_seq::sampler::Predictor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Next-symbol counts for one context. Key: next symbol. Value: count.
type CountTable = BTreeMap<Symbol, f64>;

/// Additive smoothing mass given to every symbol when a table is consulted.
const SMOOTHING: f64 = 0.01;

/// Floor for probabilities inside the cross-entropy computation.
const LOSS_FLOOR: f64 = 1e-12;

/// Backoff transition model over the symbol alphabet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionModel {
    alphabet_size: usize,
    /// Order-2 transitions: "prev2,prev1" -> next-symbol counts.
    order2: BTreeMap<String, CountTable>,
    /// Order-1 transitions: "prev1" -> next-symbol counts.
    order1: BTreeMap<String, CountTable>,
    /// Order-0: overall next-symbol distribution.
    unigram: CountTable,
}

impl TransitionModel {
    /// An untrained model: every prediction is the smoothed uniform.
    pub fn new(alphabet_size: usize) -> Self {
        TransitionModel {
            alphabet_size,
            order2: BTreeMap::new(),
            order1: BTreeMap::new(),
            unigram: CountTable::new(),
        }
    }

    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    /// Accumulate counts from every adjacent position of a sequence.
    pub fn observe_sequence(&mut self, sequence: &SymbolSequence) {
        let symbols = sequence.symbols();
        for i in 0..symbols.len().saturating_sub(1) {
            let context = &symbols[i.saturating_sub(1)..=i];
            self.observe(context, symbols[i + 1]);
        }
    }

    /// Accumulate counts from a pulled one-hot batch: each window's
    /// trailing two symbols are the context, the label is the next symbol.
    pub fn observe_batch(&mut self, batch: &Batch) {
        for (window, label) in batch.windows.iter().zip(&batch.labels) {
            let context: Vec<Symbol> = window
                .iter()
                .skip(window.len().saturating_sub(2))
                .map(|row| argmax(row))
                .collect();
            self.observe(&context, argmax(label));
        }
    }

    /// Record one (context, next) observation at every backoff order.
    fn observe(&mut self, context: &[Symbol], next: Symbol) {
        if context.len() >= 2 {
            let key = context_key(&context[context.len() - 2..]);
            *self.order2.entry(key).or_default().entry(next).or_insert(0.0) += 1.0;
        }
        if !context.is_empty() {
            let key = context_key(&context[context.len() - 1..]);
            *self.order1.entry(key).or_default().entry(next).or_insert(0.0) += 1.0;
        }
        *self.unigram.entry(next).or_insert(0.0) += 1.0;
    }

    /// Smoothed next-symbol distribution for a context, with backoff from
    /// order 2 to order 1 to the unigram.
    pub fn distribution(&self, context: &[Symbol]) -> Vec<f64> {
        if context.len() >= 2 {
            let key = context_key(&context[context.len() - 2..]);
            if let Some(table) = self.order2.get(&key) {
                return self.normalize(table);
            }
        }
        if !context.is_empty() {
            let key = context_key(&context[context.len() - 1..]);
            if let Some(table) = self.order1.get(&key) {
                return self.normalize(table);
            }
        }
        self.normalize(&self.unigram)
    }

    fn normalize(&self, table: &CountTable) -> Vec<f64> {
        let mut dist: Vec<f64> = (0..self.alphabet_size)
            .map(|s| table.get(&s).copied().unwrap_or(0.0) + SMOOTHING)
            .collect();
        let total: f64 = dist.iter().sum();
        for p in &mut dist {
            *p /= total;
        }
        dist
    }

    /// Mean categorical cross-entropy of the model over one batch — the
    /// same objective the external predictor trains against.
    pub fn validation_loss(&self, batch: &Batch) -> f64 {
        if batch.windows.is_empty() {
            return 0.0;
        }
        let mut total = 0.0;
        for (window, label) in batch.windows.iter().zip(&batch.labels) {
            let context: Vec<Symbol> = window
                .iter()
                .skip(window.len().saturating_sub(2))
                .map(|row| argmax(row))
                .collect();
            let dist = self.distribution(&context);
            let p = dist[argmax(label)].max(LOSS_FLOOR);
            total -= p.ln();
        }
        total / batch.windows.len() as f64
    }

    /// Mean cross-entropy over several pulled batches. One batch is a
    /// noisy estimate; the driver averages a few pulls per epoch before
    /// deciding whether a checkpoint is the best so far.
    pub fn mean_validation_loss(&self, batches: impl IntoIterator<Item = Batch>) -> f64 {
        let mut total = 0.0;
        let mut count = 0;
        for batch in batches {
            total += self.validation_loss(&batch);
            count += 1;
        }
        if count == 0 { 0.0 } else { total / count as f64 }
    }

    /// Persist to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Restore from a JSON file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = std::fs::read_to_string(path)?;
        let model: TransitionModel = serde_json::from_str(&data)?;
        Ok(model)
    }
}

impl Predictor for TransitionModel {
    fn predict(&self, window: &[Vec<f32>]) -> Vec<f32> {
        let context: Vec<Symbol> = window
            .iter()
            .skip(window.len().saturating_sub(2))
            .map(|row| argmax(row))
            .collect();
        self.distribution(&context)
            .into_iter()
            .map(|p| p as f32)
            .collect()
    }
}

/// Index of the largest entry. One-hot rows make this the decoded symbol.
fn argmax(row: &[f32]) -> Symbol {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

/// Encode a context (slice of symbols) as a string key for table lookup.
fn context_key(context: &[Symbol]) -> String {
    context
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use loopforge_seq::dataset::one_hot;

    fn sequence(symbols: Vec<Symbol>, alphabet_size: usize) -> SymbolSequence {
        SymbolSequence::new(symbols, alphabet_size).unwrap()
    }

    #[test]
    fn learns_a_deterministic_cycle() {
        // 0 -> 1 -> 2 -> 0 -> ...
        let seq = sequence([0, 1, 2].repeat(50), 4);
        let mut model = TransitionModel::new(4);
        model.observe_sequence(&seq);

        let dist = model.distribution(&[0, 1]);
        let mode = dist
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(mode, 2);
        assert!(dist[2] > 0.9, "mode probability {}", dist[2]);
    }

    #[test]
    fn distribution_is_normalized_and_positive() {
        let model = TransitionModel::new(8);
        let dist = model.distribution(&[3, 5]);
        assert_eq!(dist.len(), 8);
        assert!((dist.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(dist.iter().all(|&p| p > 0.0));
    }

    #[test]
    fn predict_acts_on_the_window_tail() {
        let seq = sequence([0, 1, 2].repeat(50), 4);
        let mut model = TransitionModel::new(4);
        model.observe_sequence(&seq);

        // A long window: only the trailing (0, 1) should matter.
        let window: Vec<Vec<f32>> = [3, 3, 3, 0, 1].iter().map(|&s| one_hot(s, 4)).collect();
        let out = model.predict(&window);
        assert_eq!(out.len(), 4);
        let mode = argmax(&out);
        assert_eq!(mode, 2);
    }

    #[test]
    fn trained_model_has_lower_loss_than_untrained() {
        let seq = sequence([0, 1, 2, 3].repeat(100), 4);
        let mut trained = TransitionModel::new(4);
        trained.observe_sequence(&seq);
        let untrained = TransitionModel::new(4);

        // A hand-built "batch" of windows from the same cycle.
        let windows: Vec<Vec<Vec<f32>>> = (0..8)
            .map(|i| {
                [i % 4, (i + 1) % 4]
                    .iter()
                    .map(|&s| one_hot(s, 4))
                    .collect()
            })
            .collect();
        let labels: Vec<Vec<f32>> = (0..8).map(|i| one_hot((i + 2) % 4, 4)).collect();
        let batch = Batch { windows, labels };

        assert!(trained.validation_loss(&batch) < untrained.validation_loss(&batch));
    }

    #[test]
    fn mean_validation_loss_averages_over_batches() {
        let seq = sequence([0, 1, 2, 3].repeat(100), 4);
        let mut model = TransitionModel::new(4);
        model.observe_sequence(&seq);

        // One batch the model knows cold, one it has never seen.
        let easy = Batch {
            windows: vec![[0, 1].iter().map(|&s| one_hot(s, 4)).collect(); 4],
            labels: vec![one_hot(2, 4); 4],
        };
        let hard = Batch {
            windows: vec![[0, 1].iter().map(|&s| one_hot(s, 4)).collect(); 4],
            labels: vec![one_hot(0, 4); 4],
        };

        let easy_loss = model.validation_loss(&easy);
        let hard_loss = model.validation_loss(&hard);
        let mean = model.mean_validation_loss([easy, hard]);
        assert!((mean - (easy_loss + hard_loss) / 2.0).abs() < 1e-12);

        // No batches pulled at all degrades to zero, not NaN.
        assert_eq!(model.mean_validation_loss([]), 0.0);
    }

    #[test]
    fn observe_batch_accumulates_counts_from_windows() {
        let mut from_batch = TransitionModel::new(4);
        let windows: Vec<Vec<Vec<f32>>> =
            vec![[0, 1].iter().map(|&s| one_hot(s, 4)).collect(); 10];
        let labels = vec![one_hot(2, 4); 10];
        from_batch.observe_batch(&Batch { windows, labels });

        let dist = from_batch.distribution(&[0, 1]);
        assert_eq!(argmax(&dist.iter().map(|&p| p as f32).collect::<Vec<_>>()), 2);
    }

    #[test]
    fn json_round_trip_preserves_predictions() {
        let seq = sequence([0, 2, 1, 3].repeat(30), 4);
        let mut model = TransitionModel::new(4);
        model.observe_sequence(&seq);

        let json = serde_json::to_string(&model).unwrap();
        let restored: TransitionModel = serde_json::from_str(&json).unwrap();
        assert_eq!(model.distribution(&[0, 2]), restored.distribution(&[0, 2]));
        assert_eq!(model.distribution(&[]), restored.distribution(&[]));
    }
}
