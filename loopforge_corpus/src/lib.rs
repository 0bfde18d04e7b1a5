// Loopforge collaborators.
//
// Everything around the pure sequence engine that touches the outside
// world, plus the stand-in sequence model:
//
// - corpus.rs: directory tree of per-file JSON activity arrays -> one
//   concatenated symbol sequence (restricted to the configured pitch
//   subset, thin files filtered out)
// - transition.rs: counts-based backoff transition model implementing the
//   core's Predictor trait, with cross-entropy validation loss and JSON
//   persistence
// - midi.rs: 128-column activity matrix -> playable drum-channel MIDI file
// - history.rs: append-only JSON-lines record of per-epoch losses
// - main.rs (`generate` bin): the end-to-end driver — load, split, train,
//   sample at a temperature sweep, write .mid files

pub mod corpus;
pub mod history;
pub mod midi;
pub mod transition;
