// Loopforge sequence engine.
//
// Models a stream of drum-loop MIDI data symbolically: each time step is a
// number in [0, 2^p) representing a configuration of p pitches that may be
// on or off. This crate is the pure core — it never touches the filesystem.
// The pipeline it supports:
//
// - codec.rs: bit-exact bijection between pitch configurations and integer
//   symbols, plus the lossy matrix encode/decode and the unfold back onto
//   the full 128-pitch MIDI layout
// - dataset.rs: reproducible train/validation split of window offsets and
//   an unbounded pull-based stream of one-hot training batches
// - sampler.rs: stepwise autoregressive generation against an external
//   next-symbol predictor, with temperature-controlled sampling
//
// The sequence predictor itself (network, optimizer, checkpoints) lives
// behind the narrow `Predictor` trait in sampler.rs; loopforge_corpus
// provides a counts-based stand-in plus corpus loading and MIDI output.
//
// Every source of randomness is an instance-owned, explicitly seeded rand
// stream, so runs are reproducible given the same seeds.

pub mod codec;
pub mod dataset;
pub mod sampler;
