// Loopforge — CLI entry point.
//
// Runs the whole pipeline: corpus loading -> train/validation batch
// streams -> transition-model training with best-checkpoint tracking ->
// temperature-swept generation -> MIDI output.
//
// Usage:
//   cargo run -p loopforge_corpus --bin generate -- [--corpus DIR] [--out DIR]
//     [--config FILE] [--model-name NAME] [--epochs N] [--batches-per-epoch N]
//     [--validation-batches N] [--phrase-len N] [--batch-size N]
//     [--validation-fraction F] [--length N] [--steps-per-quarter N] [--seed N]
//
// With --seed the entire run is reproducible, including the split, the
// batch draws, the seed-window choice, and the sampling.

use loopforge_corpus::corpus::{CorpusConfig, load_corpus};
use loopforge_corpus::history::{EpochRecord, HistorySink};
use loopforge_corpus::midi::write_midi;
use loopforge_corpus::transition::TransitionModel;
use loopforge_seq::codec::unfold;
use loopforge_seq::dataset::{BatchStream, Partition, SplitConfig};
use loopforge_seq::sampler::generate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let corpus_dir: String = parse_flag(&args, "--corpus").unwrap_or_else(|| "corpus".to_string());
    let out_dir: String = parse_flag(&args, "--out").unwrap_or_else(|| "gen-midi".to_string());
    let model_name: String =
        parse_flag(&args, "--model-name").unwrap_or_else(|| "loopforge-model".to_string());
    let epochs: usize = parse_flag(&args, "--epochs").unwrap_or(10);
    let batches_per_epoch: usize = parse_flag(&args, "--batches-per-epoch").unwrap_or(64);
    let validation_batches: usize = parse_flag(&args, "--validation-batches").unwrap_or(8);
    let phrase_len: usize = parse_flag(&args, "--phrase-len").unwrap_or(64);
    let batch_size: usize = parse_flag(&args, "--batch-size").unwrap_or(64);
    let validation_fraction: f64 = parse_flag(&args, "--validation-fraction").unwrap_or(0.1);
    let length: usize = parse_flag(&args, "--length").unwrap_or(512);
    let steps_per_quarter: u32 = parse_flag(&args, "--steps-per-quarter").unwrap_or(4);
    let seed: Option<u64> = parse_flag(&args, "--seed");

    println!("=== Loopforge Generator ===");
    println!("Corpus: {corpus_dir}");
    println!("Output: {out_dir}");
    println!("Phrase length: {phrase_len}, batch size: {batch_size}");
    println!("Epochs: {epochs} x {batches_per_epoch} batches");
    if let Some(s) = seed {
        println!("Seed: {s}");
    }
    println!();

    let mut rng = if let Some(s) = seed {
        StdRng::seed_from_u64(s)
    } else {
        StdRng::from_os_rng()
    };

    // Load the corpus.
    println!("[1/5] Loading corpus...");
    let corpus_config = match parse_flag::<String>(&args, "--config") {
        Some(path) => match CorpusConfig::load(Path::new(&path)) {
            Ok(c) => {
                println!("  Loaded config from {path}.");
                c
            }
            Err(e) => {
                eprintln!("  Failed to load config {path}: {e}");
                std::process::exit(1);
            }
        },
        None => CorpusConfig::default(),
    };
    let corpus = match load_corpus(Path::new(&corpus_dir), &corpus_config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("  Error loading corpus: {e}");
            std::process::exit(1);
        }
    };
    let alphabet_size = corpus.codec.alphabet_size();
    println!(
        "  {} files used, {} skipped. Sequence of {} symbols over an alphabet of {}.",
        corpus.files_used,
        corpus.files_skipped,
        corpus.sequence.len(),
        alphabet_size
    );

    // Build the batch streams. The split seed is fixed; only the per-stream
    // draw seeds come from the run RNG.
    println!("[2/5] Splitting into train/validation streams...");
    let split_config = SplitConfig {
        phrase_len,
        batch_size,
        validation_fraction,
        split_seed: 0,
    };
    let train_draw_seed: u64 = rng.random();
    let validation_draw_seed: u64 = rng.random();
    let mut train_stream = match BatchStream::new(
        &corpus.sequence,
        &split_config,
        Partition::Train,
        train_draw_seed,
    ) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("  Error building train stream: {e}");
            std::process::exit(1);
        }
    };
    let mut validation_stream = match BatchStream::new(
        &corpus.sequence,
        &split_config,
        Partition::Validation,
        validation_draw_seed,
    ) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("  Error building validation stream: {e}");
            std::process::exit(1);
        }
    };
    println!(
        "  {} train offsets, {} validation offsets.",
        train_stream.allowed_offsets().len(),
        validation_stream.allowed_offsets().len()
    );

    if let Err(e) = std::fs::create_dir_all(&out_dir) {
        eprintln!("Error creating output directory {out_dir}: {e}");
        std::process::exit(1);
    }
    let model_path = Path::new(&out_dir).join(format!("{model_name}.json"));

    // Train, keeping the best-validation-loss model.
    println!("[3/5] Training the transition model...");
    let mut model = if model_path.exists() {
        match TransitionModel::load(&model_path) {
            Ok(m) => {
                println!("  Loaded previous model from {}.", model_path.display());
                m
            }
            Err(e) => {
                eprintln!("  Failed to load {}: {e}. Starting fresh.", model_path.display());
                TransitionModel::new(alphabet_size)
            }
        }
    } else {
        TransitionModel::new(alphabet_size)
    };

    let history = HistorySink::new(Path::new(&out_dir).join("history.jsonl"));
    let mut best: Option<(f64, TransitionModel)> = None;
    for epoch in 0..epochs {
        let mut train_loss_total = 0.0;
        for _ in 0..batches_per_epoch {
            let batch = train_stream.next_batch();
            // Predictive loss before the batch is absorbed into the counts.
            train_loss_total += model.validation_loss(&batch);
            model.observe_batch(&batch);
        }
        let train_loss = train_loss_total / batches_per_epoch as f64;
        // Average over several validation pulls; one batch is too noisy a
        // basis for the best-checkpoint decision.
        let validation_loss = model
            .mean_validation_loss((0..validation_batches).map(|_| validation_stream.next_batch()));
        println!(
            "  Epoch {epoch}: train loss {train_loss:.4}, validation loss {validation_loss:.4}"
        );

        if best.as_ref().is_none_or(|(loss, _)| validation_loss < *loss) {
            println!("  Best validation loss so far. Saving...");
            if let Err(e) = model.save(&model_path) {
                eprintln!("  Failed to save model: {e}");
            }
            best = Some((validation_loss, model.clone()));
        }
        if let Err(e) = history.append(&EpochRecord { epoch, train_loss, validation_loss }) {
            eprintln!("  Failed to append history: {e}");
        }
    }
    let best_model = match best {
        Some((loss, m)) => {
            println!("  Best validation loss: {loss:.4}");
            m
        }
        // Zero epochs requested: generate straight from the loaded model.
        None => model,
    };

    // Draw a seed window from the corpus itself.
    println!("[4/5] Drawing a seed window...");
    let symbols = corpus.sequence.symbols();
    let start = rng.random_range(0..symbols.len() - phrase_len);
    let seed_window = &symbols[start..start + phrase_len];
    println!("  Seeding from offset {start}.");

    // Generate at a sweep of temperatures and write one file each.
    println!("[5/5] Generating {length} steps per temperature...");
    for temperature in [0.2, 0.5, 1.0, 1.2] {
        let generated = match generate(
            &best_model,
            seed_window,
            temperature,
            length,
            alphabet_size,
            &mut rng,
        ) {
            Ok(g) => g,
            Err(e) => {
                // Fatal to this temperature only.
                eprintln!("  Generation failed at temperature {temperature}: {e}");
                continue;
            }
        };

        let folded = match corpus.codec.decode_matrix(&generated) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("  Decode failed at temperature {temperature}: {e}");
                continue;
            }
        };
        let full = match unfold(&folded, &corpus.pitch_set) {
            Ok(m) => m,
            Err(e) => {
                eprintln!("  Unfold failed at temperature {temperature}: {e}");
                continue;
            }
        };

        let out_path = Path::new(&out_dir).join(format!("out_{length}_{temperature}.mid"));
        match write_midi(&full, steps_per_quarter, &out_path) {
            Ok(()) => println!("  Wrote {} (temperature {temperature}).", out_path.display()),
            Err(e) => eprintln!("  Error writing {}: {e}", out_path.display()),
        }
    }

    println!();
    println!("Play with: timidity {out_dir}/out_{length}_1.mid (or any MIDI player)");
}

fn parse_flag<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}
