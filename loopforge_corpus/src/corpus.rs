// Corpus loading: per-file activity arrays -> one symbol sequence.
//
// The raw corpus is a directory tree of JSON files, each holding a 2-D
// array of numbers: rows are time steps, columns follow a fixed master
// pitch list. Only a configured subset of the master pitches is read; the
// rest of each row is ignored. Files whose restricted columns carry fewer
// active cells than the min-hits threshold are dropped entirely — they are
// mostly silence after filtering and would teach the model nothing.
//
// Per-file problems are recoverable: a file that fails to parse or whose
// rows disagree with the master width is skipped with a warning and the
// walk continues. A missing directory or a walk that yields zero usable
// files is fatal. Files are visited in sorted path order so the
// concatenated sequence is identical across runs and platforms.

use loopforge_seq::codec::{Codec, CodecError, PitchSet};
use loopforge_seq::dataset::{DatasetError, SymbolSequence};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// Which pitches the corpus files carry, which subset to model, and how
/// thin a file may be before it is dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Every pitch represented in the corpus arrays, in column order.
    pub master_pitches: Vec<u8>,
    /// The subset actually modeled. Must all appear in `master_pitches`;
    /// at most 8 (the codec's alphabet cap).
    pub in_pitches: Vec<u8>,
    /// Minimum number of active cells (over the subset) to keep a file.
    pub min_hits: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        // The drum-kit layout the corpus arrays were exported with.
        CorpusConfig {
            master_pitches: vec![
                36, 37, 38, 40, 41, 42, 44, 45, 46, 47, 49, 50, 58, 59, 60, 61, 62, 63, 64, 66,
            ],
            in_pitches: vec![36, 38, 41, 42, 47, 58, 59, 61],
            min_hits: 8,
        }
    }
}

impl CorpusConfig {
    /// Load a config from a JSON file.
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let data = fs::read_to_string(path)?;
        let config: CorpusConfig = serde_json::from_str(&data)?;
        Ok(config)
    }
}

/// Fatal corpus problems. Per-file issues never surface here — they are
/// skip-and-continue.
#[derive(Debug)]
pub enum CorpusError {
    /// The corpus root does not exist or is not a directory.
    MissingDirectory { path: PathBuf },
    /// The walk itself failed partway (e.g. an unreadable subdirectory).
    WalkFailed { path: PathBuf, message: String },
    /// The walk finished without a single usable file.
    NoUsableFiles { path: PathBuf },
    /// An `in_pitches` entry is absent from `master_pitches`.
    UnknownInPitch { pitch: u8 },
    /// The pitch subset itself is invalid (empty, too wide, duplicated).
    Codec(CodecError),
    /// The concatenated sequence failed validation.
    Dataset(DatasetError),
}

impl fmt::Display for CorpusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorpusError::MissingDirectory { path } => {
                write!(f, "corpus directory {} not found or not a directory", path.display())
            }
            CorpusError::WalkFailed { path, message } => {
                write!(f, "failed to walk corpus directory {}: {message}", path.display())
            }
            CorpusError::NoUsableFiles { path } => {
                write!(f, "no usable corpus files under {}", path.display())
            }
            CorpusError::UnknownInPitch { pitch } => {
                write!(f, "in-pitch {pitch} not present in the master pitch list")
            }
            CorpusError::Codec(e) => write!(f, "{e}"),
            CorpusError::Dataset(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CorpusError {}

impl From<CodecError> for CorpusError {
    fn from(e: CodecError) -> Self {
        CorpusError::Codec(e)
    }
}

impl From<DatasetError> for CorpusError {
    fn from(e: DatasetError) -> Self {
        CorpusError::Dataset(e)
    }
}

/// A fully loaded corpus: the codec that encoded it and the concatenated
/// symbol sequence, plus walk statistics for the driver's report.
#[derive(Debug)]
pub struct LoadedCorpus {
    pub pitch_set: PitchSet,
    pub codec: Codec,
    pub sequence: SymbolSequence,
    pub files_used: usize,
    pub files_skipped: usize,
}

/// Walk `dir` recursively and encode every usable activity array into one
/// concatenated symbol sequence over the configured pitch subset.
pub fn load_corpus(dir: &Path, config: &CorpusConfig) -> Result<LoadedCorpus, CorpusError> {
    let pitch_set = PitchSet::new(config.in_pitches.clone())?;
    let codec = Codec::new(&pitch_set);

    let in_indices: Vec<usize> = config
        .in_pitches
        .iter()
        .map(|&p| {
            config
                .master_pitches
                .iter()
                .position(|&m| m == p)
                .ok_or(CorpusError::UnknownInPitch { pitch: p })
        })
        .collect::<Result<_, _>>()?;

    if !dir.is_dir() {
        return Err(CorpusError::MissingDirectory { path: dir.to_path_buf() });
    }
    let mut files = Vec::new();
    collect_json_files(dir, &mut files).map_err(|e| CorpusError::WalkFailed {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;
    files.sort();

    let mut symbols = Vec::new();
    let mut files_used = 0;
    let mut files_skipped = 0;

    for file in &files {
        match load_activity_file(file, config.master_pitches.len(), &in_indices) {
            Ok(folded) => {
                let hits: usize = folded
                    .iter()
                    .map(|row| row.iter().filter(|&&v| v > 0.0).count())
                    .sum();
                if hits < config.min_hits {
                    files_skipped += 1;
                    continue;
                }
                // Width was already checked against the master list, so the
                // folded rows match the codec width exactly.
                symbols.extend(codec.encode_matrix(&folded)?);
                files_used += 1;
            }
            Err(reason) => {
                eprintln!("warning: skipping {}: {}", file.display(), reason);
                files_skipped += 1;
            }
        }
    }

    if files_used == 0 {
        return Err(CorpusError::NoUsableFiles { path: dir.to_path_buf() });
    }

    let alphabet_size = codec.alphabet_size();
    Ok(LoadedCorpus {
        pitch_set,
        codec,
        sequence: SymbolSequence::new(symbols, alphabet_size)?,
        files_used,
        files_skipped,
    })
}

/// Recursively gather every `.json` file under `dir`.
fn collect_json_files(dir: &Path, out: &mut Vec<PathBuf>) -> std::io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_json_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            out.push(path);
        }
    }
    Ok(())
}

/// Parse one activity file and project it down to the in-pitch columns.
/// Any per-file problem comes back as a plain message for the warning line.
fn load_activity_file(
    path: &Path,
    master_width: usize,
    in_indices: &[usize],
) -> Result<Vec<Vec<f32>>, String> {
    let data = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let matrix: Vec<Vec<f32>> = serde_json::from_str(&data).map_err(|e| e.to_string())?;

    let mut folded = Vec::with_capacity(matrix.len());
    for (i, row) in matrix.iter().enumerate() {
        if row.len() != master_width {
            return Err(format!(
                "row {i} has {} columns, expected {master_width}",
                row.len()
            ));
        }
        folded.push(in_indices.iter().map(|&j| row[j]).collect());
    }
    Ok(folded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    /// Two-pitch config over a three-pitch master list, threshold 2.
    fn small_config() -> CorpusConfig {
        CorpusConfig {
            master_pitches: vec![36, 38, 42],
            in_pitches: vec![36, 42],
            min_hits: 2,
        }
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("loopforge_corpus_{}_{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_json(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn loads_and_encodes_a_corpus() {
        let dir = scratch_dir("loads");
        // Rows are [36, 38, 42]; only columns 36 and 42 are modeled.
        // Step 1: kick only -> (1,0) -> 2. Step 2: hat only -> (0,1) -> 1.
        write_json(&dir, "a.json", "[[90, 0, 0], [0, 64, 80], [100, 0, 100]]");
        // Nested directories are walked too.
        fs::create_dir_all(dir.join("sub")).unwrap();
        write_json(&dir.join("sub"), "b.json", "[[0, 0, 70], [70, 0, 0]]");

        let corpus = load_corpus(&dir, &small_config()).unwrap();
        assert_eq!(corpus.files_used, 2);
        assert_eq!(corpus.files_skipped, 0);
        // Sorted path order: a.json before sub/b.json.
        assert_eq!(corpus.sequence.symbols(), &[2, 1, 3, 1, 2]);
        assert_eq!(corpus.sequence.alphabet_size(), 4);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn thin_files_are_dropped() {
        let dir = scratch_dir("thin");
        // Only one active cell over the subset — below min_hits = 2.
        write_json(&dir, "thin.json", "[[90, 0, 0], [0, 64, 0]]");
        write_json(&dir, "full.json", "[[90, 0, 90], [90, 0, 0]]");

        let corpus = load_corpus(&dir, &small_config()).unwrap();
        assert_eq!(corpus.files_used, 1);
        assert_eq!(corpus.files_skipped, 1);
        assert_eq!(corpus.sequence.symbols(), &[3, 2]);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn malformed_files_are_skipped_not_fatal() {
        let dir = scratch_dir("malformed");
        write_json(&dir, "bad_width.json", "[[90, 0]]");
        write_json(&dir, "not_a_matrix.json", "{\"oops\": true}");
        write_json(&dir, "good.json", "[[90, 0, 90], [0, 0, 70]]");

        let corpus = load_corpus(&dir, &small_config()).unwrap();
        assert_eq!(corpus.files_used, 1);
        assert_eq!(corpus.files_skipped, 2);

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn empty_directory_is_fatal() {
        let dir = scratch_dir("empty");
        let err = load_corpus(&dir, &small_config()).unwrap_err();
        assert!(matches!(err, CorpusError::NoUsableFiles { .. }));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_directory_is_fatal() {
        let dir = env::temp_dir().join("loopforge_corpus_does_not_exist");
        let err = load_corpus(&dir, &small_config()).unwrap_err();
        assert!(matches!(err, CorpusError::MissingDirectory { .. }));
    }

    #[test]
    fn file_passed_as_corpus_root_is_fatal() {
        let dir = scratch_dir("root_is_file");
        let file = dir.join("not_a_dir.json");
        fs::write(&file, "[[0, 0, 0]]").unwrap();
        // The root itself must be a directory; a plain file is rejected up
        // front rather than surfacing as a walk failure.
        let err = load_corpus(&file, &small_config()).unwrap_err();
        assert!(matches!(err, CorpusError::MissingDirectory { .. }));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn in_pitch_must_be_in_master_list() {
        let dir = scratch_dir("unknown_pitch");
        write_json(&dir, "a.json", "[[90, 0, 0]]");
        let config = CorpusConfig {
            master_pitches: vec![36, 38, 42],
            in_pitches: vec![36, 99],
            min_hits: 0,
        };
        let err = load_corpus(&dir, &config).unwrap_err();
        assert!(matches!(err, CorpusError::UnknownInPitch { pitch: 99 }));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn default_config_matches_the_export_layout() {
        let config = CorpusConfig::default();
        assert_eq!(config.master_pitches.len(), 20);
        assert_eq!(config.in_pitches.len(), 8);
        for p in &config.in_pitches {
            assert!(config.master_pitches.contains(p));
        }
    }
}
