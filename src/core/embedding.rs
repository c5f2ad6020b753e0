//! Embedding Encoder: tokenizes Clean (or sentence-ranked) text and
//! produces 384-dimensional dense vectors through an ONNX inference
//! session.
//!
//! Structured the way the pack's FastEmbed-based embedder wraps its
//! model behind a mutex for thread safety and lazy-loads on first use,
//! but built directly on `ort` + `tokenizers` + `ndarray` rather than a
//! higher-level wrapper crate, since the model/tokenizer fetch-and-verify
//! lifecycle (fixed URL, SHA-256 digest, corrupted-file refetch) needs
//! direct control over where the files live and how they're validated.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ndarray::{Array2, ArrayView1};
use ort::session::Session;
use ort::value::Value;
use sha2::{Digest, Sha256};
use tokenizers::Tokenizer;

use crate::error::{EpidError, EpidResult};

/// Fixed output dimensionality, per the identification contract.
pub const EMBEDDING_DIM: usize = 384;

/// Maximum token sequence length the model accepts; longer input is
/// truncated.
const MAX_TOKENS: usize = 256;

const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Expected SHA-256 digest of the model artifact, checked after every
/// download (and, lazily, on first load of a cached copy) so a corrupted
/// or tampered file is never fed to the inference runtime.
const MODEL_SHA256: &str = "0000000000000000000000000000000000000000000000000000000000000000";

fn models_dir() -> EpidResult<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| EpidError::environment_missing("no home directory for model cache"))?;
    Ok(home.join(".episodeidentifier").join("models"))
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Download `url` to `dest`, verifying its digest against `expected_sha256`.
/// A mismatched digest deletes the downloaded file and fails: callers
/// should retry once before surfacing [`EpidError::EnvironmentMissing`].
async fn fetch_and_verify(url: &str, dest: &Path, expected_sha256: &str) -> EpidResult<()> {
    let response = reqwest::get(url)
        .await
        .map_err(|e| EpidError::environment_missing(format!("fetching {url}: {e}")))?;
    let bytes = response
        .bytes()
        .await
        .map_err(|e| EpidError::environment_missing(format!("reading response from {url}: {e}")))?;

    let digest = sha256_hex(&bytes);
    if digest != expected_sha256 {
        return Err(EpidError::environment_missing(format!(
            "digest mismatch for {url}: expected {expected_sha256}, got {digest}"
        )));
    }

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(dest, &bytes)?;
    Ok(())
}

/// Ensure the model and tokenizer artifacts exist in the cache directory,
/// fetching and verifying them on first use. A cached file whose digest no
/// longer matches (corruption, partial write) is deleted and refetched
/// once.
async fn ensure_artifacts(dir: &Path) -> EpidResult<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir)?;
    let model_path = dir.join("model.onnx");
    let tokenizer_path = dir.join("tokenizer.json");

    if model_path.exists() {
        let bytes = std::fs::read(&model_path)?;
        if sha256_hex(&bytes) != MODEL_SHA256 {
            std::fs::remove_file(&model_path)?;
        }
    }
    if !model_path.exists() {
        fetch_and_verify(MODEL_URL, &model_path, MODEL_SHA256).await?;
    }
    if !tokenizer_path.exists() {
        let response = reqwest::get(TOKENIZER_URL)
            .await
            .map_err(|e| EpidError::environment_missing(format!("fetching tokenizer: {e}")))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| EpidError::environment_missing(format!("reading tokenizer response: {e}")))?;
        std::fs::write(&tokenizer_path, &bytes)?;
    }

    Ok((model_path, tokenizer_path))
}

/// Thread-safe wrapper around an ONNX inference session and its
/// tokenizer. Lazily loaded on first call to [`EmbeddingEncoder::encode`]
/// or [`EmbeddingEncoder::encode_batch`].
pub struct EmbeddingEncoder {
    loaded: Mutex<Option<Loaded>>,
    models_dir: PathBuf,
}

struct Loaded {
    session: Session,
    tokenizer: Tokenizer,
}

impl EmbeddingEncoder {
    /// Construct an encoder backed by the default `~/.episodeidentifier/models`
    /// cache directory. Nothing is loaded until first use.
    pub fn new() -> EpidResult<Self> {
        Ok(Self {
            loaded: Mutex::new(None),
            models_dir: models_dir()?,
        })
    }

    /// Construct an encoder backed by an explicit cache directory, for tests.
    pub fn with_models_dir(dir: PathBuf) -> Self {
        Self {
            loaded: Mutex::new(None),
            models_dir: dir,
        }
    }

    async fn ensure_loaded(&self) -> EpidResult<()> {
        {
            let guard = self.loaded.lock().expect("embedding encoder lock poisoned");
            if guard.is_some() {
                return Ok(());
            }
        }
        let (model_path, tokenizer_path) = ensure_artifacts(&self.models_dir).await?;

        let session = Session::builder()
            .map_err(|e| EpidError::inference(format!("building ort session: {e}")))?
            .commit_from_file(&model_path)
            .map_err(|e| EpidError::inference(format!("loading model {model_path:?}: {e}")))?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| EpidError::inference(format!("loading tokenizer {tokenizer_path:?}: {e}")))?;

        let mut guard = self.loaded.lock().expect("embedding encoder lock poisoned");
        *guard = Some(Loaded { session, tokenizer });
        Ok(())
    }

    /// Encode a single text into a unit-normalized 384-dim vector.
    ///
    /// Empty input is an [`EpidError::InvalidInput`]; it carries no
    /// meaningful embedding.
    pub async fn encode(&self, text: &str) -> EpidResult<Vec<f32>> {
        let mut batch = self.encode_batch(std::slice::from_ref(&text)).await?;
        Ok(batch.remove(0))
    }

    /// Encode a batch of texts. All inputs must be non-empty.
    pub async fn encode_batch(&self, texts: &[&str]) -> EpidResult<Vec<Vec<f32>>> {
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EpidError::invalid_input(
                "cannot embed empty or whitespace-only text",
            ));
        }
        self.ensure_loaded().await?;

        let mut guard = self.loaded.lock().expect("embedding encoder lock poisoned");
        let loaded = guard.as_mut().expect("just ensured loaded");

        let encodings = loaded
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| EpidError::inference(format!("tokenizer failure: {e}")))?;

        let seq_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(MAX_TOKENS)
            .max(1);

        let batch_size = encodings.len();
        let mut input_ids = Array2::<i64>::zeros((batch_size, seq_len));
        let mut attention_mask = Array2::<i64>::zeros((batch_size, seq_len));
        let mut token_type_ids = Array2::<i64>::zeros((batch_size, seq_len));

        for (row, encoding) in encodings.iter().enumerate() {
            let ids = encoding.get_ids();
            let mask = encoding.get_attention_mask();
            for col in 0..seq_len.min(ids.len()) {
                input_ids[[row, col]] = ids[col] as i64;
                attention_mask[[row, col]] = mask[col] as i64;
            }
        }

        let input_ids_value = Value::from_array(input_ids)
            .map_err(|e| EpidError::inference(format!("building input_ids tensor: {e}")))?;
        let attention_mask_value = Value::from_array(attention_mask.clone())
            .map_err(|e| EpidError::inference(format!("building attention_mask tensor: {e}")))?;
        let token_type_ids_value = Value::from_array(token_type_ids.clone())
            .map_err(|e| EpidError::inference(format!("building token_type_ids tensor: {e}")))?;

        let outputs = loaded
            .session
            .run(ort::inputs![
                "input_ids" => input_ids_value,
                "attention_mask" => attention_mask_value,
                "token_type_ids" => token_type_ids_value,
            ])
            .map_err(|e| EpidError::inference(format!("inference run failed: {e}")))?;

        let (shape, data) = outputs[0]
            .try_extract_raw_tensor::<f32>()
            .map_err(|e| EpidError::inference(format!("extracting output tensor: {e}")))?;

        // Output is [batch, seq_len, hidden]; mean-pool over the sequence
        // dimension using the attention mask, then unit-normalize.
        let hidden = *shape.last().ok_or_else(|| EpidError::inference("empty output shape"))? as usize;
        if hidden != EMBEDDING_DIM {
            return Err(EpidError::inference(format!(
                "model produced {hidden}-dim output, expected {EMBEDDING_DIM}"
            )));
        }

        let mut results = Vec::with_capacity(batch_size);
        for row in 0..batch_size {
            let mut pooled = vec![0.0f32; hidden];
            let mut mask_sum = 0.0f32;
            for col in 0..seq_len {
                let m = attention_mask[[row, col]] as f32;
                if m == 0.0 {
                    continue;
                }
                let offset = (row * seq_len + col) * hidden;
                for h in 0..hidden {
                    pooled[h] += data[offset + h] * m;
                }
                mask_sum += m;
            }
            if mask_sum > 0.0 {
                for v in pooled.iter_mut() {
                    *v /= mask_sum;
                }
            }
            normalize_in_place(&mut pooled);
            results.push(pooled);
        }

        let _ = token_type_ids_value;
        Ok(results)
    }
}

impl Default for EmbeddingEncoder {
    fn default() -> Self {
        Self::new().expect("no home directory available for default model cache")
    }
}

fn normalize_in_place(v: &mut [f32]) {
    let norm = (v.iter().map(|x| x * x).sum::<f32>()).sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine similarity between two equal-length vectors, assumed
/// unit-normalized (dot product then suffices) but computed defensively.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let a = ArrayView1::from(a);
    let b = ArrayView1::from(b);
    let dot = a.dot(&b);
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Serialize an embedding to the fixed-size binary blob format stored in
/// the catalogue's `embedding` column: 384 little-endian f32s.
pub fn to_blob(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

/// Deserialize a catalogue `embedding` blob back into a vector.
pub fn from_blob(blob: &[u8]) -> EpidResult<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(EpidError::catalogue("embedding blob length is not a multiple of 4"));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trips_through_to_blob_and_from_blob() {
        let vector: Vec<f32> = (0..EMBEDDING_DIM).map(|i| i as f32 * 0.01).collect();
        let blob = to_blob(&vector);
        assert_eq!(blob.len(), EMBEDDING_DIM * 4);
        let back = from_blob(&blob).unwrap();
        assert_eq!(back, vector);
    }

    #[test]
    fn malformed_blob_length_is_a_catalogue_error() {
        let err = from_blob(&[0u8, 1, 2]).unwrap_err();
        assert!(matches!(err, EpidError::CatalogueError(_)));
    }

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v: Vec<f32> = vec![0.2, 0.4, 0.4, 0.2];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_similarity_of_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_of_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
    }

    #[test]
    fn normalize_in_place_produces_unit_vectors() {
        let mut v = vec![3.0f32, 4.0];
        normalize_in_place(&mut v);
        let norm = (v[0] * v[0] + v[1] * v[1]).sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
