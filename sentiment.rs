use crate::config::DetectionConfig;
use crate::error::{Error, Result};
use crate::models::Sentiment;
use crate::onnx::{self, OrtRuntimeConfig};
use ndarray::{Array2, Axis, Ix2};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokenizers::{Tokenizer, TruncationParams};

const MAX_TOKENS: usize = 128;

/// `<model>.tokenizer.json`, or a `tokenizer.json` beside the model.
fn tokenizer_path(model_path: &Path) -> Option<PathBuf> {
    if let Some(sidecar) = onnx::resolve_sidecar(model_path, "tokenizer.json") {
        return Some(sidecar);
    }
    let sibling = model_path.parent()?.join("tokenizer.json");
    sibling.exists().then_some(sibling)
}

pub fn load_tokenizer(path: &Path) -> Result<Tokenizer> {
    let tokenizer = Tokenizer::from_file(path).map_err(|e| {
        Error::Init(format!("Failed to load tokenizer {}: {e}", path.display()))
    })?;
    limit_length(tokenizer)
}

fn limit_length(mut tokenizer: Tokenizer) -> Result<Tokenizer> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: MAX_TOKENS,
            ..Default::default()
        }))
        .map_err(|e| Error::Init(format!("Invalid truncation settings: {e}")))?;
    tokenizer.with_padding(None);
    Ok(tokenizer)
}

/// Token ids and attention mask for `text`, special tokens included.
pub fn encode(tokenizer: &Tokenizer, text: &str) -> Result<(Vec<i64>, Vec<i64>)> {
    let encoding = tokenizer
        .encode(text, true)
        .map_err(|e| Error::Inference(format!("Tokenization failed: {e}")))?;
    let ids = encoding.get_ids().iter().map(|&id| i64::from(id)).collect();
    let mask = encoding
        .get_attention_mask()
        .iter()
        .map(|&m| i64::from(m))
        .collect();
    Ok((ids, mask))
}

/// Binary sentiment classifier over free text. Its output is recorded on the
/// incident but does not influence the alert level.
pub struct SentimentAnalyzer {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    labels: Vec<String>,
}

impl SentimentAnalyzer {
    pub fn load(model_path: &Path, config: &DetectionConfig) -> Result<Self> {
        let tokenizer_path = tokenizer_path(model_path).ok_or_else(|| {
            Error::Init(format!("No tokenizer.json for {}", model_path.display()))
        })?;
        let tokenizer = load_tokenizer(&tokenizer_path)?;
        let labels = match onnx::resolve_sidecar(model_path, "labels.txt") {
            Some(path) => onnx::load_lines(&path)?
                .into_iter()
                .filter(|l| !l.is_empty())
                .collect(),
            None => vec!["NEGATIVE".to_string(), "POSITIVE".to_string()],
        };
        let (session, provider) = onnx::build_session(
            model_path,
            OrtRuntimeConfig {
                provider: config.provider,
                device_id: config.device_id,
            },
        )?;
        log::info!(
            "Loaded sentiment model {} on {}",
            model_path.display(),
            provider.label()
        );
        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            labels,
        })
    }

    pub fn analyze(&self, text: &str) -> Result<Sentiment> {
        onnx::safe_run(|| self.run(text))
    }

    fn run(&self, text: &str) -> Result<Sentiment> {
        let (ids, mask) = encode(&self.tokenizer, text)?;
        let len = ids.len();
        let input_ids = Array2::from_shape_vec((1, len), ids)
            .map_err(|e| Error::Inference(format!("Invalid token tensor: {e}")))?;
        let attention_mask = Array2::from_shape_vec((1, len), mask)
            .map_err(|e| Error::Inference(format!("Invalid mask tensor: {e}")))?;
        let ids_tensor = TensorRef::from_array_view(&input_ids)
            .map_err(|e| Error::Inference(format!("{e}")))?;
        let mask_tensor = TensorRef::from_array_view(&attention_mask)
            .map_err(|e| Error::Inference(format!("{e}")))?;

        let mut session = self.session.lock().map_err(|_| Error::Lock)?;
        let outputs = session
            .run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor
            ])
            .map_err(|e| Error::Inference(format!("Failed to run sentiment model: {e}")))?;
        let logits = outputs["logits"]
            .try_extract_array::<f32>()
            .map_err(|e| Error::Inference(format!("{e}")))?
            .into_dimensionality::<Ix2>()
            .map_err(|e| Error::Inference(format!("Unexpected logits shape: {e}")))?;
        let row: Vec<f32> = logits.index_axis(Axis(0), 0).iter().copied().collect();
        top_label(&row, &self.labels)
            .ok_or_else(|| Error::Inference("Sentiment model returned no logits".into()))
    }
}

fn top_label(logits: &[f32], labels: &[String]) -> Option<Sentiment> {
    let max_val = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = logits.iter().map(|v| (v - max_val).exp()).sum();
    let (idx, best) = logits
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))?;
    let label = labels
        .get(idx)
        .cloned()
        .unwrap_or_else(|| format!("LABEL_{idx}"));
    Some(Sentiment {
        label,
        score: (best - max_val).exp() / sum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokenizers::models::wordpiece::WordPiece;
    use tokenizers::normalizers::bert::BertNormalizer;
    use tokenizers::normalizers::NormalizerWrapper;
    use tokenizers::pre_tokenizers::bert::BertPreTokenizer;
    use tokenizers::pre_tokenizers::PreTokenizerWrapper;
    use tokenizers::processors::bert::BertProcessing;
    use tokenizers::processors::PostProcessorWrapper;

    const VOCAB: [&str; 13] = [
        "[PAD]", "[UNK]", "[CLS]", "[SEP]", "man", "with", "a", "knife", "!", "run", "##ning",
        "cafe", "naive",
    ];

    fn uncased_tokenizer() -> Tokenizer {
        let vocab: HashMap<String, u32> = VOCAB
            .iter()
            .enumerate()
            .map(|(idx, token)| (token.to_string(), idx as u32))
            .collect();
        let model = WordPiece::builder()
            .vocab(vocab)
            .unk_token("[UNK]".to_string())
            .build()
            .unwrap();
        let mut tokenizer = Tokenizer::new(model);
        tokenizer
            .with_normalizer(NormalizerWrapper::from(BertNormalizer::default()))
            .with_pre_tokenizer(PreTokenizerWrapper::from(BertPreTokenizer))
            .with_post_processor(PostProcessorWrapper::from(BertProcessing::new(
                ("[SEP]".to_string(), 3),
                ("[CLS]".to_string(), 2),
            )));
        limit_length(tokenizer).unwrap()
    }

    #[test]
    fn encodes_words_and_punctuation() {
        let (ids, mask) = encode(&uncased_tokenizer(), "Man with a KNIFE!").unwrap();
        assert_eq!(ids, vec![2, 4, 5, 6, 7, 8, 3]);
        assert_eq!(mask, vec![1; 7]);
    }

    #[test]
    fn splits_into_subwords_or_unknown() {
        let tok = uncased_tokenizer();
        assert_eq!(encode(&tok, "running").unwrap().0, vec![2, 9, 10, 3]);
        assert_eq!(encode(&tok, "machete").unwrap().0, vec![2, 1, 3]);
    }

    #[test]
    fn accents_are_stripped_before_lookup() {
        let (ids, _) = encode(&uncased_tokenizer(), "Café naïve").unwrap();
        assert_eq!(ids, vec![2, 11, 12, 3]);
    }

    #[test]
    fn long_text_is_truncated() {
        let text = "knife ".repeat(500);
        let (ids, mask) = encode(&uncased_tokenizer(), &text).unwrap();
        assert_eq!(ids.len(), MAX_TOKENS);
        assert_eq!(mask.len(), MAX_TOKENS);
        assert_eq!(ids[0], 2);
        assert_eq!(*ids.last().unwrap(), 3);
    }

    #[test]
    fn tokenizer_sidecar_is_found_and_loaded() {
        let dir = std::env::temp_dir().join("marque_tokenizer_sidecar");
        std::fs::create_dir_all(&dir).unwrap();
        let model = dir.join("sentiment.onnx");
        let sidecar = dir.join("sentiment.tokenizer.json");
        uncased_tokenizer().save(&sidecar, false).unwrap();

        assert_eq!(tokenizer_path(&model), Some(sidecar.clone()));
        let loaded = load_tokenizer(&sidecar).unwrap();
        assert_eq!(encode(&loaded, "a knife").unwrap().0, vec![2, 6, 7, 3]);
    }

    #[test]
    fn unreadable_tokenizer_is_init_error() {
        let err = load_tokenizer(Path::new("does/not/exist/tokenizer.json")).unwrap_err();
        assert!(matches!(err, Error::Init(_)));
    }

    #[test]
    fn top_label_is_softmaxed() {
        let labels = vec!["NEGATIVE".to_string(), "POSITIVE".to_string()];
        let s = top_label(&[2.0, -1.0], &labels).unwrap();
        assert_eq!(s.label, "NEGATIVE");
        assert!((s.score - 0.9526).abs() < 1e-3);
        assert!(top_label(&[], &labels).is_none());
    }
}
