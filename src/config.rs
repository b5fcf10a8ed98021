//! TOML configuration.
//!
//! Every section except `[db]` is optional and falls back to the defaults
//! below. [`load_config`] parses and validates in one step, so invalid
//! tuning values are rejected before any command touches the index.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use memdex_core::search::SearchParams;
use memdex_core::sync::SyncOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub classify: ClassifyConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_roots")]
    pub roots: Vec<PathBuf>,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_roots() -> Vec<PathBuf> {
    vec![PathBuf::from("./memory"), PathBuf::from("./session-transcripts")]
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_target_tokens")]
    pub target_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            target_tokens: default_target_tokens(),
            overlap_tokens: default_overlap_tokens(),
        }
    }
}

fn default_target_tokens() -> usize {
    400
}
fn default_overlap_tokens() -> usize {
    80
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_vector_weight")]
    pub vector_weight: f64,
    #[serde(default = "default_text_weight")]
    pub text_weight: f64,
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_snippet_chars")]
    pub snippet_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            vector_weight: default_vector_weight(),
            text_weight: default_text_weight(),
            candidate_multiplier: default_candidate_multiplier(),
            min_score: default_min_score(),
            max_results: default_max_results(),
            snippet_chars: default_snippet_chars(),
        }
    }
}

fn default_vector_weight() -> f64 {
    0.7
}
fn default_text_weight() -> f64 {
    0.3
}
fn default_candidate_multiplier() -> usize {
    4
}
fn default_min_score() -> f64 {
    0.35
}
fn default_max_results() -> usize {
    6
}
fn default_snippet_chars() -> usize {
    700
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL, used by the `ollama` provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifyConfig {
    #[serde(default = "default_label")]
    pub default_label: String,
    #[serde(default = "default_rules")]
    pub rules: Vec<ClassifyRule>,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            default_label: default_label(),
            rules: default_rules(),
        }
    }
}

/// Paths matching any of `globs` get `label`. First matching rule wins.
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifyRule {
    pub label: String,
    pub globs: Vec<String>,
}

fn default_label() -> String {
    "memory".to_string()
}
fn default_rules() -> Vec<ClassifyRule> {
    vec![ClassifyRule {
        label: "sessions".to_string(),
        globs: vec!["**/session-transcripts/**".to_string()],
    }]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    pub fn search_params(&self) -> SearchParams {
        SearchParams {
            vector_weight: self.retrieval.vector_weight,
            text_weight: self.retrieval.text_weight,
            candidate_multiplier: self.retrieval.candidate_multiplier,
            min_score: self.retrieval.min_score,
            max_results: self.retrieval.max_results,
            snippet_chars: self.retrieval.snippet_chars,
        }
    }

    pub fn sync_options(&self, full: bool) -> SyncOptions {
        SyncOptions {
            target_tokens: self.chunking.target_tokens,
            overlap_tokens: self.chunking.overlap_tokens,
            batch_size: self.embedding.batch_size,
            full,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate a config document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    // Validate chunking
    if config.chunking.target_tokens == 0 {
        bail!("chunking.target_tokens must be > 0");
    }
    if config.chunking.overlap_tokens >= config.chunking.target_tokens {
        bail!("chunking.overlap_tokens must be < chunking.target_tokens");
    }

    // Validate retrieval
    let r = &config.retrieval;
    if r.vector_weight < 0.0 || r.text_weight < 0.0 {
        bail!("retrieval weights must be >= 0");
    }
    if r.vector_weight + r.text_weight <= 0.0 {
        bail!("retrieval.vector_weight and retrieval.text_weight must not both be 0");
    }
    if r.candidate_multiplier < 1 {
        bail!("retrieval.candidate_multiplier must be >= 1");
    }
    if r.max_results < 1 {
        bail!("retrieval.max_results must be >= 1");
    }
    if r.snippet_chars < 1 {
        bail!("retrieval.snippet_chars must be >= 1");
    }

    // Validate embedding
    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "ollama" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if config.embedding.is_enabled() {
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "[db]\npath = \"./data/memdex.sqlite\"\n";

    #[test]
    fn minimal_config_uses_defaults() {
        let cfg = parse_config(MINIMAL).unwrap();
        assert_eq!(cfg.chunking.target_tokens, 400);
        assert_eq!(cfg.chunking.overlap_tokens, 80);
        assert_eq!(cfg.retrieval.max_results, 6);
        assert_eq!(cfg.retrieval.min_score, 0.35);
        assert_eq!(cfg.retrieval.snippet_chars, 700);
        assert_eq!(cfg.embedding.provider, "disabled");
        assert_eq!(cfg.classify.default_label, "memory");
        assert_eq!(cfg.classify.rules[0].label, "sessions");
        assert_eq!(cfg.server.bind, "127.0.0.1:7341");
        assert_eq!(cfg.documents.include_globs, vec!["**/*.md"]);
    }

    #[test]
    fn search_params_follow_retrieval_section() {
        let cfg = parse_config(&format!(
            "{}[retrieval]\nmax_results = 3\nmin_score = 0.1\n",
            MINIMAL
        ))
        .unwrap();
        let p = cfg.search_params();
        assert_eq!(p.max_results, 3);
        assert_eq!(p.min_score, 0.1);
        assert_eq!(p.vector_weight, 0.7);
    }

    #[test]
    fn rejects_overlap_not_below_target() {
        let err = parse_config(&format!(
            "{}[chunking]\ntarget_tokens = 50\noverlap_tokens = 50\n",
            MINIMAL
        ))
        .unwrap_err();
        assert!(err.to_string().contains("overlap_tokens"));
    }

    #[test]
    fn rejects_zero_weights() {
        let err = parse_config(&format!(
            "{}[retrieval]\nvector_weight = 0.0\ntext_weight = 0.0\n",
            MINIMAL
        ))
        .unwrap_err();
        assert!(err.to_string().contains("must not both be 0"));
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = parse_config(&format!("{}[embedding]\nprovider = \"magic\"\n", MINIMAL))
            .unwrap_err();
        assert!(err.to_string().contains("Unknown embedding provider"));
    }

    #[test]
    fn enabled_provider_needs_model_and_dims() {
        let err = parse_config(&format!(
            "{}[embedding]\nprovider = \"openai\"\ndims = 1536\n",
            MINIMAL
        ))
        .unwrap_err();
        assert!(err.to_string().contains("embedding.model"));

        let cfg = parse_config(&format!(
            "{}[embedding]\nprovider = \"ollama\"\nmodel = \"nomic-embed-text\"\ndims = 768\n",
            MINIMAL
        ))
        .unwrap();
        assert!(cfg.embedding.is_enabled());
    }

    #[test]
    fn classify_rules_parse() {
        let cfg = parse_config(&format!(
            "{}[classify]\ndefault_label = \"notes\"\n[[classify.rules]]\nlabel = \"daily\"\nglobs = [\"**/daily/**\"]\n",
            MINIMAL
        ))
        .unwrap();
        assert_eq!(cfg.classify.default_label, "notes");
        assert_eq!(cfg.classify.rules.len(), 1);
        assert_eq!(cfg.classify.rules[0].label, "daily");
    }
}
