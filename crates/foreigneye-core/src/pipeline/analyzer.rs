//! Extraction adapter over a chat model
//!
//! The model is unreliable: it may time out, refuse, or wrap its JSON in
//! prose. Everything it returns goes through the tolerant parsers in
//! [`crate::domain::extraction`] before anything else sees it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::{LlmConfig, PipelineConfig};
use crate::domain::{ArticleAnalysis, CandidateRelation, relations_from_response};
use crate::error::{Error, Result};
use crate::llm::{ChatModel, CompletionOptions, Message};

/// Relation discovery runs cooler than summarization for steadier output
const RELATION_TEMPERATURE: f32 = 0.3;
const RELATION_MAX_TOKENS: usize = 4000;

/// Turns text into concepts and concept names into relations
#[async_trait]
pub trait ConceptAnalyzer: Send + Sync {
    async fn analyze_article(&self, text: &str) -> Result<ArticleAnalysis>;

    /// Needs at least two names.
    async fn analyze_relations(&self, concept_names: &[String]) -> Result<Vec<CandidateRelation>>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerSettings {
    pub min_article_chars: usize,
    pub max_prompt_chars: usize,
    pub max_concepts: usize,
    pub article_options: CompletionOptions,
    pub relation_options: CompletionOptions,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self::from_config(&LlmConfig::default(), &PipelineConfig::default())
    }
}

impl AnalyzerSettings {
    pub fn from_config(llm: &LlmConfig, pipeline: &PipelineConfig) -> Self {
        Self {
            min_article_chars: pipeline.min_article_chars,
            max_prompt_chars: pipeline.max_prompt_chars,
            max_concepts: pipeline.max_concepts_per_article,
            article_options: CompletionOptions::new(llm.temperature, llm.max_tokens),
            relation_options: CompletionOptions::new(RELATION_TEMPERATURE, RELATION_MAX_TOKENS),
        }
    }
}

pub struct LlmConceptAnalyzer {
    model: Arc<dyn ChatModel>,
    settings: AnalyzerSettings,
}

impl LlmConceptAnalyzer {
    pub fn new(model: Arc<dyn ChatModel>, settings: AnalyzerSettings) -> Self {
        Self { model, settings }
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    async fn ask(&self, prompt: String, options: CompletionOptions) -> Result<String> {
        let response = self
            .model
            .complete(vec![Message::user(prompt)], options)
            .await
            .map_err(|e| Error::ExtractionFailed(format!("Model call failed: {}", e)))?;

        let content = response.content.trim().to_string();
        if content.is_empty() {
            return Err(Error::ExtractionFailed("Empty model response".to_string()));
        }
        debug!(model = %response.model, chars = content.len(), "Received model response");
        Ok(content)
    }
}

#[async_trait]
impl ConceptAnalyzer for LlmConceptAnalyzer {
    async fn analyze_article(&self, text: &str) -> Result<ArticleAnalysis> {
        let text = text.trim();
        let length = text.chars().count();
        if length < self.settings.min_article_chars {
            return Err(Error::ExtractionFailed(format!(
                "Article text too short ({} chars, need {})",
                length, self.settings.min_article_chars
            )));
        }

        let excerpt: String = text.chars().take(self.settings.max_prompt_chars).collect();
        info!(model = self.model.model_name(), chars = length, "Analyzing article");

        let content = self
            .ask(article_prompt(&excerpt), self.settings.article_options)
            .await?;
        let analysis = ArticleAnalysis::from_response(&content, self.settings.max_concepts)?;

        info!(concepts = analysis.concept_names.len(), "Article analysis complete");
        Ok(analysis)
    }

    async fn analyze_relations(&self, concept_names: &[String]) -> Result<Vec<CandidateRelation>> {
        if concept_names.len() < 2 {
            return Err(Error::ExtractionFailed(format!(
                "Need at least 2 concepts to analyze relations (got {})",
                concept_names.len()
            )));
        }

        info!(concepts = concept_names.len(), "Analyzing concept relations");
        let content = self
            .ask(relation_prompt(concept_names)?, self.settings.relation_options)
            .await?;

        let relations = relations_from_response(&content).inspect_err(|e| {
            warn!(error = %e, "Relation analysis produced nothing usable");
        })?;
        info!(relations = relations.len(), "Relation analysis complete");
        Ok(relations)
    }
}

fn article_prompt(excerpt: &str) -> String {
    format!(
        r#"You are 'TechExplained', an expert technology scout.
Analyse the news article below and return ONLY a valid JSON object. No commentary, markdown, or extra text.

Tasks:
1. Translate the article title into natural Korean (title_ko).
2. Write a detailed Korean summary of 3-5 sentences covering the key developments, the people and companies involved, and the impact (summary_ko).
3. List up to five distinct technology concepts explicitly mentioned in the article, using their canonical names (prefer English terms). Do not invent concepts. Output them as the array "concept_names".

Article text:
{excerpt}

Return JSON exactly in this shape:
{{
  "title_ko": "한국어 제목",
  "summary_ko": "한국어 요약",
  "concept_names": ["Concept 1", "Concept 2"]
}}

Rules:
- Respond with JSON only.
- If fewer than five concepts are explicitly mentioned, return only those.
- Remove duplicates and keep the order in which they appear in the article.
"#
    )
}

fn relation_prompt(concept_names: &[String]) -> Result<String> {
    let concepts = serde_json::to_string(concept_names)
        .map_err(|e| Error::Other(format!("Failed to encode concept list: {}", e)))?;

    Ok(format!(
        r#"You are a knowledge graph expert. Given a list of technology concepts, find all valid pairwise relationships between them.

For each meaningful pair, choose one relation type:
- "IS_A_TYPE_OF": A is a specific type or subcategory of B
- "USED_IN": A is used in or applied within B
- "RELATED_TO": A and B are semantically related but fit no other category
- "ENABLES": A enables or makes B possible
- "PART_OF": A is a component or part of B

Only include clearly valid relationships. If A→B exists, do not add B→A unless the type differs.

Concept list:
{concepts}

Return ONLY a valid JSON object in this exact shape (no markdown, no commentary):
{{
  "relations": [
    {{"from": "Concept A", "to": "Concept B", "relation_type": "IS_A_TYPE_OF"}}
  ]
}}

Rules:
- Use exact concept names from the list.
- relation_type must be one of: IS_A_TYPE_OF, USED_IN, RELATED_TO, ENABLES, PART_OF
- Only include high-confidence relationships.
"#
    ))
}
