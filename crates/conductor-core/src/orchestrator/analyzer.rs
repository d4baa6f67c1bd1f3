//! Query analysis

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capabilities::{CapabilityCatalog, KeywordCategorizer, KeywordRule};
use crate::completion::{generate_typed, CompletionRequest, CompletionService};
use crate::logging::{Logger, NoOpLogger};
use crate::log_info;
use super::error::{OrchestratorError, OrchestratorResult};

/// Schema name of the analysis object
pub const ANALYSIS_SCHEMA: &str = "query_analysis";

/// How much work a query looks like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Simple,
    Medium,
    Complex,
}

/// Something named in the query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub value: Value,
    #[serde(default)]
    pub confidence: f64,
}

/// Classification of a query against the capability catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QueryAnalysis {
    /// What the user wants, in a few words
    pub intent: String,
    #[serde(default)]
    pub entities: Vec<Entity>,
    /// Capability categories needed to answer
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub complexity: Complexity,
    /// ISO 639-1 code of the query language
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

/// Classifies queries with a structured completion
pub struct QueryAnalyzer {
    completion: Arc<dyn CompletionService>,
    categorizer: KeywordCategorizer,
    logger: Arc<dyn Logger>,
}

impl QueryAnalyzer {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self {
            completion,
            categorizer: KeywordCategorizer::new(),
            logger: Arc::new(NoOpLogger),
        }
    }

    /// Set the logger
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Use custom keyword rules for `quick_match`
    pub fn with_categorizer(mut self, categorizer: KeywordCategorizer) -> Self {
        self.categorizer = categorizer;
        self
    }

    fn system_prompt(catalog: &CapabilityCatalog) -> String {
        let mut prompt = String::from(
            "You analyze user requests for an assistant that can call tools.\n\
             Identify the intent, the entities mentioned (type, value, confidence 0-1), \
             which capability categories are needed, how complex the request is \
             (simple, medium or complex) and the language of the request.\n\
             Only list categories from the available set.\n\nAvailable categories:\n",
        );
        for category in catalog.categories() {
            let names: Vec<&str> = catalog
                .by_category(&category)
                .into_iter()
                .filter(|c| c.category == category)
                .map(|c| c.name.as_str())
                .collect();
            prompt.push_str(&format!("- {}: {}\n", category, names.join(", ")));
        }
        prompt
    }

    /// Analyze `query` against `catalog`
    pub async fn analyze(&self, query: &str, catalog: &CapabilityCatalog) -> OrchestratorResult<QueryAnalysis> {
        let request = CompletionRequest::prompt(query).with_system(Self::system_prompt(catalog));
        let mut analysis: QueryAnalysis = generate_typed(self.completion.as_ref(), ANALYSIS_SCHEMA, request)
            .await
            .map_err(OrchestratorError::Analysis)?;

        let mut required: Vec<String> = Vec::new();
        for category in analysis.required_capabilities.drain(..) {
            let category = category.trim().to_lowercase();
            if !category.is_empty() && !required.contains(&category) {
                required.push(category);
            }
        }
        analysis.required_capabilities = required;

        log_info!(
            self.logger,
            "[QueryAnalyzer] intent='{}' complexity={:?} requires {:?}",
            analysis.intent, analysis.complexity, analysis.required_capabilities
        );
        Ok(analysis)
    }

    /// Keyword shortcut: categories from `available` the query mentions
    ///
    /// A category matches when the query names it directly or hits one of
    /// its keyword rules. Result keeps the order of `available`.
    pub fn quick_match(&self, query: &str, available: &[String]) -> Vec<String> {
        available
            .iter()
            .filter(|category| {
                KeywordRule::new(category.as_str(), &[category.to_lowercase().as_str()]).matches(query)
                    || self
                        .categorizer
                        .rules()
                        .iter()
                        .filter(|rule| rule.category == **category)
                        .any(|rule| rule.matches(query))
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::MockCompletionService;
    use serde_json::json;

    fn categories(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_quick_match_only_returns_available() {
        let analyzer = QueryAnalyzer::new(Arc::new(MockCompletionService::new()));
        let available = categories(&["chart", "analytics", "acme"]);

        assert_eq!(
            analyzer.quick_match("Plot last week's traffic as a chart", &available),
            categories(&["chart", "analytics"])
        );
        assert_eq!(analyzer.quick_match("ask acme about orders", &available), categories(&["acme"]));
        // google-ads would match, but it is not available
        assert!(analyzer.quick_match("how are my google ads campaigns doing", &available).is_empty());
    }

    #[tokio::test]
    async fn test_analyze_normalizes_categories() {
        let mock = Arc::new(MockCompletionService::new().with_object(
            ANALYSIS_SCHEMA,
            json!({
                "intent": "campaign performance",
                "entities": [{ "type": "period", "value": "last week", "confidence": 0.9 }],
                "requiredCapabilities": ["Google-Ads", "google-ads ", "chart"],
                "complexity": "medium"
            }),
        ));
        let analyzer = QueryAnalyzer::new(mock.clone());

        let analysis = analyzer.analyze("how did my ads do", &CapabilityCatalog::default()).await.unwrap();
        assert_eq!(analysis.required_capabilities, categories(&["google-ads", "chart"]));
        assert_eq!(analysis.complexity, Complexity::Medium);
        assert_eq!(analysis.language, "en");
        assert_eq!(analysis.entities[0].entity_type, "period");

        let requests = mock.requests();
        assert_eq!(requests[0].schema.as_deref(), Some(ANALYSIS_SCHEMA));
        assert_eq!(requests[0].prompt, "how did my ads do");
    }

    #[tokio::test]
    async fn test_analyze_failure_is_an_error() {
        let analyzer = QueryAnalyzer::new(Arc::new(MockCompletionService::new()));
        let result = analyzer.analyze("anything", &CapabilityCatalog::default()).await;
        assert!(matches!(result, Err(OrchestratorError::Analysis(_))));
    }
}
