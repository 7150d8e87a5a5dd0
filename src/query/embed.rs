//! YAML-driven query embeds. The schema keys are the contract with the UI:
//! `filters[{key,operator,value}], match_mode, result_type,
//! include_completed, limit, view{view_type, columns, sort{property,
//! direction}, kanban{group_by, card_fields, show_uncategorized}},
//! tabs[{name, ...}]`. A present `tabs` list entirely overrides the
//! top-level single-query fields.

use serde::{Deserialize, Serialize};

use super::{QueryEngine, QueryRequest, QueryResults};
use crate::storage::Storage;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryEmbed {
    #[serde(flatten)]
    pub query: QueryRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tabs: Option<Vec<TabSpec>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TabSpec {
    pub name: String,
    #[serde(flatten)]
    pub query: QueryRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct TabResults {
    pub name: String,
    pub results: QueryResults,
}

/// A failed parse or query comes back as an explicit error payload, never
/// as partial results.
#[derive(Debug, Serialize)]
pub struct EmbedResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryEmbed>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<QueryResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_results: Option<Vec<TabResults>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EmbedResponse {
    fn error(message: String) -> Self {
        Self {
            query: None,
            results: None,
            tab_results: None,
            error: Some(message),
        }
    }
}

pub fn execute_query_embed(storage: &Storage, yaml: &str) -> EmbedResponse {
    let embed: QueryEmbed = match serde_yaml::from_str(yaml) {
        Ok(embed) => embed,
        Err(e) => return EmbedResponse::error(format!("invalid query embed: {e}")),
    };

    let engine = QueryEngine::new(storage);

    // Tabs are evaluated independently; no state leaks between them.
    if let Some(tabs) = &embed.tabs {
        let mut tab_results = Vec::with_capacity(tabs.len());
        for tab in tabs {
            match engine.run(&tab.query) {
                Ok(results) => tab_results.push(TabResults {
                    name: tab.name.clone(),
                    results,
                }),
                Err(e) => return EmbedResponse::error(format!("tab {:?}: {e}", tab.name)),
            }
        }
        return EmbedResponse {
            query: Some(embed),
            results: None,
            tab_results: Some(tab_results),
            error: None,
        };
    }

    match engine.run(&embed.query) {
        Ok(results) => EmbedResponse {
            query: Some(embed),
            results: Some(results),
            tab_results: None,
            error: None,
        },
        Err(e) => EmbedResponse::error(e.to_string()),
    }
}
