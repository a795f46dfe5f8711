//! Tool discovery, deduplication, and filtering pipeline.

use crate::error::Result;
use crate::registry::{SemanticFilter, ToolDescriptor, ToolRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use switchyard_abstraction::{AuthContext, ToolDeclaration};
use tracing::{debug, warn};

/// Default number of hits requested from the semantic filter.
const DEFAULT_TOP_K: usize = 10;

/// Result of one discovery run, immutable for the request lifetime.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Deduplicated, filtered tool definitions.
    pub tools: Vec<ToolDescriptor>,
    /// Tool name to originating source label.
    pub tool_server_map: HashMap<String, String>,
}

/// Discovery pipeline over a tool registry, with optional semantic narrowing.
pub struct ToolDiscovery {
    registry: Arc<dyn ToolRegistry>,
    filter: Option<Arc<dyn SemanticFilter>>,
    top_k: usize,
}

impl ToolDiscovery {
    /// Creates a pipeline over the given registry.
    pub fn new(registry: Arc<dyn ToolRegistry>) -> Self {
        Self { registry, filter: None, top_k: DEFAULT_TOP_K }
    }

    /// Attaches a semantic filter capability.
    #[must_use]
    pub fn with_filter(mut self, filter: Arc<dyn SemanticFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sets the number of hits requested from the semantic filter.
    #[must_use]
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Discovers, filters, and deduplicates the tools for one request.
    ///
    /// Registry fetch failures propagate as one aggregate error for the
    /// whole call; discovery is all-or-nothing per request.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry listing fails.
    pub async fn discover(
        &self,
        declared: &[ToolDeclaration],
        relevance_query: Option<&str>,
        _auth: &AuthContext,
    ) -> Result<Discovery> {
        // Callers may hand us nothing at all; that is an empty result, not
        // an error.
        if declared.is_empty() {
            return Ok(Discovery::default());
        }

        let sources = allowed_sources(declared);
        if sources.is_empty() {
            return Ok(Discovery::default());
        }

        let fetched = self.registry.list_tools(&sources).await?;
        debug!(count = fetched.len(), sources = ?sources, "fetched tool definitions");

        let filtered = apply_allow_list(fetched, declared);
        let discovery = deduplicate(filtered, &sources);

        let tools = match relevance_query {
            Some(query) if !query.is_empty() => {
                self.narrow(discovery.tools, query, &sources).await
            }
            _ => discovery.tools,
        };

        Ok(Discovery { tools, tool_server_map: discovery.tool_server_map })
    }

    /// Narrows the tool set via the semantic filter, keeping the unfiltered
    /// set when the filter misses or is unavailable. A filter miss must
    /// never strand the model with no tools.
    async fn narrow(
        &self,
        tools: Vec<ToolDescriptor>,
        query: &str,
        sources: &[String],
    ) -> Vec<ToolDescriptor> {
        let Some(filter) = &self.filter else {
            return tools;
        };

        let hits = match filter.query(query, sources, self.top_k).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "semantic filter failed, keeping unfiltered tool set");
                return tools;
            }
        };

        if hits.is_empty() {
            debug!("semantic filter returned no hits, keeping unfiltered tool set");
            return tools;
        }

        hits.iter()
            .filter_map(|name| tools.iter().find(|tool| &tool.name == name).cloned())
            .collect()
    }
}

/// Resolves the allowed source labels, preserving declaration order.
fn allowed_sources(declared: &[ToolDeclaration]) -> Vec<String> {
    let mut sources = Vec::new();
    for declaration in declared {
        if let Some(label) = &declaration.server_label {
            if !sources.contains(label) {
                sources.push(label.clone());
            }
        }
    }
    sources
}

/// Applies the union of explicit allow-lists; absence keeps everything.
fn apply_allow_list(
    tools: Vec<ToolDescriptor>,
    declared: &[ToolDeclaration],
) -> Vec<ToolDescriptor> {
    let allowed: Vec<&String> = declared
        .iter()
        .filter_map(|d| d.allowed_tools.as_ref())
        .flatten()
        .collect();

    if allowed.is_empty() {
        return tools;
    }

    tools
        .into_iter()
        .filter(|tool| allowed.iter().any(|name| **name == tool.name))
        .collect()
}

/// Deduplicates by name, first occurrence wins, building the name→source map.
///
/// With exactly one allowed source every tool maps to it directly; with
/// several, the source is derived from the `<source>-<toolname>` naming
/// convention, falling back to the first allowed source.
fn deduplicate(tools: Vec<ToolDescriptor>, sources: &[String]) -> Discovery {
    let mut deduped: Vec<ToolDescriptor> = Vec::new();
    let mut map = HashMap::new();

    for tool in tools {
        if map.contains_key(&tool.name) {
            debug!(tool = %tool.name, "dropping duplicate tool definition");
            continue;
        }
        map.insert(tool.name.clone(), attribute_source(&tool.name, sources));
        deduped.push(tool);
    }

    Discovery { tools: deduped, tool_server_map: map }
}

/// Attributes a tool name to its originating source label.
fn attribute_source(name: &str, sources: &[String]) -> String {
    if sources.len() == 1 {
        return sources[0].clone();
    }
    sources
        .iter()
        .find(|source| name.starts_with(&format!("{}-", source)))
        .or_else(|| sources.first())
        .cloned()
        .unwrap_or_default()
}
