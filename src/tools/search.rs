//! Module search
//!
//! `search <query>` with a budget that grows with the query's complexity and
//! client-side pagination of the module table.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ToolContext, ToolOutput};
use crate::error::{Error, Result};
use crate::models::{Command, StructuredData};

/// Largest page a caller may ask for
pub const MAX_PAGE_SIZE: usize = 50;
/// Ceiling on the complexity-derived search budget
const MAX_SEARCH_BUDGET: Duration = Duration::from_secs(120);
/// Extra seconds granted per unit of query complexity
const SECS_PER_FACTOR: f64 = 15.0;

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    25
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

/// One row of the module table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSummary {
    pub index: Option<u32>,
    pub name: String,
    /// First path segment of the name, e.g. `exploit`
    pub module_type: String,
    pub disclosure_date: Option<String>,
    pub rank: String,
    pub check: Option<bool>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchPage {
    pub query: String,
    pub modules: Vec<ModuleSummary>,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
    pub total_count: usize,
    pub has_next: bool,
    pub has_previous: bool,
}

/// Complexity score of a search query
pub fn query_complexity(query: &str, limit: usize) -> f64 {
    let mut factors = 0.0;
    if query.contains("platform:") {
        factors += 1.0;
    }
    if query.contains("type:") {
        factors += 0.5;
    }
    if limit > 100 {
        factors += 1.0;
    }
    let criteria = query.matches(':').count() + query.matches("AND").count() + query.matches("OR").count();
    factors + criteria as f64 * 0.3
}

/// Budget for a search, or `None` when the query is simple enough for the
/// category's adaptive budget
pub fn search_timeout(query: &str, limit: usize, base: Duration) -> Option<Duration> {
    let factors = query_complexity(query, limit);
    if factors <= 0.0 {
        return None;
    }
    let budget = base + Duration::from_secs_f64(factors * SECS_PER_FACTOR);
    Some(budget.min(MAX_SEARCH_BUDGET))
}

/// Module rows of a search result table
pub fn parse_modules(data: &StructuredData) -> Vec<ModuleSummary> {
    data.table_records()
        .into_iter()
        .filter_map(|record| {
            let field = |name: &str| {
                record
                    .iter()
                    .find(|(header, _)| header.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value.trim())
                    .filter(|value| !value.is_empty())
            };

            let name = field("Name")?;
            // Target sub-rows are indented under their module
            if name.starts_with("\\_") || name.starts_with('_') {
                return None;
            }

            Some(ModuleSummary {
                index: field("#").and_then(|i| i.parse().ok()),
                name: name.to_string(),
                module_type: name.split('/').next().unwrap_or(name).to_string(),
                disclosure_date: field("Disclosure Date").map(str::to_string),
                rank: field("Rank").unwrap_or("normal").to_string(),
                check: field("Check").map(|c| c.eq_ignore_ascii_case("yes")),
                description: field("Description").unwrap_or_default().to_string(),
            })
        })
        .collect()
}

pub async fn search_modules(
    ctx: &ToolContext,
    request: SearchRequest,
) -> Result<ToolOutput<SearchPage>> {
    ctx.admit()?;
    if request.query.trim().is_empty() {
        return Err(Error::InvalidParameter {
            name: "query".to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    if request.page == 0 {
        return Err(Error::InvalidParameter {
            name: "page".to_string(),
            reason: "pages start at 1".to_string(),
        });
    }
    let page_size = request.page_size.clamp(1, MAX_PAGE_SIZE);

    let text = ctx.command_text(&format!("search {}", request.query.trim()))?;
    let mut command = Command::query(text);
    if let Some(budget) = search_timeout(&request.query, page_size, ctx.query_base()) {
        debug!(query = %request.query, budget_secs = budget.as_secs_f64(), "Search budget raised");
        command = command.with_timeout(budget);
    }

    let result = ctx.submit(command).await?;
    if !result.is_success() {
        return Ok(ToolOutput::from_result(&result, None, ctx.page_size()));
    }

    let modules = result.structured_data().map(parse_modules).unwrap_or_default();
    let total_count = modules.len();
    let total_pages = total_count.div_ceil(page_size);
    let start = (request.page - 1) * page_size;
    let page_modules = modules.into_iter().skip(start).take(page_size).collect();

    let page = SearchPage {
        query: request.query,
        modules: page_modules,
        page: request.page,
        page_size,
        total_pages,
        total_count,
        has_next: request.page < total_pages,
        has_previous: request.page > 1,
    };
    Ok(ToolOutput::from_result(&result, Some(page), ctx.page_size()))
}
