use mcp_cloudfs_core::{SearchParams, SearchScope, SearchSort, SortDirection, Storage};
use mcp_cloudfs_proto::{Direction, SearchContentArgs, SearchSortKey, SearchType};
use serde_json::json;
use tracing::debug;

use crate::envelope::ToolOutcome;

pub(super) fn run<S: Storage>(storage: &S, args: SearchContentArgs) -> ToolOutcome {
    let params = to_params(&args);
    match storage.search(&params) {
        Ok(found) => {
            debug!(
                query = ?params.query,
                total = found.total_count,
                returned = found.entries.len(),
                "search finished"
            );
            ToolOutcome::structured(json!({
                "results": found.entries,
                "totalResults": found.total_count,
                "returned": found.entries.len(),
                "query": params.query,
            }))
        }
        Err(err) => ToolOutcome::failure(err.to_string()),
    }
}

fn to_params(args: &SearchContentArgs) -> SearchParams {
    SearchParams {
        query: args
            .query
            .as_deref()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_string),
        scope: match args.kind {
            SearchType::All => SearchScope::All,
            SearchType::File => SearchScope::Files,
            SearchType::Folder => SearchScope::Folders,
        },
        extensions: args.extensions.clone(),
        ancestor_paths: args.ancestor_paths.clone(),
        include_content: args.include_content,
        include_trashed: args.include_trashed,
        limit: args.limit as usize,
        sort_by: match args.sort_by {
            SearchSortKey::Relevance => SearchSort::Relevance,
            SearchSortKey::ModifiedAt => SearchSort::ModifiedAt,
        },
        direction: match args.direction {
            Direction::Asc => SortDirection::Asc,
            Direction::Desc => SortDirection::Desc,
        },
    }
}
