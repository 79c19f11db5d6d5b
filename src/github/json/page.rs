use serde::Deserialize;
use serde::Serialize;

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Custom wrapper for a GraphQL connection (a paginated collection).
pub struct Page<T> {
    pub total_count: Option<u64>,
    #[serde(default)]
    pub nodes: Vec<T>,
    pub page_info: PageInfo,
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>, // only meaningful while has_next_page is true
}
