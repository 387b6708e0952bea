use serde::{Deserialize, Serialize};

/// Monthly query count. The API reports low-traffic keywords as the string
/// `"< 10"` instead of a number.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum QueryCount {
    Number(u64),
    Text(String),
}

/// Value reported for the `"< 10"` bucket.
pub const LOW_VOLUME_CEILING: u64 = 10;

impl QueryCount {
    pub fn value(&self) -> Option<u64> {
        match self {
            QueryCount::Number(n) => Some(*n),
            QueryCount::Text(text) => {
                let trimmed = text.trim();
                if trimmed.starts_with('<') {
                    return Some(LOW_VOLUME_CEILING);
                }
                trimmed.replace(',', "").parse().ok()
            }
        }
    }
}

/// One related-keyword row from the keyword tool.
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordStat {
    #[serde(rename = "relKeyword")]
    pub rel_keyword: String,
    #[serde(rename = "monthlyPcQcCnt")]
    pub monthly_pc_qc_cnt: Option<QueryCount>,
    #[serde(rename = "monthlyMobileQcCnt")]
    pub monthly_mobile_qc_cnt: Option<QueryCount>,
}

/// Wrapper for keyword tool responses.
#[derive(Debug, Clone, Deserialize)]
pub struct KeywordToolResponse {
    #[serde(rename = "keywordList", default)]
    pub keyword_list: Vec<KeywordStat>,
}

/// Monthly search volume for one keyword, split by device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KeywordVolume {
    pub total: Option<u64>,
    pub pc: Option<u64>,
    pub mobile: Option<u64>,
}

impl From<&KeywordStat> for KeywordVolume {
    fn from(stat: &KeywordStat) -> Self {
        let pc = stat.monthly_pc_qc_cnt.as_ref().and_then(QueryCount::value);
        let mobile = stat.monthly_mobile_qc_cnt.as_ref().and_then(QueryCount::value);
        let total = match (pc, mobile) {
            (Some(pc), Some(mobile)) => Some(pc + mobile),
            (Some(only), None) | (None, Some(only)) => Some(only),
            (None, None) => None,
        };
        Self { total, pc, mobile }
    }
}
