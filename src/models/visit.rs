use serde::{Deserialize, Serialize};

use super::PoiId;

/// One entry of the historical visit log
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VisitRecord {
    pub user_id: String,
    pub seq_id: i64,
    pub poi_id: PoiId,
    /// Unix timestamp in seconds
    pub timestamp: i64,
}

impl VisitRecord {
    pub fn new(user_id: impl Into<String>, seq_id: i64, poi_id: PoiId, timestamp: i64) -> Self {
        Self {
            user_id: user_id.into(),
            seq_id,
            poi_id,
            timestamp,
        }
    }
}

/// Raw visit log row, as found in `userVisits-<city>.csv`
///
/// Extra columns (`photoID`, `poiTheme`, `poiFreq`) are ignored.
#[derive(Debug, Deserialize)]
pub struct VisitRow {
    #[serde(rename = "userID")]
    pub user_id: String,
    #[serde(rename = "dateTaken")]
    pub date_taken: i64,
    #[serde(rename = "poiID")]
    pub poi_id: PoiId,
    #[serde(rename = "seqID")]
    pub seq_id: i64,
}

impl From<VisitRow> for VisitRecord {
    fn from(row: VisitRow) -> Self {
        Self {
            user_id: row.user_id,
            seq_id: row.seq_id,
            poi_id: row.poi_id,
            timestamp: row.date_taken,
        }
    }
}
