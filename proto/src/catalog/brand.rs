use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::record::Record;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    pub id: Ulid,
    #[serde(default)]
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Record for Brand {
    type ID = Ulid;
    fn id(&self) -> &Self::ID {
        &self.id
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct BrandInput {
    pub name: String,
}

impl BrandInput {
    /// `None` when the name is blank.
    pub fn into_brand(self, id: Ulid, created_at: DateTime<Utc>) -> Option<Brand> {
        let name = self.name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Brand {
            id,
            name: name.to_string(),
            created_at,
        })
    }
}
