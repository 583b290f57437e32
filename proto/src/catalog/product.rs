use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::record::{Record, Searchable};

/// Shown in place of a missing product name.
pub const NO_NAME: &str = "no name";

fn no_name() -> String {
    NO_NAME.to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct Attribute {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct Measurement {
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub unit: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Ulid,
    #[serde(rename = "displayName", default = "no_name")]
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub model: String,
    #[serde(rename = "attributeList", default)]
    pub attributes: Vec<Attribute>,
    #[serde(rename = "measurementList", default)]
    pub measurements: Vec<Measurement>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            NO_NAME
        } else {
            &self.name
        }
    }
}

impl Record for Product {
    type ID = Ulid;
    fn id(&self) -> &Self::ID {
        &self.id
    }
}

impl Searchable for Product {
    fn text_fields(&self) -> Vec<&str> {
        vec![
            self.display_name(),
            self.brand.as_str(),
            self.category.as_str(),
            self.model.as_str(),
        ]
    }

    fn category(&self) -> Option<&str> {
        Some(self.category.as_str()).filter(|c| !c.is_empty())
    }

    fn brand(&self) -> Option<&str> {
        Some(self.brand.as_str()).filter(|b| !b.is_empty())
    }
}

/// Body of a create request. Anything left out becomes empty.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ProductInput {
    #[serde(alias = "displayName")]
    pub name: String,
    pub brand: String,
    pub category: String,
    pub model: String,
    #[serde(alias = "attributeList")]
    pub attributes: Vec<Attribute>,
    #[serde(alias = "measurementList")]
    pub measurements: Vec<Measurement>,
}

impl ProductInput {
    pub fn into_product(self, id: Ulid, created_at: DateTime<Utc>) -> Product {
        let name = match self.name.trim() {
            "" => no_name(),
            trimmed => trimmed.to_string(),
        };
        Product {
            id,
            name,
            brand: self.brand.trim().to_string(),
            category: self.category.trim().to_string(),
            model: self.model.trim().to_string(),
            attributes: self.attributes,
            measurements: self.measurements,
            created_at,
        }
    }
}

/// Body of an update request; only the fields present are replaced.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct ProductPatch {
    #[serde(alias = "displayName")]
    pub name: Option<String>,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub model: Option<String>,
    #[serde(alias = "attributeList")]
    pub attributes: Option<Vec<Attribute>>,
    #[serde(alias = "measurementList")]
    pub measurements: Option<Vec<Measurement>>,
}

impl ProductPatch {
    pub fn apply(self, product: &mut Product) {
        if let Some(name) = self.name {
            product.name = match name.trim() {
                "" => no_name(),
                trimmed => trimmed.to_string(),
            };
        }
        if let Some(brand) = self.brand {
            product.brand = brand.trim().to_string();
        }
        if let Some(category) = self.category {
            product.category = category.trim().to_string();
        }
        if let Some(model) = self.model {
            product.model = model.trim().to_string();
        }
        if let Some(attributes) = self.attributes {
            product.attributes = attributes;
        }
        if let Some(measurements) = self.measurements {
            product.measurements = measurements;
        }
    }
}
