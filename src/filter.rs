use catalog_proto::record::Searchable;

/// Case-insensitive substring match against each text field of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    needle: String,
}

impl Predicate {
    /// `None` for a blank query, which means "no filter".
    pub fn parse(query: &str) -> Option<Self> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            None
        } else {
            Some(Self { needle })
        }
    }

    pub fn as_str(&self) -> &str {
        &self.needle
    }

    pub fn matches<T: Searchable>(&self, record: &T) -> bool {
        // fields are tested one at a time so a match never straddles two of them
        record
            .text_fields()
            .into_iter()
            .any(|field| field.to_lowercase().contains(&self.needle))
    }
}
