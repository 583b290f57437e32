use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A document stored in a backing collection.
///
/// The id doubles as the ordering key: collections keep records sorted by it,
/// so it must grow with creation time.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    type ID: Clone + PartialEq + std::fmt::Debug + Send + Sync;
    fn id(&self) -> &Self::ID;
}

/// Text exposed to the client-side filter, and the facet values used to
/// populate filter controls.
pub trait Searchable {
    fn text_fields(&self) -> Vec<&str>;

    fn category(&self) -> Option<&str> {
        None
    }

    fn brand(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Copy, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}
impl Direction {
    fn tag(&self) -> u8 {
        match self {
            Direction::Ascending => b'a',
            Direction::Descending => b'd',
        }
    }
}

/// Position in an ordered scan. Only meaningful for the direction it was
/// taken in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor {
    pub key: Vec<u8>,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorDecodeError;

impl std::fmt::Display for CursorDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("malformed cursor token")
    }
}

impl std::error::Error for CursorDecodeError {}

impl Cursor {
    pub fn new(key: impl Into<Vec<u8>>, direction: Direction) -> Self {
        Cursor {
            key: key.into(),
            direction,
        }
    }

    /// URL-safe token for handing the cursor to a client.
    pub fn encode(&self) -> String {
        let mut raw = Vec::with_capacity(self.key.len() + 1);
        raw.push(self.direction.tag());
        raw.extend_from_slice(&self.key);
        URL_SAFE_NO_PAD.encode(raw)
    }

    pub fn decode(token: &str) -> Result<Self, CursorDecodeError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| CursorDecodeError)?;
        let (tag, key) = raw.split_first().ok_or(CursorDecodeError)?;
        let direction = match tag {
            b'a' => Direction::Ascending,
            b'd' => Direction::Descending,
            _ => return Err(CursorDecodeError),
        };
        Ok(Cursor::new(key.to_vec(), direction))
    }
}
