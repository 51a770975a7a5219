//! Tag and tagging rows.

use serde::{Deserialize, Serialize};

/// A row in a tag table.
///
/// Names are unique within their table and stored with original case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Who a tagging belongs to.
///
/// Local contexts reference the owner by plain foreign key; shared
/// contexts need the owner type as well, since one tagging table serves
/// unrelated record types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Owner {
    Record { id: i64 },
    Typed { owner_type: String, id: i64 },
}

impl Owner {
    #[must_use]
    pub const fn id(&self) -> i64 {
        match self {
            Self::Record { id } | Self::Typed { id, .. } => *id,
        }
    }

    #[must_use]
    pub fn owner_type(&self) -> Option<&str> {
        match self {
            Self::Record { .. } => None,
            Self::Typed { owner_type, .. } => Some(owner_type),
        }
    }
}

/// A join row between an owner and a tag within one context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tagging {
    pub id: i64,
    pub tag_id: i64,
    pub owner: Owner,
    /// Singular context label (e.g. `color`)
    pub context: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_accessors() {
        let local = Owner::Record { id: 7 };
        assert_eq!(local.id(), 7);
        assert_eq!(local.owner_type(), None);

        let shared = Owner::Typed {
            owner_type: "Passenger".into(),
            id: 9,
        };
        assert_eq!(shared.id(), 9);
        assert_eq!(shared.owner_type(), Some("Passenger"));
    }

    #[test]
    fn test_owner_serde_is_tagged() {
        let shared = Owner::Typed {
            owner_type: "Car".into(),
            id: 1,
        };
        let json = serde_json::to_value(&shared).unwrap();
        assert_eq!(json["kind"], "typed");
        assert_eq!(json["owner_type"], "Car");
    }
}
