use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

pub const ROOT_LABEL: &str = "ROOT";
pub const ROOT_TITLE: &str = "Crawl origin";
pub const NO_TITLE: &str = "(no title)";

const SOURCE_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_5a2e_93d4_4b8e_a0b7_2f4c_8d1e_9a01);
const COLLECTION_NAMESPACE: Uuid = Uuid::from_u128(0x6c1f_5a2e_93d4_4b8e_a0b7_2f4c_8d1e_9a02);

/// Identity of a vertex: a normalized page URL, or the synthetic crawl origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VertexKey {
    Root,
    Page(String),
}

impl VertexKey {
    pub fn is_root(&self) -> bool {
        matches!(self, VertexKey::Root)
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            VertexKey::Root => None,
            VertexKey::Page(url) => Some(url),
        }
    }
}

impl fmt::Display for VertexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VertexKey::Root => write!(f, "root"),
            VertexKey::Page(url) => write!(f, "{}", url),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Dataset,
    Collection,
    Source,
}

impl Role {
    fn bit(self) -> u8 {
        match self {
            Role::Dataset => 0b001,
            Role::Collection => 0b010,
            Role::Source => 0b100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Dataset => "dataset",
            Role::Collection => "collection",
            Role::Source => "source",
        }
    }
}

/// Non-exclusive set of roles. Empty means a plain page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleSet(u8);

impl RoleSet {
    pub fn insert(&mut self, role: Role) {
        self.0 |= role.bit();
    }

    pub fn remove(&mut self, role: Role) {
        self.0 &= !role.bit();
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn is_plain(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> {
        let set = *self;
        [Role::Dataset, Role::Collection, Role::Source]
            .into_iter()
            .filter(move |r| set.contains(*r))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source_id: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionMembership {
    pub collection_id: String,
    pub title: String,
    pub url: String,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetPayload {
    pub belongs_to_collections: Vec<CollectionMembership>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionPayload {
    pub collection_id: String,
    pub belongs_to_sources: Vec<SourceRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcePayload {
    pub source_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub key: VertexKey,
    pub label: String,
    pub title: String,
    pub roles: RoleSet,
    /// Keys of direct successors currently flagged as datasets.
    pub dataset_members: BTreeSet<String>,
    pub has_dataset: bool,
    pub dataset: Option<DatasetPayload>,
    pub collection: Option<CollectionPayload>,
    pub source: Option<SourcePayload>,
}

impl Vertex {
    pub fn root() -> Self {
        Self::plain(VertexKey::Root, ROOT_LABEL.to_string(), ROOT_TITLE.to_string())
    }

    pub fn page(url: String, label: String, title: Option<String>) -> Self {
        let title = title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| NO_TITLE.to_string());
        Self::plain(VertexKey::Page(url), label, title)
    }

    fn plain(key: VertexKey, label: String, title: String) -> Self {
        Self {
            key,
            label,
            title,
            roles: RoleSet::default(),
            dataset_members: BTreeSet::new(),
            has_dataset: false,
            dataset: None,
            collection: None,
            source: None,
        }
    }

    /// Page URL, or an empty string for the root.
    pub fn url(&self) -> &str {
        self.key.url().unwrap_or("")
    }

    pub fn is_dataset(&self) -> bool {
        self.roles.contains(Role::Dataset)
    }

    pub fn is_collection(&self) -> bool {
        self.roles.contains(Role::Collection)
    }

    pub fn is_source(&self) -> bool {
        self.roles.contains(Role::Source)
    }

    pub fn source_ref(&self) -> Option<SourceRef> {
        self.source.as_ref().map(|s| SourceRef {
            source_id: s.source_id.clone(),
            title: self.title.clone(),
            url: self.url().to_string(),
        })
    }

    pub fn collection_membership(&self) -> Option<CollectionMembership> {
        self.collection.as_ref().map(|c| CollectionMembership {
            collection_id: c.collection_id.clone(),
            title: self.title.clone(),
            url: self.url().to_string(),
            sources: Vec::new(),
        })
    }
}

/// Deterministic source id for a normalized URL.
pub fn source_id_for(normalized_url: &str) -> String {
    Uuid::new_v5(&SOURCE_NAMESPACE, normalized_url.as_bytes()).to_string()
}

/// Deterministic collection id for a normalized URL.
pub fn collection_id_for(normalized_url: &str) -> String {
    Uuid::new_v5(&COLLECTION_NAMESPACE, normalized_url.as_bytes()).to_string()
}

/// Edge payload: the target was discovered via a link on the source page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link;
