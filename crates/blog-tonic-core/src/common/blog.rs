//! Storage-side blog documents and their mapping to the wire [`Blog`].
//!
//! The two representations differ in two ways:
//!
//! - Field naming follows BSON conventions in storage (`_id`, `author_id`)
//!   and protobuf conventions on the wire.
//! - The identifier is an `Option<ObjectId>` in storage and is omitted from
//!   the document entirely when absent, so an unpersisted post never carries
//!   an `_id` into an insert. On the wire the `id` field is always present and
//!   the empty string means "not yet assigned".

use crate::{BlogId, Error, proto::Blog};
use bson::{Document, doc, oid::ObjectId};
use serde::{Deserialize, Serialize};

/// A blog post as stored in the document store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogItem {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub author_id: String,
    pub title: String,
    pub content: String,
}

/// The replaceable fields of a blog post: everything except its identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlogFields {
    pub author_id: String,
    pub title: String,
    pub content: String,
}

impl BlogItem {
    /// A storage document that has never been persisted.
    pub fn unassigned(fields: BlogFields) -> Self {
        Self {
            id: None,
            author_id: fields.author_id,
            title: fields.title,
            content: fields.content,
        }
    }

    /// Returns this document with the store-assigned identifier attached.
    #[must_use]
    pub fn with_id(self, id: BlogId) -> Self {
        Self {
            id: Some(id.into()),
            ..self
        }
    }

    pub fn blog_id(&self) -> Option<BlogId> {
        self.id.map(BlogId::from)
    }
}

impl BlogFields {
    /// The `$set` body applied by an update. The identifier is never part of
    /// it.
    pub fn to_set_document(&self) -> Document {
        doc! {
            "author_id": self.author_id.as_str(),
            "title": self.title.as_str(),
            "content": self.content.as_str(),
        }
    }
}

impl From<&Blog> for BlogFields {
    fn from(blog: &Blog) -> Self {
        Self {
            author_id: blog.author_id.clone(),
            title: blog.title.clone(),
            content: blog.content.clone(),
        }
    }
}

impl From<BlogItem> for Blog {
    fn from(item: BlogItem) -> Self {
        Self {
            id: item.blog_id().map(|id| id.encode()).unwrap_or_default(),
            author_id: item.author_id,
            title: item.title,
            content: item.content,
        }
    }
}

impl TryFrom<Blog> for BlogItem {
    type Error = Error;

    fn try_from(blog: Blog) -> Result<Self, Self::Error> {
        let id = if blog.id.is_empty() {
            None
        } else {
            let id = BlogId::decode(&blog.id).map_err(|source| Error::MalformedIdentifier {
                id: blog.id.clone(),
                source,
            })?;
            Some(id.into())
        };

        Ok(Self {
            id,
            author_id: blog.author_id,
            title: blog.title,
            content: blog.content,
        })
    }
}
