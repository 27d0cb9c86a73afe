//! MongoDB-backed [`BlogStore`].
//!
//! One [`MongoStore`] is created at startup and shared by every handler. The
//! driver's `Client` is internally pooled and safe to use concurrently, so no
//! additional synchronization is needed here.

use super::{BlogScan, BlogStore, StoreError};
use blog_tonic_core::{BlogFields, BlogId, BlogItem};
use futures::{StreamExt, TryStreamExt};
use mongodb::{
    Client, Collection,
    bson::{Document, doc, oid::ObjectId},
    error::ErrorKind,
    options::{ClientOptions, ReturnDocument},
};

/// Blog posts stored as documents in a single MongoDB collection.
#[derive(Clone, Debug)]
pub struct MongoStore {
    client: Client,
    collection: Collection<BlogItem>,
}

impl MongoStore {
    /// Connects to `uri`, verifies the deployment answers a `ping`, and binds
    /// to `database.collection`.
    ///
    /// The driver connects lazily, so the ping is what actually surfaces an
    /// unreachable server at startup.
    pub async fn connect(uri: &str, database: &str, collection: &str) -> Result<Self, StoreError> {
        let mut options = ClientOptions::parse(uri).await?;
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());

        let client = Client::with_options(options)?;
        let db = client.database(database);
        db.run_command(doc! { "ping": 1 }).await?;

        tracing::info!(database, collection, "Connected to MongoDB");

        Ok(Self {
            collection: db.collection(collection),
            client,
        })
    }

    fn by_id(id: BlogId) -> Document {
        doc! { "_id": ObjectId::from(id) }
    }
}

#[tonic::async_trait]
impl BlogStore for MongoStore {
    async fn insert(&self, item: BlogItem) -> Result<BlogId, StoreError> {
        let result = self.collection.insert_one(item).await?;
        result
            .inserted_id
            .as_object_id()
            .map(BlogId::from)
            .ok_or_else(|| StoreError::Unavailable {
                context: format!("store assigned a non-ObjectId id: {}", result.inserted_id),
            })
    }

    async fn find_by_id(&self, id: BlogId) -> Result<BlogItem, StoreError> {
        self.collection
            .find_one(Self::by_id(id))
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn update_by_id(&self, id: BlogId, fields: BlogFields) -> Result<BlogItem, StoreError> {
        self.collection
            .find_one_and_update(Self::by_id(id), doc! { "$set": fields.to_set_document() })
            .return_document(ReturnDocument::After)
            .await?
            .ok_or(StoreError::NotFound)
    }

    async fn delete_by_id(&self, id: BlogId) -> Result<(), StoreError> {
        let result = self.collection.delete_one(Self::by_id(id)).await?;
        if result.deleted_count == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn scan_all(&self) -> Result<BlogScan, StoreError> {
        let cursor = self.collection.find(doc! {}).await?;
        Ok(cursor.map_err(StoreError::from).boxed())
    }

    async fn close(&self) {
        tracing::info!("Closing MongoDB connection");
        self.client.clone().shutdown().await;
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::BsonDeserialization(_) => Self::Decode {
                context: err.to_string(),
            },
            _ => Self::Unavailable {
                context: err.to_string(),
            },
        }
    }
}
