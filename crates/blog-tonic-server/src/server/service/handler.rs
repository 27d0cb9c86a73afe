//! gRPC service implementation for blog posts.
//!
//! This module defines [`BlogServiceImpl`], the concrete implementation of the
//! [`BlogService`] gRPC service defined in `proto/blog.proto`. Each RPC decodes
//! identifiers with [`BlogId`], maps between the wire [`Blog`] and the storage
//! [`BlogItem`], calls the injected [`BlogStore`], and turns failures into
//! `tonic::Status` codes via [`Error`].
//!
//! ## Responsibilities
//!
//! - Reject malformed identifiers before the store is touched.
//! - Map store failures to status codes per call path.
//! - Feed `ListBlogs` lazily from a store scan via [`feed_blogs`].
//! - Refuse new work and end running streams once shutdown has begun.

use crate::server::{
    config::ServerConfig,
    store::BlogStore,
    streaming::feed::{self, BlogFeedStream, feed_blogs},
    telemetry::{
        decrement_streams_inflight, increment_errors, increment_requests,
        increment_streams_inflight, record_stream_duration,
    },
};
use blog_tonic_core::{
    BlogFields, BlogId, BlogItem, Error,
    proto::{
        Blog, CreateBlogReq, CreateBlogRes, DeleteBlogReq, DeleteBlogRes, ListBlogReq, ReadBlogReq,
        ReadBlogRes, UpdateBlogReq, UpdateBlogRes, blog_service_server::BlogService,
    },
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::Instrument;

/// gRPC service exposing CRUD and enumeration of blog posts.
///
/// Generic over the persistence adapter so the same handlers run against
/// MongoDB in production and an in-memory store in tests. The store handle is
/// established once at startup and shared by every call.
pub struct BlogServiceImpl<S> {
    store: Arc<S>,
    stream_buffer_size: usize,
    shutdown_token: CancellationToken,
}

impl<S> Clone for BlogServiceImpl<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            stream_buffer_size: self.stream_buffer_size,
            shutdown_token: self.shutdown_token.clone(),
        }
    }
}

impl<S: BlogStore> BlogServiceImpl<S> {
    pub fn new(store: Arc<S>, config: &ServerConfig) -> Self {
        Self::with_stream_buffer(store, config.stream_buffer_size)
    }

    pub fn with_stream_buffer(store: Arc<S>, stream_buffer_size: usize) -> Self {
        Self {
            store,
            stream_buffer_size,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Stops accepting calls and ends in-flight `ListBlogs` streams with
    /// `UNAVAILABLE`. Unary calls already past admission run to completion.
    pub fn shutdown(&self) {
        tracing::info!("Refusing new requests");
        self.shutdown_token.cancel();
    }

    /// Closes the store connection. Call only once the server has stopped
    /// serving, since nothing may touch the store afterwards.
    pub async fn close(&self) {
        self.store.close().await;
        tracing::info!("Blog service shutdown complete");
    }

    fn ensure_running(&self) -> Result<(), Error> {
        if self.shutdown_token.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }
        Ok(())
    }
}

fn decode_id(raw: &str) -> Result<BlogId, Error> {
    BlogId::decode(raw).map_err(|source| Error::MalformedIdentifier {
        id: raw.to_string(),
        source,
    })
}

/// Records the outcome of a unary call and converts its error.
fn finish<T>(rpc: &'static str, result: Result<T, Error>) -> Result<Response<T>, Status> {
    match result {
        Ok(res) => Ok(Response::new(res)),
        Err(e) => {
            increment_errors(rpc);
            tracing::debug!(rpc, "Request failed: {e}");
            Err(e.into())
        }
    }
}

#[tonic::async_trait]
impl<S: BlogStore> BlogService for BlogServiceImpl<S> {
    type ListBlogsStream = BlogFeedStream;

    /// Persists a new post. Any client-supplied `id` is ignored; the store
    /// assigns one.
    #[tracing::instrument(skip_all)]
    async fn create_blog(
        &self,
        req: Request<CreateBlogReq>,
    ) -> Result<Response<CreateBlogRes>, Status> {
        increment_requests("create_blog");

        let result = async {
            self.ensure_running()?;
            let blog = req
                .into_inner()
                .blog
                .ok_or(Error::MissingField { field: "blog" })?;

            let item = BlogItem::unassigned(BlogFields::from(&blog));
            let id = self
                .store
                .insert(item.clone())
                .await
                .map_err(|e| e.on_write(None))?;

            tracing::info!(%id, "Created blog");
            Ok(CreateBlogRes {
                blog: Some(Blog::from(item.with_id(id))),
            })
        }
        .await;

        finish("create_blog", result)
    }

    #[tracing::instrument(skip_all, fields(id = %req.get_ref().id))]
    async fn read_blog(&self, req: Request<ReadBlogReq>) -> Result<Response<ReadBlogRes>, Status> {
        increment_requests("read_blog");

        let result = async {
            self.ensure_running()?;
            let id = decode_id(&req.get_ref().id)?;

            let item = self
                .store
                .find_by_id(id)
                .await
                .map_err(|e| e.on_read(id))?;

            Ok(ReadBlogRes {
                blog: Some(Blog::from(item)),
            })
        }
        .await;

        finish("read_blog", result)
    }

    /// Replaces author, title and content of the post selected by `blog.id`
    /// and returns the post as stored after the update.
    #[tracing::instrument(skip_all)]
    async fn update_blog(
        &self,
        req: Request<UpdateBlogReq>,
    ) -> Result<Response<UpdateBlogRes>, Status> {
        increment_requests("update_blog");

        let result = async {
            self.ensure_running()?;
            let blog = req
                .into_inner()
                .blog
                .ok_or(Error::MissingField { field: "blog" })?;
            let id = decode_id(&blog.id)?;

            let item = self
                .store
                .update_by_id(id, BlogFields::from(&blog))
                .await
                .map_err(|e| e.on_write(Some(id)))?;

            tracing::info!(%id, "Updated blog");
            Ok(UpdateBlogRes {
                blog: Some(Blog::from(item)),
            })
        }
        .await;

        finish("update_blog", result)
    }

    #[tracing::instrument(skip_all, fields(id = %req.get_ref().id))]
    async fn delete_blog(
        &self,
        req: Request<DeleteBlogReq>,
    ) -> Result<Response<DeleteBlogRes>, Status> {
        increment_requests("delete_blog");

        let result = async {
            self.ensure_running()?;
            let id = decode_id(&req.get_ref().id)?;

            self.store
                .delete_by_id(id)
                .await
                .map_err(|e| e.on_write(Some(id)))?;

            tracing::info!(%id, "Deleted blog");
            Ok(DeleteBlogRes { success: true })
        }
        .await;

        finish("delete_blog", result)
    }

    /// Streams every stored post, one message per post, in the store's scan
    /// order.
    ///
    /// The scan runs in a spawned task feeding a bounded buffer of
    /// `stream_buffer_size` messages. Store failures end the stream with a
    /// terminal status; a disconnected client stops the scan.
    #[tracing::instrument(skip_all)]
    async fn list_blogs(
        &self,
        _req: Request<ListBlogReq>,
    ) -> Result<Response<Self::ListBlogsStream>, Status> {
        increment_requests("list_blogs");
        if let Err(e) = self.ensure_running() {
            increment_errors("list_blogs");
            return Err(e.into());
        }

        let start = std::time::Instant::now();
        increment_streams_inflight();

        let (sink, stream) = feed::channel(self.stream_buffer_size);

        let store = Arc::clone(&self.store);
        let shutdown = self.shutdown_token.clone();

        let fut = async move {
            match feed_blogs(store, sink, shutdown).await {
                Ok(sent) => tracing::debug!(sent, "Stream complete"),
                Err(Error::RequestCancelled) => tracing::debug!("Stream cancelled by client"),
                Err(e) => {
                    increment_errors("list_blogs");
                    tracing::warn!("Stream ended with error: {e}");
                }
            }
            decrement_streams_inflight();
            record_stream_duration(start.elapsed().as_secs_f64() * 1000.0);
        }
        .instrument(tracing::info_span!("streaming"));

        tokio::spawn(fut);

        Ok(Response::new(stream))
    }
}
