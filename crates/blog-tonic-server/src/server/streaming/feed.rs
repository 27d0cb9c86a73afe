use crate::server::{
    store::{BlogStore, StoreError},
    telemetry::increment_blogs_streamed,
};
use blog_tonic_core::{Error, proto::ListBlogRes};
use core::pin::Pin;
use futures::{Stream, StreamExt, future};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// The gRPC response stream of one `ListBlogs` call.
pub type BlogFeedStream = Pin<Box<dyn Stream<Item = Result<ListBlogRes, Status>> + Send>>;

/// Sending half of a feed: posts go through a bounded channel, the terminal
/// status (if any) through a oneshot so reporting it never waits on the
/// client.
pub struct FeedSink {
    items: mpsc::Sender<ListBlogRes>,
    terminal: oneshot::Sender<Status>,
}

/// Creates a feed whose item buffer holds at most `buffer` posts.
pub fn channel(buffer: usize) -> (FeedSink, BlogFeedStream) {
    let (items_tx, items_rx) = mpsc::channel(buffer);
    let (terminal_tx, terminal_rx) = oneshot::channel::<Status>();

    // Buffered posts drain first; the status follows once the sink is gone.
    let terminal = futures::stream::once(terminal_rx)
        .filter_map(|status| future::ready(status.ok().map(Err)));
    let stream = ReceiverStream::new(items_rx)
        .map(Ok::<ListBlogRes, Status>)
        .chain(terminal);

    (
        FeedSink {
            items: items_tx,
            terminal: terminal_tx,
        },
        Box::pin(stream),
    )
}

impl FeedSink {
    fn finish(self, err: Error) -> Error {
        if self.terminal.send(err.clone().into()).is_err() {
            tracing::debug!("Stream already dropped, status not delivered: {err}");
        }
        err
    }
}

/// Drains a full-collection scan into a `ListBlogs` response stream.
///
/// Each document is mapped to the wire form and pushed onto the sink as soon
/// as the cursor yields it. The item buffer is bounded, so the cursor is only
/// advanced once the client has made room; the collection is never buffered
/// in full.
///
/// # Termination
///
/// The scan (and with it the store cursor) is always released before this
/// returns, and returning never waits on the client.
///
/// - Scan exhausted: returns the number of posts sent; the stream ends
///   normally after the buffered posts.
/// - Scan failure (open, decode, cursor): the mapped status ends the stream
///   after the buffered posts, and the error is returned.
/// - Client gone (the receiver closes): the scan is abandoned and
///   [`Error::RequestCancelled`] is returned.
/// - Service shutdown (`shutdown` cancelled): [`Error::ServiceShutdown`] ends
///   the stream after the buffered posts, and is returned.
pub async fn feed_blogs<S: BlogStore>(
    store: Arc<S>,
    sink: FeedSink,
    shutdown: CancellationToken,
) -> blog_tonic_core::Result<usize> {
    let mut scan = match store.scan_all().await {
        Ok(scan) => scan,
        Err(e) => return Err(sink.finish(scan_failed(e))),
    };

    let mut sent = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                drop(scan);
                return Err(sink.finish(Error::ServiceShutdown));
            }
            () = sink.items.closed() => return Err(Error::RequestCancelled),
            next = scan.next() => next,
        };

        let Some(item) = next else {
            break;
        };

        let item = match item {
            Ok(item) => item,
            Err(e) => {
                drop(scan);
                return Err(sink.finish(scan_failed(e)));
            }
        };

        let res = ListBlogRes {
            blog: Some(item.into()),
        };

        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                drop(scan);
                return Err(sink.finish(Error::ServiceShutdown));
            }
            sent_res = sink.items.send(res) => {
                // The receiver is gone; stop pulling from the cursor.
                if sent_res.is_err() {
                    tracing::debug!(sent, "Client disconnected, abandoning scan");
                    return Err(Error::RequestCancelled);
                }
            }
        }

        sent += 1;
        increment_blogs_streamed();
    }

    Ok(sent)
}

fn scan_failed(err: StoreError) -> Error {
    let err = err.on_scan();
    tracing::warn!("Scan failed: {err}");
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::store::memory::{MemoryStore, ScanFailure};
    use blog_tonic_core::{BlogFields, BlogId, BlogItem};
    use core::time::Duration;
    use tonic::Code;

    async fn seeded(n: usize) -> (Arc<MemoryStore>, Vec<BlogId>) {
        let store = Arc::new(MemoryStore::new());
        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            let id = store
                .insert(BlogItem::unassigned(BlogFields {
                    author_id: format!("author-{i}"),
                    title: format!("title-{i}"),
                    content: format!("content-{i}"),
                }))
                .await
                .unwrap();
            ids.push(id);
        }
        (store, ids)
    }

    fn blog_id(msg: &Result<ListBlogRes, Status>) -> &str {
        &msg.as_ref().unwrap().blog.as_ref().unwrap().id
    }

    #[tokio::test]
    async fn streams_every_document_in_scan_order() {
        let (store, ids) = seeded(5).await;
        let (sink, stream) = channel(2);

        let feeder = tokio::spawn(feed_blogs(store, sink, CancellationToken::new()));
        let msgs: Vec<_> = stream.collect().await;

        assert_eq!(feeder.await.unwrap().unwrap(), 5);
        let streamed: Vec<&str> = msgs.iter().map(blog_id).collect();
        let expected: Vec<String> = ids.iter().map(BlogId::encode).collect();
        assert_eq!(streamed, expected);
    }

    #[tokio::test]
    async fn empty_collection_ends_stream_cleanly() {
        let (store, _) = seeded(0).await;
        let (sink, stream) = channel(1);

        let sent = feed_blogs(store, sink, CancellationToken::new()).await.unwrap();

        assert_eq!(sent, 0);
        assert!(stream.collect::<Vec<_>>().await.is_empty());
    }

    #[tokio::test]
    async fn open_failure_is_terminal_internal() {
        let (store, _) = seeded(3).await;
        store.fail_scan(ScanFailure::Open);
        let (sink, stream) = channel(4);

        let err = feed_blogs(store, sink, CancellationToken::new()).await.unwrap_err();
        let msgs: Vec<_> = stream.collect().await;

        assert!(matches!(err, Error::Internal { .. }));
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].as_ref().unwrap_err().code(), Code::Internal);
    }

    #[tokio::test]
    async fn decode_failure_delivers_prefix_then_unavailable() {
        let (store, ids) = seeded(4).await;
        store.fail_scan(ScanFailure::DecodeAt(2));
        let (sink, stream) = channel(8);

        let err = feed_blogs(store, sink, CancellationToken::new()).await.unwrap_err();
        let msgs: Vec<_> = stream.collect().await;

        assert!(matches!(err, Error::Unavailable { .. }));
        assert_eq!(msgs.len(), 3);
        assert_eq!(blog_id(&msgs[0]), ids[0].encode());
        assert_eq!(blog_id(&msgs[1]), ids[1].encode());
        assert_eq!(msgs[2].as_ref().unwrap_err().code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn cursor_error_after_exhaustion_is_internal() {
        let (store, _) = seeded(2).await;
        store.fail_scan(ScanFailure::CursorAfter(2));
        let (sink, stream) = channel(8);

        let err = feed_blogs(store, sink, CancellationToken::new()).await.unwrap_err();
        let msgs: Vec<_> = stream.collect().await;

        assert!(matches!(err, Error::Internal { .. }));
        assert_eq!(msgs.len(), 3);
        assert!(msgs[0].is_ok() && msgs[1].is_ok());
        assert_eq!(msgs[2].as_ref().unwrap_err().code(), Code::Internal);
    }

    #[tokio::test]
    async fn scan_failure_is_reported_even_when_the_buffer_is_full() {
        let (store, _) = seeded(3).await;
        store.fail_scan(ScanFailure::DecodeAt(1));
        let (sink, stream) = channel(1);

        // Nobody reads until the feeder is done.
        let err = tokio::time::timeout(
            Duration::from_secs(2),
            feed_blogs(store, sink, CancellationToken::new()),
        )
        .await
        .expect("feeder blocked on a full buffer")
        .unwrap_err();
        let msgs: Vec<_> = stream.collect().await;

        assert!(matches!(err, Error::Unavailable { .. }));
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].is_ok());
        assert_eq!(msgs[1].as_ref().unwrap_err().code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn dropped_receiver_aborts_scan() {
        let (store, _) = seeded(50).await;
        let (sink, mut stream) = channel(1);

        let feeder = tokio::spawn(feed_blogs(Arc::clone(&store), sink, CancellationToken::new()));

        assert!(stream.next().await.unwrap().is_ok());
        drop(stream);

        let err = feeder.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::RequestCancelled));
        // One received, at most one buffered and one blocked in send.
        assert!(store.pulled() <= 3, "pulled {}", store.pulled());
    }

    #[tokio::test]
    async fn slow_receiver_holds_the_cursor_back() {
        let (store, _) = seeded(20).await;
        let (sink, mut stream) = channel(2);

        let feeder = tokio::spawn(feed_blogs(Arc::clone(&store), sink, CancellationToken::new()));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Two buffered plus one waiting on capacity.
        assert!(store.pulled() <= 3, "pulled {}", store.pulled());

        let mut received = 0;
        while let Some(msg) = stream.next().await {
            msg.unwrap();
            received += 1;
        }
        assert_eq!(received, 20);
        assert_eq!(feeder.await.unwrap().unwrap(), 20);
    }

    #[tokio::test]
    async fn shutdown_stops_the_stream_with_unavailable() {
        let (store, _) = seeded(10).await;
        let (sink, mut stream) = channel(1);
        let shutdown = CancellationToken::new();

        let feeder = tokio::spawn(feed_blogs(store, sink, shutdown.clone()));
        assert!(stream.next().await.unwrap().is_ok());

        shutdown.cancel();
        let rest: Vec<_> = stream.collect().await;
        let err = feeder.await.unwrap().unwrap_err();

        assert!(matches!(err, Error::ServiceShutdown));
        assert!(rest.len() < 9);
        let last = rest.last().unwrap();
        assert_eq!(last.as_ref().unwrap_err().code(), Code::Unavailable);
    }

    #[tokio::test]
    async fn shutdown_with_an_unread_full_buffer_releases_the_scan() {
        let (store, _) = seeded(10).await;
        let (sink, stream) = channel(1);
        let shutdown = CancellationToken::new();

        let feeder = tokio::spawn(feed_blogs(Arc::clone(&store), sink, shutdown.clone()));
        // Let the feeder fill the buffer and block on the next send.
        tokio::time::sleep(Duration::from_millis(50)).await;

        shutdown.cancel();
        let err = tokio::time::timeout(Duration::from_secs(2), feeder)
            .await
            .expect("feeder still running after shutdown")
            .unwrap()
            .unwrap_err();

        assert!(matches!(err, Error::ServiceShutdown));
        assert!(store.pulled() <= 2, "pulled {}", store.pulled());

        // The stalled client still learns why the stream ended.
        let msgs: Vec<_> = stream.collect().await;
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].is_ok());
        assert_eq!(msgs[1].as_ref().unwrap_err().code(), Code::Unavailable);
    }
}
