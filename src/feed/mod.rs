//! Incrementally loaded photo list for one folder view.
//!
//! This module provides:
//! - `PhotoFeed` - photo list + pagination, mutated only through its operations
//! - `PhotoSource` - backend collaborator (HTTP implementation in `http_source`)
//! - `Notifier` - user-facing success/failure messages
//! - `ViewScope` - liveness of the consuming view; completions after teardown are dropped

pub mod http_source;
pub mod notify;
pub mod source;

use std::sync::Arc;

use flume::Receiver;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::layout::{JustifiedLayout, LayoutCache};
use crate::models::{FolderId, LayoutRow, Photo, PhotoId, PositionedPhoto};

pub use http_source::HttpPhotoSource;
pub use notify::{Notifier, NotifyKind, TracingNotifier};
pub use source::{Credential, Page, PhotoSource};

/// Liveness of the view that owns a feed.
#[derive(Debug, Clone, Default)]
pub struct ViewScope {
    token: CancellationToken,
}

impl ViewScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_alive(&self) -> bool {
        !self.token.is_cancelled()
    }

    /// Marks the view as gone. Pending completions become no-ops.
    pub fn close(&self) {
        self.token.cancel();
    }

    pub async fn closed(&self) {
        self.token.cancelled().await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationState {
    pub page_number: u32,
    pub has_more: bool,
    pub is_requesting: bool,
}

impl Default for PaginationState {
    fn default() -> Self {
        Self {
            page_number: 0,
            has_more: true,
            is_requesting: false,
        }
    }
}

#[derive(Debug, Default)]
struct FeedState {
    photos: Vec<Photo>,
    pagination: PaginationState,
    loading: bool,
}

/// Photo list and pagination for one folder.
pub struct PhotoFeed {
    folder: FolderId,
    credential: Credential,
    source: Arc<dyn PhotoSource>,
    notifier: Arc<dyn Notifier>,
    scope: ViewScope,
    state: Mutex<FeedState>,
    layout: JustifiedLayout,
    layout_cache: LayoutCache,
}

impl PhotoFeed {
    pub fn new(
        folder: FolderId,
        credential: Credential,
        source: Arc<dyn PhotoSource>,
        notifier: Arc<dyn Notifier>,
        scope: ViewScope,
    ) -> Self {
        Self {
            folder,
            credential,
            source,
            notifier,
            scope,
            state: Mutex::new(FeedState::default()),
            layout: JustifiedLayout::default(),
            layout_cache: LayoutCache::new(),
        }
    }

    pub fn with_layout(mut self, layout: JustifiedLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn folder(&self) -> FolderId {
        self.folder
    }

    pub fn scope(&self) -> &ViewScope {
        &self.scope
    }

    pub fn photos(&self) -> Vec<Photo> {
        self.state.lock().photos.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().photos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().photos.is_empty()
    }

    pub fn pagination(&self) -> PaginationState {
        self.state.lock().pagination
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    /// Claims the single fetch slot. Returns false if a fetch is already running.
    fn begin_request(&self) -> bool {
        let mut state = self.state.lock();
        if state.pagination.is_requesting {
            return false;
        }
        state.pagination.is_requesting = true;
        state.loading = true;
        true
    }

    /// Loads page 1 and replaces the list with it.
    ///
    /// On failure the list and pagination are left as they were.
    pub async fn load_first_page(&self) {
        if !self.scope.is_alive() || !self.begin_request() {
            return;
        }

        let result = self
            .source
            .fetch_page(&self.credential, self.folder, 1)
            .await;
        if !self.scope.is_alive() {
            debug!(folder = self.folder, "view closed, dropping first page");
            return;
        }

        let mut state = self.state.lock();
        state.pagination.is_requesting = false;
        state.loading = false;
        match result {
            Ok(page) => {
                debug!(
                    folder = self.folder,
                    count = page.photos.len(),
                    has_more = page.has_more,
                    "loaded first page"
                );
                state.photos = page.photos;
                state.pagination.has_more = page.has_more;
                state.pagination.page_number = 1;
            }
            Err(err) => {
                drop(state);
                warn!(folder = self.folder, error = %err, "failed to load first page");
                self.notifier
                    .notify(NotifyKind::Failure, "Failed", "Unable to load images");
            }
        }
    }

    /// Loads the page after the current one and appends it.
    ///
    /// No-op while a fetch is running or once the backend reported no more pages.
    pub async fn load_next_page(&self) {
        if !self.scope.is_alive() {
            return;
        }
        let next_page = {
            let mut state = self.state.lock();
            if state.pagination.is_requesting || !state.pagination.has_more {
                return;
            }
            state.pagination.is_requesting = true;
            state.loading = true;
            state.pagination.page_number + 1
        };

        let result = self
            .source
            .fetch_page(&self.credential, self.folder, next_page)
            .await;
        if !self.scope.is_alive() {
            debug!(folder = self.folder, page = next_page, "view closed, dropping page");
            return;
        }

        let mut state = self.state.lock();
        state.pagination.is_requesting = false;
        state.loading = false;
        match result {
            Ok(page) => {
                debug!(
                    folder = self.folder,
                    page = next_page,
                    count = page.photos.len(),
                    has_more = page.has_more,
                    "loaded page"
                );
                state.photos.extend(page.photos);
                state.pagination.has_more = page.has_more;
                state.pagination.page_number += 1;
            }
            Err(err) => {
                drop(state);
                warn!(folder = self.folder, page = next_page, error = %err, "failed to load page");
                self.notifier
                    .notify(NotifyKind::Failure, "Failed", "Unable to load images");
            }
        }
    }

    /// Puts a freshly uploaded photo at the front of the list.
    pub fn insert_uploaded(&self, photo: Photo) {
        self.state.lock().photos.insert(0, photo);
    }

    /// Removes the first photo with `id`. Returns whether one was removed.
    pub fn remove(&self, id: PhotoId) -> bool {
        let mut state = self.state.lock();
        match state.photos.iter().position(|p| p.id == id) {
            Some(index) => {
                state.photos.remove(index);
                true
            }
            None => false,
        }
    }

    /// Uploads an image and prepends it on success. Returns whether it succeeded.
    pub async fn upload(&self, bytes: Vec<u8>) -> bool {
        if !self.scope.is_alive() {
            return false;
        }
        self.state.lock().loading = true;
        let result = self
            .source
            .upload(&self.credential, self.folder, bytes)
            .await;
        if !self.scope.is_alive() {
            return false;
        }
        self.state.lock().loading = false;

        match result {
            Ok(photo) => {
                debug!(folder = self.folder, id = photo.id, "uploaded photo");
                self.insert_uploaded(photo);
                self.notifier
                    .notify(NotifyKind::Success, "Success", "Image uploaded!");
                true
            }
            Err(err) => {
                warn!(folder = self.folder, error = %err, "upload failed");
                self.notifier
                    .notify(NotifyKind::Failure, "Failed", "Unable to upload image");
                false
            }
        }
    }

    /// Deletes an image on the backend, then drops it from the list.
    pub async fn delete(&self, id: PhotoId) -> bool {
        if !self.scope.is_alive() {
            return false;
        }
        self.state.lock().loading = true;
        let result = self
            .source
            .delete_image(&self.credential, self.folder, id)
            .await;
        if !self.scope.is_alive() {
            return false;
        }
        self.state.lock().loading = false;

        match result {
            Ok(()) => {
                self.remove(id);
                self.notifier
                    .notify(NotifyKind::Success, "Deleted", "Image deleted successfully!");
                true
            }
            Err(err) => {
                warn!(folder = self.folder, id, error = %err, "delete failed");
                self.notifier
                    .notify(NotifyKind::Failure, "Error", "Couldn't delete this image");
                false
            }
        }
    }

    /// Lays out the current list for a measured container width.
    ///
    /// The search window is estimated from the measured width; the rows are then
    /// fitted to one unit less to absorb renderer rounding.
    pub fn layout_rows(&self, container_width: u32) -> Vec<LayoutRow> {
        let photos = self.photos();
        let window = self.layout.search_window_for(container_width as f64);
        self.layout_cache.compute(
            &self.layout,
            &photos,
            container_width.saturating_sub(1),
            window,
        )
    }

    pub fn layout(&self, container_width: u32) -> Vec<PositionedPhoto> {
        crate::models::flatten_rows(self.layout_rows(container_width))
    }

    /// Loads the next page each time the end-of-list sentinel becomes visible.
    ///
    /// Runs until the view scope closes or the signal source goes away.
    pub async fn follow_sentinel(&self, visible: Receiver<()>) {
        loop {
            tokio::select! {
                _ = self.scope.closed() => break,
                signal = visible.recv_async() => {
                    if signal.is_err() {
                        break;
                    }
                    self.load_next_page().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GalleryError, GalleryResult};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    fn photo(id: PhotoId) -> Photo {
        Photo::new(id, format!("{id}.jpg"), format!("{id}_t.jpg"), 1200, 800).unwrap()
    }

    fn page(ids: std::ops::Range<PhotoId>, has_more: bool) -> GalleryResult<Page> {
        Ok(Page {
            photos: ids.map(photo).collect(),
            has_more,
        })
    }

    /// Serves scripted responses in order; optionally parks each fetch on a gate.
    #[derive(Default)]
    struct ScriptedSource {
        pages: Mutex<VecDeque<GalleryResult<Page>>>,
        requested: Mutex<Vec<u32>>,
        fetches: AtomicUsize,
        gate: Option<Arc<Notify>>,
        upload_result: Mutex<Option<GalleryResult<Photo>>>,
        delete_ok: bool,
    }

    impl ScriptedSource {
        fn with_pages(pages: Vec<GalleryResult<Page>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                delete_ok: true,
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl PhotoSource for ScriptedSource {
        async fn fetch_page(
            &self,
            _credential: &Credential,
            _folder: FolderId,
            page: u32,
        ) -> GalleryResult<Page> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.requested.lock().push(page);
            match &self.gate {
                Some(gate) => gate.notified().await,
                None => tokio::task::yield_now().await,
            }
            self.pages
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(GalleryError::Network("no scripted page".into())))
        }

        async fn upload(
            &self,
            _credential: &Credential,
            _folder: FolderId,
            _bytes: Vec<u8>,
        ) -> GalleryResult<Photo> {
            tokio::task::yield_now().await;
            self.upload_result
                .lock()
                .take()
                .unwrap_or_else(|| Err(GalleryError::Network("no scripted upload".into())))
        }

        async fn delete_image(
            &self,
            _credential: &Credential,
            _folder: FolderId,
            _photo: PhotoId,
        ) -> GalleryResult<()> {
            if self.delete_ok {
                Ok(())
            } else {
                Err(GalleryError::Authorization("read-only partner".into()))
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<(NotifyKind, String)>>,
    }

    impl RecordingNotifier {
        fn kinds(&self) -> Vec<NotifyKind> {
            self.seen.lock().iter().map(|(k, _)| *k).collect()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, kind: NotifyKind, _title: &str, message: &str) {
            self.seen.lock().push((kind, message.to_string()));
        }
    }

    fn feed_with(
        source: Arc<ScriptedSource>,
        notifier: Arc<RecordingNotifier>,
    ) -> PhotoFeed {
        PhotoFeed::new(
            7,
            Credential::bearer("token"),
            source,
            notifier,
            ViewScope::new(),
        )
    }

    fn ids(feed: &PhotoFeed) -> Vec<PhotoId> {
        feed.photos().iter().map(|p| p.id).collect()
    }

    #[tokio::test]
    async fn test_first_page_replaces_list() {
        let source = Arc::new(ScriptedSource::with_pages(vec![page(0..3, true)]));
        let notifier = Arc::new(RecordingNotifier::default());
        let feed = feed_with(source.clone(), notifier.clone());
        feed.insert_uploaded(photo(99));

        feed.load_first_page().await;

        assert_eq!(ids(&feed), vec![0, 1, 2]);
        assert_eq!(
            feed.pagination(),
            PaginationState {
                page_number: 1,
                has_more: true,
                is_requesting: false
            }
        );
        assert!(!feed.is_loading());
        assert_eq!(*source.requested.lock(), vec![1]);
        assert!(notifier.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_first_page_failure_keeps_state() {
        let source = Arc::new(ScriptedSource::with_pages(vec![
            page(0..2, true),
            Err(GalleryError::Network("offline".into())),
        ]));
        let notifier = Arc::new(RecordingNotifier::default());
        let feed = feed_with(source, notifier.clone());

        feed.load_first_page().await;
        feed.load_first_page().await;

        assert_eq!(ids(&feed), vec![0, 1]);
        assert_eq!(feed.pagination().page_number, 1);
        assert!(feed.pagination().has_more);
        assert!(!feed.pagination().is_requesting);
        assert!(!feed.is_loading());
        assert_eq!(notifier.kinds(), vec![NotifyKind::Failure]);
    }

    #[tokio::test]
    async fn test_rapid_next_page_issues_one_fetch() {
        let source = Arc::new(ScriptedSource::with_pages(vec![
            page(0..2, true),
            page(2..4, true),
            page(4..6, false),
        ]));
        let notifier = Arc::new(RecordingNotifier::default());
        let feed = feed_with(source.clone(), notifier);

        feed.load_first_page().await;
        tokio::join!(feed.load_next_page(), feed.load_next_page());

        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(ids(&feed), vec![0, 1, 2, 3]);
        assert_eq!(feed.pagination().page_number, 2);

        feed.load_next_page().await;
        assert_eq!(ids(&feed), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(*source.requested.lock(), vec![1, 2, 3]);
        assert_eq!(feed.pagination().page_number, 3);
    }

    #[tokio::test]
    async fn test_no_more_pages_is_noop() {
        let source = Arc::new(ScriptedSource::with_pages(vec![page(0..2, false)]));
        let notifier = Arc::new(RecordingNotifier::default());
        let feed = feed_with(source.clone(), notifier.clone());

        feed.load_first_page().await;
        feed.load_next_page().await;
        feed.load_next_page().await;

        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(ids(&feed), vec![0, 1]);
        assert_eq!(feed.pagination().page_number, 1);
        assert!(notifier.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_next_page_failure_rolls_back() {
        let source = Arc::new(ScriptedSource::with_pages(vec![
            page(0..2, true),
            Err(GalleryError::Network("timeout".into())),
            page(2..3, false),
        ]));
        let notifier = Arc::new(RecordingNotifier::default());
        let feed = feed_with(source.clone(), notifier.clone());

        feed.load_first_page().await;
        feed.load_next_page().await;

        assert_eq!(ids(&feed), vec![0, 1]);
        assert_eq!(feed.pagination().page_number, 1);
        assert!(!feed.pagination().is_requesting);
        assert_eq!(notifier.kinds(), vec![NotifyKind::Failure]);

        // The same page is retried on the next signal.
        feed.load_next_page().await;
        assert_eq!(ids(&feed), vec![0, 1, 2]);
        assert_eq!(*source.requested.lock(), vec![1, 2, 2]);
    }

    #[tokio::test]
    async fn test_remove_unknown_id_is_noop() {
        let source = Arc::new(ScriptedSource::with_pages(vec![page(0..4, false)]));
        let feed = feed_with(source, Arc::new(RecordingNotifier::default()));
        feed.load_first_page().await;

        let before = feed.photos();
        assert!(!feed.remove(42));
        assert_eq!(feed.photos(), before);
        assert_eq!(feed.pagination().page_number, 1);
    }

    #[tokio::test]
    async fn test_remove_first_match_only() {
        let source = Arc::new(ScriptedSource::with_pages(vec![
            page(0..2, true),
            page(1..3, false),
        ]));
        let feed = feed_with(source, Arc::new(RecordingNotifier::default()));
        feed.load_first_page().await;
        feed.load_next_page().await;
        assert_eq!(ids(&feed), vec![0, 1, 1, 2]);

        assert!(feed.remove(1));
        assert_eq!(ids(&feed), vec![0, 1, 2]);
        assert_eq!(feed.pagination().page_number, 2);
    }

    #[tokio::test]
    async fn test_upload_prepends() {
        let source = Arc::new(ScriptedSource::with_pages(vec![page(0..2, false)]));
        *source.upload_result.lock() = Some(Ok(photo(50)));
        let notifier = Arc::new(RecordingNotifier::default());
        let feed = feed_with(source, notifier.clone());
        feed.load_first_page().await;

        assert!(feed.upload(vec![1, 2, 3]).await);
        assert_eq!(ids(&feed), vec![50, 0, 1]);

        assert!(!feed.upload(vec![1, 2, 3]).await);
        assert_eq!(ids(&feed), vec![50, 0, 1]);
        assert_eq!(
            notifier.kinds(),
            vec![NotifyKind::Success, NotifyKind::Failure]
        );
        assert!(!feed.is_loading());
    }

    #[tokio::test]
    async fn test_delete_removes_on_success_only() {
        let ok_source = Arc::new(ScriptedSource::with_pages(vec![page(0..3, false)]));
        let notifier = Arc::new(RecordingNotifier::default());
        let feed = feed_with(ok_source, notifier.clone());
        feed.load_first_page().await;
        assert!(feed.delete(1).await);
        assert_eq!(ids(&feed), vec![0, 2]);

        let failing = Arc::new(ScriptedSource {
            delete_ok: false,
            ..ScriptedSource::with_pages(vec![page(0..3, false)])
        });
        let feed = feed_with(failing, notifier.clone());
        feed.load_first_page().await;
        assert!(!feed.delete(1).await);
        assert_eq!(ids(&feed), vec![0, 1, 2]);
        assert_eq!(
            notifier.kinds(),
            vec![NotifyKind::Success, NotifyKind::Failure]
        );
    }

    #[tokio::test]
    async fn test_closed_view_drops_completion() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(ScriptedSource {
            gate: Some(gate.clone()),
            ..ScriptedSource::with_pages(vec![page(0..3, true)])
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let feed = feed_with(source.clone(), notifier.clone());

        let teardown = async {
            tokio::task::yield_now().await;
            feed.scope().close();
            gate.notify_one();
        };
        tokio::join!(feed.load_first_page(), teardown);

        assert!(feed.is_empty());
        assert_eq!(feed.pagination().page_number, 0);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);

        // Nothing starts after teardown.
        feed.load_next_page().await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert!(notifier.kinds().is_empty());
    }

    #[tokio::test]
    async fn test_follow_sentinel_loads_pages_in_order() {
        let source = Arc::new(ScriptedSource::with_pages(vec![
            page(0..2, true),
            page(2..4, true),
            page(4..5, false),
        ]));
        let feed = feed_with(source.clone(), Arc::new(RecordingNotifier::default()));
        feed.load_first_page().await;

        let (tx, rx) = flume::unbounded();
        for _ in 0..4 {
            tx.send(()).unwrap();
        }
        drop(tx);
        feed.follow_sentinel(rx).await;

        assert_eq!(ids(&feed), vec![0, 1, 2, 3, 4]);
        assert_eq!(*source.requested.lock(), vec![1, 2, 3]);
        assert!(!feed.pagination().has_more);
    }

    #[tokio::test]
    async fn test_layout_uses_adjusted_width() {
        let source = Arc::new(ScriptedSource::with_pages(vec![page(0..5, false)]));
        let feed = feed_with(source, Arc::new(RecordingNotifier::default()));
        feed.load_first_page().await;

        let rows = feed.layout_rows(1201);
        let sizes: Vec<usize> = rows.iter().map(|r| r.items.len()).collect();
        assert_eq!(sizes, vec![3, 2]);
        assert!((rows[0].used_width(2.0) - 1200.0).abs() <= 1.0);
        assert_eq!(feed.layout(1201).len(), 5);
        assert!(feed.layout(0).is_empty());
    }

    #[tokio::test]
    async fn test_window_estimated_from_measured_width() {
        let portraits = (0..8)
            .map(|id| Photo::new(id, format!("{id}.jpg"), format!("{id}_t.jpg"), 500, 1000).unwrap())
            .collect();
        let source = Arc::new(ScriptedSource::with_pages(vec![Ok(Page {
            photos: portraits,
            has_more: false,
        })]));
        let feed = feed_with(source, Arc::new(RecordingNotifier::default()));
        feed.load_first_page().await;

        // 450 is wide enough for the estimated window even though rows fit 449.
        let sizes: Vec<usize> = feed.layout_rows(450).iter().map(|r| r.items.len()).collect();
        assert_eq!(sizes, vec![4, 4]);

        let sizes: Vec<usize> = feed.layout_rows(449).iter().map(|r| r.items.len()).collect();
        assert_eq!(sizes, vec![2, 2, 2, 2]);
    }
}
