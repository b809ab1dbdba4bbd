//! Interactive editing of one photo.
//!
//! A session owns the source image, the selected filter and its cache, and
//! at most one background operation. Starting a new operation cancels and
//! awaits the previous one, so the last request always wins. A finished
//! operation publishes its result only if it was not cancelled, and that
//! check happens under the same lock that guards the preview, so a stale
//! result can never overwrite a newer one.
//!
//! Every settings update starts a run immediately; debouncing rapid updates
//! such as slider drags is the caller's job.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace, warn};

use crate::buffer::PixelBuffer;
use crate::error::FilterError;
use crate::executor::{CancelToken, ChunkedExecutor, RunContext};
use crate::filter::{Filter, FilterCache, FilterSettings};
use crate::photo::{PhotoStore, StoreError};
use crate::registry::FilterRegistry;

/// How the most recent operation ended.
#[derive(Debug)]
pub enum OperationOutcome {
    /// The result replaced the preview.
    Published,
    /// Cancelled before publishing; the preview is unchanged.
    Cancelled,
    /// The filter failed; the preview is unchanged.
    Failed(FilterError),
    /// No operation was running.
    Idle,
}

struct Operation {
    token: CancelToken,
    handle: JoinHandle<(FilterCache, OperationOutcome)>,
}

pub struct EditSession {
    source: Arc<PixelBuffer>,
    registry: FilterRegistry,
    executor: ChunkedExecutor,
    selected: Option<Arc<dyn Filter>>,
    cache: FilterCache,
    preview: Arc<Mutex<PixelBuffer>>,
    active: Option<Operation>,
}

fn lock(preview: &Mutex<PixelBuffer>) -> MutexGuard<'_, PixelBuffer> {
    preview.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EditSession {
    pub fn new(source: PixelBuffer, registry: FilterRegistry, executor: ChunkedExecutor) -> Self {
        let preview = Arc::new(Mutex::new(source.clone()));
        Self {
            source: Arc::new(source),
            registry,
            executor,
            selected: None,
            cache: FilterCache::Empty,
            preview,
            active: None,
        }
    }

    pub fn source(&self) -> &PixelBuffer {
        &self.source
    }

    /// Id of the selected filter, if any.
    pub fn selected_filter(&self) -> Option<&'static str> {
        self.selected.as_ref().map(|f| f.id())
    }

    /// Switch filters, reset the preview and start the new filter with its defaults.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not registered.
    pub fn select_filter(&mut self, id: Option<&str>) {
        self.cancel_and_await();

        let filter = id.map(|id| Arc::clone(self.registry.filter(id)));
        debug!(filter = ?id, "filter selected");
        self.cache = filter
            .as_ref()
            .map_or(FilterCache::Empty, |f| f.build_cache());
        *lock(&self.preview) = (*self.source).clone();
        self.selected = filter;

        if let Some(filter) = self.selected.clone() {
            self.start(filter, None);
        }
    }

    /// Re-run the selected filter with new settings. Ignored without a selection.
    pub fn update_settings(&mut self, settings: FilterSettings) {
        let Some(filter) = self.selected.clone() else {
            warn!(settings = settings.filter_id(), "settings update without a selected filter");
            return;
        };
        self.cancel_and_await();
        self.start(filter, Some(settings));
    }

    /// Block until the in-flight operation finishes.
    pub fn wait(&mut self) -> OperationOutcome {
        match self.active.take() {
            Some(op) => self.join(op),
            None => OperationOutcome::Idle,
        }
    }

    /// The last published image (the source right after selection).
    pub fn preview(&self) -> PixelBuffer {
        lock(&self.preview).clone()
    }

    pub fn is_processing(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|op| !op.handle.is_finished())
    }

    /// Wait for the in-flight operation, save the preview as photo `photo_id`
    /// and continue editing from it with no filter selected.
    ///
    /// # Errors
    ///
    /// Propagates the store's error; the session is left unchanged.
    pub fn commit<S>(&mut self, store: &mut S, photo_id: &str) -> Result<(), StoreError>
    where
        S: PhotoStore + ?Sized,
    {
        self.wait();
        let image = self.preview();
        store.save(photo_id, &image)?;
        debug!(photo = photo_id, width = image.width(), height = image.height(), "preview committed");

        self.source = Arc::new(image);
        self.select_filter(None);
        Ok(())
    }

    fn start(&mut self, filter: Arc<dyn Filter>, settings: Option<FilterSettings>) {
        let token = CancelToken::new();
        let worker_token = token.clone();
        let source = Arc::clone(&self.source);
        let preview = Arc::clone(&self.preview);
        let executor = self.executor;
        let mut cache = std::mem::take(&mut self.cache);

        debug!(filter = filter.id(), workers = executor.workers(), "operation started");
        let handle = thread::spawn(move || {
            let ctx = RunContext::new(executor, &worker_token);
            let result = match &settings {
                Some(settings) => filter.apply(&source, settings, &mut cache, &ctx),
                None => filter.apply_defaults(&source, &mut cache, &ctx),
            };
            let outcome = match result {
                Ok(image) => {
                    let mut current = lock(&preview);
                    if worker_token.is_cancelled() {
                        OperationOutcome::Cancelled
                    } else {
                        *current = image;
                        OperationOutcome::Published
                    }
                }
                Err(err) if err.is_cancelled() => OperationOutcome::Cancelled,
                Err(err) => {
                    warn!(filter = filter.id(), error = %err, "operation failed");
                    OperationOutcome::Failed(err)
                }
            };
            (cache, outcome)
        });

        self.active = Some(Operation { token, handle });
    }

    fn cancel_and_await(&mut self) {
        if let Some(op) = self.active.take() {
            {
                let _preview = lock(&self.preview);
                op.token.cancel();
            }
            let outcome = self.join(op);
            trace!(?outcome, "previous operation finished");
        }
    }

    fn join(&mut self, op: Operation) -> OperationOutcome {
        match op.handle.join() {
            Ok((cache, outcome)) => {
                self.cache = cache;
                outcome
            }
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

impl Drop for EditSession {
    fn drop(&mut self) {
        if let Some(op) = self.active.take() {
            op.token.cancel();
            let _ = op.handle.join();
        }
    }
}

impl std::fmt::Debug for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("source", &self.source.dimensions())
            .field("selected", &self.selected_filter())
            .field("processing", &self.is_processing())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterCategory;
    use crate::photo::memory::MemoryStore;
    use crate::tone::{grayscale_pixel, sepia_pixel};
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    const MARKER: u32 = 0xFFAB_CDEF;

    /// Spins until cancelled, then either unwinds or (if `ignore_cancel`)
    /// returns a result anyway, as a filter finishing its last chunk would.
    struct GateFilter {
        id: &'static str,
        ignore_cancel: bool,
        started: Arc<AtomicBool>,
    }

    impl Filter for GateFilter {
        fn id(&self) -> &'static str {
            self.id
        }

        fn category(&self) -> FilterCategory {
            FilterCategory::Retouch
        }

        fn default_settings(&self) -> FilterSettings {
            FilterSettings::Grayscale
        }

        fn apply(
            &self,
            image: &PixelBuffer,
            _settings: &FilterSettings,
            _cache: &mut FilterCache,
            ctx: &RunContext<'_>,
        ) -> crate::error::FilterResult<PixelBuffer> {
            self.started.store(true, Ordering::SeqCst);
            while ctx.check().is_ok() {
                thread::sleep(Duration::from_millis(1));
            }
            if self.ignore_cancel {
                Ok(PixelBuffer::filled(image.width(), image.height(), MARKER))
            } else {
                ctx.check().map(|_| image.clone())
            }
        }
    }

    fn source() -> PixelBuffer {
        let pixels = (0..48u32).map(|i| 0xFF00_0000 | i.wrapping_mul(0x0003_0507)).collect();
        PixelBuffer::new(8, 6, pixels).unwrap()
    }

    fn session_with_gates() -> (EditSession, Arc<AtomicBool>) {
        let started = Arc::new(AtomicBool::new(false));
        let mut registry = FilterRegistry::standard();
        registry.register(Arc::new(GateFilter {
            id: "gate",
            ignore_cancel: false,
            started: Arc::clone(&started),
        }));
        registry.register(Arc::new(GateFilter {
            id: "stubborn-gate",
            ignore_cancel: true,
            started: Arc::clone(&started),
        }));
        (EditSession::new(source(), registry, ChunkedExecutor::new(2)), started)
    }

    fn wait_until_started(started: &AtomicBool) {
        while !started.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_select_applies_defaults() {
        let mut session = EditSession::new(source(), FilterRegistry::standard(), ChunkedExecutor::new(3));
        session.select_filter(Some("grayscale"));
        assert_eq!(session.selected_filter(), Some("grayscale"));
        assert!(matches!(session.wait(), OperationOutcome::Published));

        let preview = session.preview();
        for (&src, &dst) in session.source().pixels().iter().zip(preview.pixels()) {
            assert_eq!(dst, grayscale_pixel(src));
        }
        assert!(!session.is_processing());
        assert!(matches!(session.wait(), OperationOutcome::Idle));
    }

    #[test]
    fn test_new_selection_cancels_running_operation() {
        let (mut session, started) = session_with_gates();
        session.select_filter(Some("gate"));
        wait_until_started(&started);

        session.select_filter(Some("sepia"));
        assert!(matches!(session.wait(), OperationOutcome::Published));
        let preview = session.preview();
        for (&src, &dst) in session.source().pixels().iter().zip(preview.pixels()) {
            assert_eq!(dst, sepia_pixel(src));
        }
    }

    #[test]
    fn test_cancelled_result_is_never_published() {
        let (mut session, started) = session_with_gates();
        session.select_filter(Some("stubborn-gate"));
        wait_until_started(&started);

        // The first run finishes with MARKER after being cancelled; the
        // second keeps spinning, so nothing else touches the preview.
        session.update_settings(FilterSettings::Grayscale);
        assert!(session.is_processing());
        assert_eq!(session.preview(), *session.source());
        assert!(!session.preview().pixels().contains(&MARKER));
    }

    #[test]
    fn test_deselect_resets_preview() {
        let (mut session, started) = session_with_gates();
        session.select_filter(Some("stubborn-gate"));
        wait_until_started(&started);

        session.select_filter(None);
        assert_eq!(session.preview(), *session.source());
        assert_eq!(session.selected_filter(), None);
        assert!(!session.is_processing());
    }

    #[test]
    fn test_update_settings_last_writer_wins() {
        let mut session = EditSession::new(source(), FilterRegistry::standard(), ChunkedExecutor::new(2));
        session.select_filter(Some("temp-and-tint"));
        session.update_settings(FilterSettings::TempAndTint(
            crate::tone::TemperatureTintSettings::new(1.0, 0.0),
        ));
        session.update_settings(FilterSettings::TempAndTint(
            crate::tone::TemperatureTintSettings::new(0.0, 0.0),
        ));
        assert!(matches!(session.wait(), OperationOutcome::Published));
        assert_eq!(session.preview(), *session.source());
    }

    #[test]
    fn test_failure_keeps_preview() {
        let mut session = EditSession::new(source(), FilterRegistry::standard(), ChunkedExecutor::new(2));
        session.select_filter(Some("rotate"));
        session.wait();
        session.update_settings(FilterSettings::Sepia);
        let outcome = session.wait();
        assert!(matches!(
            outcome,
            OperationOutcome::Failed(FilterError::SettingsMismatch { filter: "rotate", .. })
        ));
        assert_eq!(session.preview(), *session.source());
    }

    #[test]
    fn test_update_without_selection_is_ignored() {
        let mut session = EditSession::new(source(), FilterRegistry::standard(), ChunkedExecutor::new(2));
        session.update_settings(FilterSettings::Grayscale);
        assert!(matches!(session.wait(), OperationOutcome::Idle));
        assert_eq!(session.preview(), *session.source());
    }

    #[test]
    fn test_cache_survives_settings_updates() {
        use crate::tone::ContrastBrightnessSettings;

        let mut session = EditSession::new(source(), FilterRegistry::standard(), ChunkedExecutor::new(2));
        session.select_filter(Some("contrast-and-brightness"));
        session.wait();
        assert!(matches!(
            session.cache,
            FilterCache::ContrastAndBrightness(cache) if cache.modal.is_some()
        ));

        session.update_settings(FilterSettings::ContrastAndBrightness(
            ContrastBrightnessSettings::new(1.5, 0.1),
        ));
        assert!(matches!(session.wait(), OperationOutcome::Published));
        assert_ne!(session.preview(), *session.source());
    }

    #[test]
    fn test_commit_saves_preview_and_rebases() {
        let mut store = MemoryStore::default();
        let photo = store.import(Path::new("photo.jpg")).unwrap();

        let mut session = EditSession::new(source(), FilterRegistry::standard(), ChunkedExecutor::new(2));
        session.select_filter(Some("grayscale"));
        session.commit(&mut store, &photo.id).unwrap();

        let saved = store.image(&photo.id).unwrap().clone();
        assert_eq!(saved.pixels()[1], grayscale_pixel(source().pixels()[1]));
        assert_eq!(*session.source(), saved);
        assert_eq!(session.preview(), saved);
        assert_eq!(session.selected_filter(), None);

        assert!(session.commit(&mut store, "missing").is_err());
    }

    #[test]
    fn test_drop_cancels_running_operation() {
        let (mut session, started) = session_with_gates();
        session.select_filter(Some("gate"));
        wait_until_started(&started);
        drop(session);
    }
}
