use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::ViewerConfig;
use crate::error::ViewError;
use crate::view::{LoadTicket, LoadedDocument, PageView, ViewPhase};
use crate::{Command, SessionEvent, ViewId};

pub const PLACEHOLDER_TEXT: &str = "Select a PDF to view";
pub const WORD_COPIED_TEXT: &str = "Word Copied!";

#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub ticket: LoadTicket,
    pub path: PathBuf,
    pub base_scale: f64,
}

pub struct Session {
    config: ViewerConfig,
    views: Vec<PageView>,
    focused: usize,
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl Session {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            config,
            views: Vec::new(),
            focused: 0,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn events(&self) -> Arc<Mutex<Vec<SessionEvent>>> {
        Arc::clone(&self.events)
    }

    pub fn views(&self) -> &[PageView] {
        &self.views
    }

    pub fn view(&self, index: usize) -> Option<&PageView> {
        self.views.get(index)
    }

    pub fn view_by_id(&self, id: ViewId) -> Option<&PageView> {
        self.views.iter().find(|view| view.id() == id)
    }

    pub fn focused(&self) -> usize {
        self.focused
    }

    pub fn placeholder(&self) -> Option<&'static str> {
        self.views.is_empty().then_some(PLACEHOLDER_TEXT)
    }

    /// Replaces every open view with one view per selected path. All previous views are
    /// closed before any new one is created.
    #[instrument(skip(self, paths))]
    pub fn select(&mut self, mut paths: Vec<PathBuf>) {
        if paths.len() > self.config.max_views {
            warn!(
                selected = paths.len(),
                max = self.config.max_views,
                "selection exceeds supported views; extra files ignored"
            );
            paths.truncate(self.config.max_views);
        }

        self.close_all();

        for path in paths {
            let view = PageView::new(path, self.config.clone());
            self.push_event(SessionEvent::ViewOpened(view.id()));
            self.views.push(view);
        }
        self.focused = 0;
        info!(views = self.views.len(), "selection applied");
    }

    pub fn close_all(&mut self) {
        for mut view in self.views.drain(..) {
            view.close();
            self.events.lock().push(SessionEvent::ViewClosed(view.id()));
        }
        self.focused = 0;
    }

    pub fn set_layout(
        &mut self,
        index: usize,
        container_width: Option<f64>,
        viewport: (u32, u32),
    ) {
        if let Some(view) = self.views.get_mut(index) {
            view.set_layout(container_width, viewport);
            let id = view.id();
            self.push_event(SessionEvent::RedrawNeeded(id));
        }
    }

    pub fn take_load_requests(&mut self) -> Vec<LoadRequest> {
        let mut requests = Vec::new();
        for view in &mut self.views {
            if let Some(ticket) = view.take_deferred_open() {
                requests.push(LoadRequest {
                    ticket,
                    path: view.path().to_path_buf(),
                    base_scale: view.base_scale(),
                });
            }
        }
        requests
    }

    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        outcome: Result<LoadedDocument, ViewError>,
    ) {
        let Some(view) = self.views.iter_mut().find(|v| v.id() == ticket.view()) else {
            if let Ok(mut loaded) = outcome {
                debug!(view = %ticket.view(), "view gone; closing late document");
                loaded.backend.close();
            }
            return;
        };
        if view.complete_load(ticket, outcome) {
            let id = view.id();
            let failure = view.error_message();
            self.push_event(SessionEvent::RedrawNeeded(id));
            if let Some(message) = failure {
                self.push_event(SessionEvent::LoadFailed { view: id, message });
            }
        }
    }

    pub fn apply(&mut self, command: Command) -> Result<()> {
        self.apply_to(self.focused, command)
    }

    pub fn apply_to(&mut self, index: usize, command: Command) -> Result<()> {
        if index >= self.views.len() {
            return Ok(());
        }
        let zoom_in = self.config.zoom_in_factor();
        let zoom_out = self.config.zoom_out_factor();
        let scroll_step = self.config.scroll_step;
        let view = &mut self.views[index];
        let id = view.id();

        let changed = match command {
            Command::FocusNext => {
                self.focused = (self.focused + 1) % self.views.len();
                return Ok(());
            }
            Command::Navigate { delta } => {
                let changed = view.navigate(delta);
                if changed && view.phase() == ViewPhase::Error {
                    if let Some(message) = view.error_message() {
                        self.events
                            .lock()
                            .push(SessionEvent::LoadFailed { view: id, message });
                    }
                }
                changed
            }
            Command::ZoomIn => view.zoom_by(zoom_in),
            Command::ZoomOut => view.zoom_by(zoom_out),
            Command::ResetZoom => view.set_zoom(1.0),
            Command::ScrollBy { steps_x, steps_y } => view.scroll_by(
                f64::from(steps_x) * scroll_step,
                f64::from(steps_y) * scroll_step,
            ),
            Command::Hover { point } => {
                self.focused = index;
                view.hover(point)
            }
            Command::PointerLeft => view.pointer_left(),
            Command::Click => {
                self.focused = index;
                if let Some(selection) = view.click() {
                    let payload = selection.to_json()?;
                    let mut events = self.events.lock();
                    events.push(SessionEvent::WordSelected {
                        view: id,
                        selection,
                        payload,
                    });
                    events.push(SessionEvent::Notification {
                        view: Some(id),
                        message: WORD_COPIED_TEXT.into(),
                    });
                }
                false
            }
            Command::CopyDocumentWords => {
                if view.phase() != ViewPhase::Ready {
                    return Ok(());
                }
                let message = match view.export_document_words() {
                    Ok(words) => {
                        let payload = serde_json::to_string(&words)?;
                        let word_count = words.len();
                        self.events.lock().push(SessionEvent::DocumentExported {
                            view: id,
                            word_count,
                            payload,
                        });
                        format!("Extracted data from {word_count} words across all pages")
                    }
                    Err(err) => format!("Failed to copy file data: {err}"),
                };
                self.push_event(SessionEvent::Notification {
                    view: Some(id),
                    message,
                });
                false
            }
        };

        if changed {
            self.push_event(SessionEvent::RedrawNeeded(id));
        }
        Ok(())
    }

    fn push_event(&self, event: SessionEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::DevicePoint;
    use crate::test_support::FakeProvider;
    use crate::view::load_document;
    use std::path::Path;

    async fn run_loads(session: &mut Session, provider: &FakeProvider) {
        for request in session.take_load_requests() {
            let outcome = load_document(provider, &request.path, request.base_scale).await;
            session.complete_load(request.ticket, outcome);
        }
    }

    async fn opened(paths: &[&str], provider: &FakeProvider) -> Session {
        let mut session = Session::new(ViewerConfig::default());
        session.select(paths.iter().map(PathBuf::from).collect());
        for index in 0..session.views().len() {
            session.set_layout(index, Some(480.0), (400, 300));
        }
        run_loads(&mut session, provider).await;
        session
    }

    #[tokio::test]
    async fn replacing_selection_closes_previous_handles_once() {
        let provider = FakeProvider::new();
        let mut session = opened(&["a.pdf", "b.pdf"], &provider).await;
        assert_eq!(session.views().len(), 2);

        session.select(vec![PathBuf::from("c.pdf")]);
        session.set_layout(0, Some(480.0), (400, 300));
        run_loads(&mut session, &provider).await;

        let ledger = provider.ledger.lock();
        assert_eq!(ledger.open_handles(), vec![PathBuf::from("c.pdf")]);
        assert_eq!(ledger.close_count(Path::new("a.pdf")), 1);
        assert_eq!(ledger.close_count(Path::new("b.pdf")), 1);
        drop(ledger);

        assert_eq!(session.views().len(), 1);
        assert_eq!(session.views()[0].phase(), ViewPhase::Ready);
    }

    #[tokio::test]
    async fn one_failed_document_does_not_block_its_sibling() {
        let provider = FakeProvider::new();
        let session = opened(&["broken.pdf", "b.pdf"], &provider).await;

        assert_eq!(session.views()[0].phase(), ViewPhase::Error);
        assert_eq!(session.views()[1].phase(), ViewPhase::Ready);
        let failed_id = session.views()[0].id();
        let events = session.events();
        assert!(events.lock().iter().any(
            |event| matches!(event, SessionEvent::LoadFailed { view, .. } if *view == failed_id)
        ));
    }

    #[tokio::test]
    async fn render_failure_on_navigate_reports_and_spares_sibling() {
        let provider = FakeProvider::with_failing_page(1);
        let mut session = opened(&["flaky.pdf", "b.pdf"], &provider).await;
        assert_eq!(session.views()[0].phase(), ViewPhase::Ready);
        session.events().lock().clear();

        session.apply(Command::Navigate { delta: 1 }).unwrap();

        let failed_id = session.views()[0].id();
        assert_eq!(session.views()[0].phase(), ViewPhase::Error);
        assert_eq!(session.views()[1].phase(), ViewPhase::Ready);
        assert_eq!(session.views()[1].current_page(), 0);
        let events = session.events();
        let events = events.lock();
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::LoadFailed { view, message }
                if *view == failed_id && message.contains("corrupt content stream")
        )));
    }

    #[test]
    fn empty_selection_shows_placeholder() {
        let mut session = Session::new(ViewerConfig::default());
        assert_eq!(session.placeholder(), Some(PLACEHOLDER_TEXT));
        session.select(vec![PathBuf::from("a.pdf")]);
        assert!(session.placeholder().is_none());
        session.select(Vec::new());
        assert_eq!(session.placeholder(), Some(PLACEHOLDER_TEXT));
    }

    #[test]
    fn selection_is_capped_to_max_views() {
        let mut session = Session::new(ViewerConfig::default());
        session.select(vec!["a.pdf".into(), "b.pdf".into(), "c.pdf".into()]);
        let names: Vec<_> = session.views().iter().map(|v| v.title()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    }

    #[tokio::test]
    async fn late_result_for_replaced_view_is_closed() {
        let provider = FakeProvider::new();
        let mut session = Session::new(ViewerConfig::default());
        session.select(vec![PathBuf::from("a.pdf")]);
        session.set_layout(0, None, (400, 300));
        let requests = session.take_load_requests();
        assert_eq!(requests.len(), 1);

        session.select(vec![PathBuf::from("b.pdf")]);
        let outcome = load_document(&provider, &requests[0].path, 3.0).await;
        session.complete_load(requests[0].ticket, outcome);

        assert_eq!(provider.ledger.lock().close_count(Path::new("a.pdf")), 1);
        assert_eq!(session.views()[0].phase(), ViewPhase::Empty);
    }

    #[tokio::test]
    async fn click_publishes_selection_and_acknowledgement() {
        let provider = FakeProvider::new();
        let mut session = opened(&["a.pdf"], &provider).await;
        session.apply(Command::ResetZoom).unwrap();
        session.events().lock().clear();

        session
            .apply_to(
                0,
                Command::Hover {
                    point: DevicePoint::new(90.0, 45.0),
                },
            )
            .unwrap();
        session.apply_to(0, Command::Click).unwrap();

        let events = session.events();
        let events = events.lock();
        let payload = events
            .iter()
            .find_map(|event| match event {
                SessionEvent::WordSelected { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .unwrap();
        assert!(payload.contains("\"text\":\"p0-first\""));
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::Notification { message, .. } if message == WORD_COPIED_TEXT
        )));
    }

    #[tokio::test]
    async fn commands_route_to_focused_view() {
        let provider = FakeProvider::new();
        let mut session = opened(&["a.pdf", "b.pdf"], &provider).await;

        session.apply(Command::FocusNext).unwrap();
        assert_eq!(session.focused(), 1);
        session.apply(Command::Navigate { delta: 1 }).unwrap();
        session.apply(Command::ZoomIn).unwrap();

        assert_eq!(session.views()[0].current_page(), 0);
        assert_eq!(session.views()[1].current_page(), 1);
        assert!((session.views()[1].zoom() - 0.75 * 1.1).abs() < 1e-12);
        assert_eq!(session.views()[0].zoom(), 0.75);

        session.apply(Command::FocusNext).unwrap();
        assert_eq!(session.focused(), 0);
    }

    #[tokio::test]
    async fn copy_document_words_reports_count() {
        let provider = FakeProvider::new();
        let mut session = opened(&["a.pdf"], &provider).await;
        session.apply(Command::CopyDocumentWords).unwrap();

        let events = session.events();
        let events = events.lock();
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::DocumentExported { word_count: 9, .. }
        )));
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::Notification { message, .. }
                if message == "Extracted data from 9 words across all pages"
        )));
    }

    #[test]
    fn commands_for_missing_views_are_ignored() {
        let mut session = Session::new(ViewerConfig::default());
        session.apply(Command::Navigate { delta: 1 }).unwrap();
        session.apply_to(5, Command::Click).unwrap();
        assert!(session.events().lock().is_empty());
    }
}
